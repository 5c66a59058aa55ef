//! Voice, pitch and rate for a bubble.

use crate::config::TtsConfig;
use crate::model::{Emotion, Gender, SpeechBubble};
use crate::services::{Utterance, Voice};
use tracing::debug;

const MIN_FACTOR: f32 = 0.25;
const MAX_FACTOR: f32 = 4.0;

/// Gender pool of a voice: the engine's hint first, then its name.
pub fn voice_gender(voice: &Voice) -> Option<Gender> {
    if let Some(hint) = voice.gender_hint {
        if hint != Gender::Unknown {
            return Some(hint);
        }
    }
    let name = voice.name.to_lowercase();
    name.split(|c: char| !c.is_alphanumeric())
        .find_map(token_gender)
}

/// Whole-token match, plus espeak-style `f3` / `m1` variant names.
fn token_gender(token: &str) -> Option<Gender> {
    match token {
        "female" | "woman" | "girl" => return Some(Gender::Female),
        "male" | "man" | "boy" => return Some(Gender::Male),
        _ => {}
    }
    let mut chars = token.chars();
    let first = chars.next()?;
    let rest = chars.as_str();
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match first {
        'f' => Some(Gender::Female),
        'm' => Some(Gender::Male),
        _ => None,
    }
}

/// (pitch, rate) multipliers for an emotion.
pub fn emotion_factors(emotion: Emotion) -> (f32, f32) {
    match emotion {
        Emotion::Happy => (1.15, 1.1),
        Emotion::Sad => (0.9, 0.85),
        Emotion::Angry => (0.95, 1.15),
        Emotion::Surprised => (1.2, 1.05),
        Emotion::Scared => (1.1, 1.2),
        Emotion::Neutral => (1.0, 1.0),
    }
}

fn gender_pitch(gender: Gender) -> f32 {
    match gender {
        Gender::Male => 0.85,
        Gender::Female => 1.15,
        Gender::Unknown => 1.0,
    }
}

#[derive(Debug, Clone, Default)]
pub struct VoiceSelector {
    male: Vec<String>,
    female: Vec<String>,
    default_voice: Option<String>,
    base_pitch: f32,
    base_rate: f32,
}

impl VoiceSelector {
    pub fn new(voices: &[Voice], config: &TtsConfig) -> Self {
        let mut male = Vec::new();
        let mut female = Vec::new();
        for voice in voices {
            match voice_gender(voice) {
                Some(Gender::Male) => male.push(voice.name.clone()),
                Some(Gender::Female) => female.push(voice.name.clone()),
                _ => {}
            }
        }
        debug!(
            male = male.len(),
            female = female.len(),
            "Classified TTS voices"
        );
        Self {
            male,
            female,
            default_voice: config.default_voice.clone(),
            base_pitch: config.base_pitch,
            base_rate: config.base_rate,
        }
    }

    pub fn voice_for(&self, gender: Gender) -> Option<String> {
        let pool = match gender {
            Gender::Male => self.male.first(),
            Gender::Female => self.female.first(),
            Gender::Unknown => None,
        };
        pool.cloned().or_else(|| self.default_voice.clone())
    }

    /// Utterance for `bubble` spoken as `gender`, which may differ from the
    /// bubble's own label when the user overrode it.
    pub fn utterance(&self, bubble: &SpeechBubble, gender: Gender) -> Utterance {
        let (pitch_factor, rate_factor) = emotion_factors(bubble.emotion);
        Utterance {
            text: bubble.text.clone(),
            voice: self.voice_for(gender),
            pitch: (self.base_pitch * gender_pitch(gender) * pitch_factor)
                .clamp(MIN_FACTOR, MAX_FACTOR),
            rate: (self.base_rate * rate_factor).clamp(MIN_FACTOR, MAX_FACTOR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;

    fn voice(name: &str, hint: Option<Gender>) -> Voice {
        Voice {
            name: name.to_string(),
            language: None,
            gender_hint: hint,
        }
    }

    #[test]
    fn female_names_do_not_land_in_the_male_pool() {
        assert_eq!(voice_gender(&voice("en-us-female-2", None)), Some(Gender::Female));
        assert_eq!(voice_gender(&voice("en-gb-male", None)), Some(Gender::Male));
        assert_eq!(voice_gender(&voice("en+f3", None)), Some(Gender::Female));
        assert_eq!(voice_gender(&voice("german", None)), None);
        assert_eq!(voice_gender(&voice("en-x-robot", None)), None);
        assert_eq!(
            voice_gender(&voice("en-x-robot", Some(Gender::Female))),
            Some(Gender::Female)
        );
    }

    #[test]
    fn pitch_combines_base_gender_and_emotion() {
        let voices = vec![voice("alto-female", None), voice("bass-male", None)];
        let config = TtsConfig {
            default_voice: Some("narrator".to_string()),
            ..TtsConfig::default()
        };
        let selector = VoiceSelector::new(&voices, &config);
        let bubble = SpeechBubble {
            text: "Hooray".to_string(),
            bounds: Rect::default(),
            confidence: 1.0,
            gender: Gender::Female,
            emotion: Emotion::Sad,
            reading_order: 0,
        };

        let female = selector.utterance(&bubble, Gender::Female);
        assert_eq!(female.voice.as_deref(), Some("alto-female"));
        assert!((female.pitch - 1.15 * 0.9).abs() < 1e-5);
        assert!((female.rate - 0.85).abs() < 1e-5);

        let male = selector.utterance(&bubble, Gender::Male);
        assert_eq!(male.voice.as_deref(), Some("bass-male"));

        let unknown = selector.utterance(&bubble, Gender::Unknown);
        assert_eq!(unknown.voice.as_deref(), Some("narrator"));
    }
}
