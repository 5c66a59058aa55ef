//! Speaker gender and line emotion heuristics.
//!
//! Both are rough guesses meant to pick a voice and a tone, not to describe
//! characters. The gender rule sits behind [`GenderHeuristic`] so it can be
//! swapped or overridden without touching playback.

use crate::config::ClassificationConfig;
use crate::extractor::BubbleDraft;
use crate::geometry::Rect;
use crate::model::{Emotion, FaceCandidate, Gender, SpeechBubble};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_HAPPY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:ha(?:ha)+|he(?:he)+|great|lov(?:e|ed|es|ely|ing)|happy|yay|awesome|wonderful|glad|fun|nice|thanks?)\b",
    )
    .unwrap()
});
// Whole words: "know" and "Nooo" do not negate.
static RE_NEGATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:no|stop)\b").unwrap());
static RE_ANGRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:hate[ds]?|stupid|shut|idiot|damn|angry|kill|fool|dare|annoying|jerk)\b")
        .unwrap()
});
static RE_SAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:cry|cried|crying|sorry|lonely|sad|miss|tears?|alone|goodbye|hurts?)\b")
        .unwrap()
});
static RE_SURPRISED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:wow|whoa|impossible|unbelievable|really|seriously|huh)\b").unwrap()
});
static RE_SCARED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:help|scared|run|afraid|monster|ghost|save|danger|scary)\b").unwrap()
});

/// Picks a speaker gender for a bubble from the faces on the same image.
pub trait GenderHeuristic: Send + Sync {
    fn classify(&self, bubble: &Rect, faces: &[FaceCandidate]) -> Gender;
}

/// Nearest face wins; its box shape and smile decide the label.
#[derive(Debug, Clone)]
pub struct FaceGeometryHeuristic {
    pub male_aspect_above: f32,
    pub female_aspect_below: f32,
    pub smile_threshold: f32,
}

impl FaceGeometryHeuristic {
    pub fn from_config(config: &ClassificationConfig) -> Self {
        Self {
            male_aspect_above: config.male_aspect_above,
            female_aspect_below: config.female_aspect_below,
            smile_threshold: config.smile_threshold,
        }
    }

    pub fn classify_face(&self, face: &FaceCandidate) -> Gender {
        let ratio = face.bounds.aspect_ratio();
        if ratio > self.male_aspect_above {
            Gender::Male
        } else if ratio < self.female_aspect_below {
            Gender::Female
        } else if face.smiling_probability > self.smile_threshold {
            Gender::Female
        } else {
            Gender::Unknown
        }
    }
}

impl GenderHeuristic for FaceGeometryHeuristic {
    fn classify(&self, bubble: &Rect, faces: &[FaceCandidate]) -> Gender {
        nearest_face(bubble, faces)
            .map(|face| self.classify_face(face))
            .unwrap_or(Gender::Unknown)
    }
}

/// Always answers the same gender; backs the user override.
#[derive(Debug, Clone, Copy)]
pub struct FixedGender(pub Gender);

impl GenderHeuristic for FixedGender {
    fn classify(&self, _bubble: &Rect, _faces: &[FaceCandidate]) -> Gender {
        self.0
    }
}

/// Face whose box center is closest to the bubble's; no distance cutoff.
pub fn nearest_face<'a>(bubble: &Rect, faces: &'a [FaceCandidate]) -> Option<&'a FaceCandidate> {
    faces.iter().min_by(|a, b| {
        bubble
            .center_distance(&a.bounds)
            .total_cmp(&bubble.center_distance(&b.bounds))
    })
}

/// First matching rule wins, in this order: happy, angry, sad, surprised,
/// scared.
pub fn classify_emotion(text: &str) -> Emotion {
    let lower = text.to_lowercase();
    let exclamations = text.matches('!').count();
    let questions = text.matches('?').count();

    if RE_HAPPY.is_match(&lower) || (exclamations >= 1 && !RE_NEGATION.is_match(&lower)) {
        return Emotion::Happy;
    }
    if RE_ANGRY.is_match(&lower)
        || (capital_ratio(text) > 0.6 && text.chars().count() > 5)
        || exclamations >= 2
    {
        return Emotion::Angry;
    }
    if RE_SAD.is_match(&lower) || lower.contains("...") {
        return Emotion::Sad;
    }
    if RE_SURPRISED.is_match(&lower) || (exclamations >= 1 && questions >= 1) || questions >= 2 {
        return Emotion::Surprised;
    }
    if RE_SCARED.is_match(&lower) && exclamations >= 1 {
        return Emotion::Scared;
    }
    Emotion::Neutral
}

fn capital_ratio(text: &str) -> f32 {
    let mut letters = 0usize;
    let mut upper = 0usize;
    for ch in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if ch.is_uppercase() {
            upper += 1;
        }
    }
    if letters == 0 {
        return 0.0;
    }
    upper as f32 / letters as f32
}

pub struct SpeakerClassifier {
    gender: Box<dyn GenderHeuristic>,
}

impl SpeakerClassifier {
    pub fn new(gender: Box<dyn GenderHeuristic>) -> Self {
        Self { gender }
    }

    pub fn from_config(config: &ClassificationConfig) -> Self {
        match config.gender_override {
            Some(gender) => Self::new(Box::new(FixedGender(gender))),
            None => Self::new(Box::new(FaceGeometryHeuristic::from_config(config))),
        }
    }

    /// Label a draft; reading order is assigned later by the sequencer.
    pub fn classify(&self, draft: BubbleDraft, faces: &[FaceCandidate]) -> SpeechBubble {
        let gender = self.gender.classify(&draft.bounds, faces);
        let emotion = classify_emotion(&draft.text);
        SpeechBubble {
            text: draft.text,
            bounds: draft.bounds,
            confidence: draft.confidence,
            gender,
            emotion,
            reading_order: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heuristic() -> FaceGeometryHeuristic {
        FaceGeometryHeuristic::from_config(&ClassificationConfig::default())
    }

    fn face(w: i32, h: i32, smile: f32) -> FaceCandidate {
        FaceCandidate {
            bounds: Rect::from_xywh(0, 0, w, h),
            smiling_probability: smile,
        }
    }

    #[test]
    fn happy_keyword_outranks_angry_signals() {
        assert_eq!(classify_emotion("GREAT!! I AM SO MAD"), Emotion::Happy);
        assert_eq!(classify_emotion("I love it but I hate it"), Emotion::Happy);
    }

    #[test]
    fn emotion_rules_follow_priority_order() {
        assert_eq!(classify_emotion("Stop it!!"), Emotion::Angry);
        assert_eq!(classify_emotion("NO WAY YOU DID"), Emotion::Angry);
        assert_eq!(classify_emotion("I'm sorry"), Emotion::Sad);
        assert_eq!(classify_emotion("Well..."), Emotion::Sad);
        assert_eq!(classify_emotion("Is that impossible"), Emotion::Surprised);
        assert_eq!(classify_emotion("What?? Who??"), Emotion::Surprised);
        assert_eq!(classify_emotion("No, help me!"), Emotion::Scared);
        assert_eq!(classify_emotion("Let's go to school"), Emotion::Neutral);
    }

    #[test]
    fn negated_exclamation_is_not_happy() {
        assert_ne!(classify_emotion("No, not that!"), Emotion::Happy);
    }

    #[test]
    fn negation_matches_whole_words_only() {
        // "no" inside "know" or a drawn-out "Nooo" is not a negation.
        assert_eq!(classify_emotion("I know!"), Emotion::Happy);
        assert_eq!(classify_emotion("Nooo!"), Emotion::Happy);
        assert_eq!(classify_emotion("No!"), Emotion::Neutral);
        assert_eq!(classify_emotion("Don't stop!"), Emotion::Neutral);
    }

    #[test]
    fn face_ratio_boundary_is_exclusive_for_male() {
        let h = heuristic();
        assert_eq!(h.classify_face(&face(85, 100, 0.1)), Gender::Unknown);
        assert_eq!(h.classify_face(&face(85, 100, 0.9)), Gender::Female);
        assert_eq!(h.classify_face(&face(86, 100, 0.1)), Gender::Male);
        assert_eq!(h.classify_face(&face(74, 100, 0.1)), Gender::Female);
    }

    #[test]
    fn nearest_face_decides_gender() {
        let h = heuristic();
        let bubble = Rect::from_xywh(0, 0, 100, 40);
        let faces = vec![
            FaceCandidate {
                bounds: Rect::from_xywh(5000, 5000, 100, 100),
                smiling_probability: 0.0,
            },
            FaceCandidate {
                bounds: Rect::from_xywh(120, 0, 60, 100),
                smiling_probability: 0.0,
            },
        ];
        assert_eq!(h.classify(&bubble, &faces), Gender::Female);
        assert_eq!(h.classify(&bubble, &[]), Gender::Unknown);
    }

    #[test]
    fn override_forces_gender() {
        let config = ClassificationConfig {
            gender_override: Some(Gender::Male),
            ..ClassificationConfig::default()
        };
        let classifier = SpeakerClassifier::from_config(&config);
        let draft = BubbleDraft {
            text: "hello there".to_string(),
            bounds: Rect::from_xywh(0, 0, 100, 40),
            confidence: 1.0,
        };
        assert_eq!(classifier.classify(draft, &[]).gender, Gender::Male);
    }
}
