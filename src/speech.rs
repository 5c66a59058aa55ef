//! Speech through a command-line synthesizer (espeak-ng compatible).
//!
//! Every utterance is one child process reading its text from stdin. `stop`
//! kills the running child; the utterance then resolves as failed, which the
//! controller ignores because it already moved on.

use narrator_core::CancellationToken;
use narrator_core::config::TtsConfig;
use narrator_core::error::TtsFailure;
use narrator_core::model::Gender;
use narrator_core::services::{SpeechEngine, Utterance, UtteranceOutcome, Voice};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

const BASE_PITCH: f32 = 50.0;
const BASE_WPM: f32 = 175.0;

pub struct CommandSpeech {
    program: String,
    variant_language: String,
    current: Mutex<Option<CancellationToken>>,
}

impl CommandSpeech {
    pub fn new(config: &TtsConfig) -> Self {
        let variant_language = config
            .default_voice
            .as_deref()
            .and_then(|voice| voice.split('+').next())
            .filter(|lang| !lang.is_empty())
            .unwrap_or("en")
            .to_string();
        Self {
            program: config.command.clone(),
            variant_language,
            current: Mutex::new(None),
        }
    }

    fn arguments(utterance: &Utterance) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(voice) = &utterance.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        let pitch = (BASE_PITCH * utterance.pitch).round().clamp(0.0, 99.0);
        let wpm = (BASE_WPM * utterance.rate).round().clamp(80.0, 450.0);
        args.push("-p".to_string());
        args.push(format!("{pitch}"));
        args.push("-s".to_string());
        args.push(format!("{wpm}"));
        args.push("--stdin".to_string());
        args
    }
}

impl SpeechEngine for CommandSpeech {
    fn speak(&self, utterance: Utterance) -> oneshot::Receiver<UtteranceOutcome> {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        if let Some(previous) = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(token.clone())
        {
            previous.cancel();
        }
        let program = self.program.clone();
        let args = Self::arguments(&utterance);
        tokio::spawn(async move {
            let outcome = match run_utterance(&program, &args, &utterance.text, &token).await {
                Ok(()) => UtteranceOutcome::Done,
                Err(failure) => UtteranceOutcome::Failed(failure),
            };
            let _ = tx.send(outcome);
        });
        rx
    }

    fn stop(&self) {
        if let Some(token) = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            token.cancel();
        }
    }

    fn voices(&self) -> Vec<Voice> {
        let output = std::process::Command::new(&self.program)
            .arg("--voices")
            .output();
        let mut voices = match output {
            Ok(output) if output.status.success() => {
                parse_voice_list(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                warn!(
                    status = %output.status,
                    "Voice listing failed; using default voice only"
                );
                Vec::new()
            }
            Err(err) => {
                warn!(program = %self.program, "Failed to list voices: {err}");
                Vec::new()
            }
        };
        // espeak ships mostly male voices; its +f/+m variants fill both pools.
        for (variant, gender) in [("f3", Gender::Female), ("m3", Gender::Male)] {
            voices.push(Voice {
                name: format!("{}+{variant}", self.variant_language),
                language: Some(self.variant_language.clone()),
                gender_hint: Some(gender),
            });
        }
        debug!(count = voices.len(), "Listed TTS voices");
        voices
    }
}

async fn run_utterance(
    program: &str,
    args: &[String],
    text: &str,
    stop: &CancellationToken,
) -> Result<(), TtsFailure> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| TtsFailure(format!("failed to start {program}: {err}")))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|err| TtsFailure(format!("failed to send text: {err}")))?;
    }
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(TtsFailure(format!("{program} exited with {status}"))),
            Err(err) => Err(TtsFailure(format!("waiting for {program}: {err}"))),
        },
        _ = stop.cancelled() => {
            if let Err(err) = child.kill().await {
                debug!("Speech process already finished: {err}");
            }
            Err(TtsFailure("stopped".to_string()))
        }
    }
}

/// Parse `espeak-ng --voices` output:
/// `Pty Language Age/Gender VoiceName File Other Languages`.
fn parse_voice_list(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let age_gender = columns.next()?;
            let gender_hint = match age_gender.rsplit('/').next() {
                Some("M") => Some(Gender::Male),
                Some("F") => Some(Gender::Female),
                _ => None,
            };
            Some(Voice {
                name: language.to_string(),
                language: Some(language.to_string()),
                gender_hint,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_espeak_voice_listing() {
        let listing = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n \
                       5  af              --/M      Afrikaans          gmw/af\n \
                       5  en-us           --/F      English_(America)  gmw/en-US\n \
                       5  eo              --/-      Esperanto          art/eo\n";
        let voices = parse_voice_list(listing);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].name, "af");
        assert_eq!(voices[0].gender_hint, Some(Gender::Male));
        assert_eq!(voices[1].gender_hint, Some(Gender::Female));
        assert_eq!(voices[2].gender_hint, None);
    }

    #[test]
    fn pitch_and_rate_map_onto_espeak_ranges() {
        let args = CommandSpeech::arguments(&Utterance {
            text: "hello".to_string(),
            voice: Some("en+f3".to_string()),
            pitch: 1.2,
            rate: 10.0,
        });
        assert_eq!(
            args,
            vec!["-v", "en+f3", "-p", "60", "-s", "450", "--stdin"]
        );
    }

    #[test]
    fn variants_follow_the_default_voice_language() {
        let config = TtsConfig {
            command: "definitely-not-installed-tts".to_string(),
            default_voice: Some("de+m1".to_string()),
            ..TtsConfig::default()
        };
        let speech = CommandSpeech::new(&config);
        let names: Vec<String> = speech.voices().into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["de+f3", "de+m3"]);
    }

    #[tokio::test]
    async fn missing_program_fails_the_utterance() {
        let config = TtsConfig {
            command: "definitely-not-installed-tts".to_string(),
            ..TtsConfig::default()
        };
        let speech = CommandSpeech::new(&config);
        let outcome = speech
            .speak(Utterance {
                text: "hi".to_string(),
                voice: None,
                pitch: 1.0,
                rate: 1.0,
            })
            .await
            .unwrap();
        assert!(matches!(outcome, UtteranceOutcome::Failed(_)));
    }
}
