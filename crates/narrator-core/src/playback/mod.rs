//! Narration playback: state, events, voice choice and the controller.

mod controller;
mod state;
mod voice;

pub use controller::{PlaybackContent, PlaybackController, SpeakOutcome, Strip};
pub use state::{PlaybackEvent, PlaybackState, PlaybackStatus};
pub use voice::{VoiceSelector, emotion_factors, voice_gender};
