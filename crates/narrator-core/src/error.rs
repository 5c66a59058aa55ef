//! Error taxonomy for analysis and playback.
//!
//! Failures are scoped to the unit they concern: a bad image kills one page,
//! an OCR failure empties one chunk, a TTS failure skips one bubble. Only
//! [`NoContentError`] ends a session.

use thiserror::Error;

/// Malformed or zero-sized bitmap.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid image: {reason}")]
pub struct InvalidImageError {
    pub reason: String,
}

impl InvalidImageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// OCR or face engine failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("recognition engine failed: {0}")]
    Engine(String),
    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),
    #[error("recognition task aborted: {0}")]
    Aborted(String),
}

/// An utterance could not be spoken.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("speech failed: {0}")]
pub struct TtsFailure(pub String);

/// Nothing readable came out of a session's input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NoContentError {
    #[error("no pages to read; select images or a PDF with at least one page")]
    NoPages,
    #[error(
        "no speech bubbles detected in {pages} page(s); try a sharper scan or another reading mode"
    )]
    NoBubbles { pages: usize },
}

/// Image loader outcomes other than success.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("failed to decode {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: image::ImageError,
    },
}

/// Union of the taxonomy for call sites that can hit several kinds.
#[derive(Debug, Error)]
pub enum NarratorError {
    #[error(transparent)]
    InvalidImage(#[from] InvalidImageError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Tts(#[from] TtsFailure),
    #[error(transparent)]
    NoContent(#[from] NoContentError),
    #[error(transparent)]
    Load(#[from] LoadError),
}
