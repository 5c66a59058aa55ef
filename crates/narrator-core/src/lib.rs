//! Manga and webtoon narration core.
//!
//! Turns page bitmaps into ordered speech bubbles (scale, segment, OCR,
//! extract, classify, sequence) and drives narration over them. OCR, face
//! detection, speech and PDF rendering are reached through the ports in
//! [`services`].

pub mod analysis;
pub mod cache;
pub mod cancellation;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod geometry;
pub mod loader;
pub mod model;
pub mod playback;
pub mod scaler;
pub mod segmenter;
pub mod sequencer;
pub mod services;

pub use analysis::{AnalysisReport, PageAnalyzer};
pub use cancellation::CancellationToken;
pub use error::{
    InvalidImageError, LoadError, NarratorError, NoContentError, RecognitionError, TtsFailure,
};
pub use model::{Emotion, FaceCandidate, Gender, MangaPage, PageImage, SpeechBubble, TextBlock};
