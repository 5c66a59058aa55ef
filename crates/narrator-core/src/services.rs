//! Ports for the engines the core drives but does not implement.
//!
//! OCR and face detection are blocking calls; the analysis pipeline moves
//! them onto the blocking pool. Speech is asynchronous: `speak` hands back a
//! receiver that resolves when the engine reports the utterance done or
//! failed, and `stop` must silence audio without waiting.

use crate::error::{RecognitionError, TtsFailure};
use crate::model::{FaceCandidate, Gender, TextBlock};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;

pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &RgbaImage) -> Result<Vec<TextBlock>, RecognitionError>;
}

pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &RgbaImage) -> Result<Vec<FaceCandidate>, RecognitionError>;
}

/// Detector used when no face engine is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaces;

impl FaceDetector for NoFaces {
    fn detect(&self, _image: &RgbaImage) -> Result<Vec<FaceCandidate>, RecognitionError> {
        Ok(Vec::new())
    }
}

/// Recognizer used when no OCR engine is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoText;

impl TextRecognizer for NoText {
    fn recognize(&self, _image: &RgbaImage) -> Result<Vec<TextBlock>, RecognitionError> {
        Err(RecognitionError::Unavailable(
            "no OCR engine configured".to_string(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Gender reported by the engine, when it reports one.
    #[serde(default)]
    pub gender_hint: Option<Gender>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<String>,
    pub pitch: f32,
    pub rate: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UtteranceOutcome {
    Done,
    Failed(TtsFailure),
}

pub trait SpeechEngine: Send + Sync {
    fn speak(&self, utterance: Utterance) -> oneshot::Receiver<UtteranceOutcome>;
    fn stop(&self);
    fn voices(&self) -> Vec<Voice>;
}

/// Renders a PDF into page images, in page order.
pub trait PdfConverter: Send + Sync {
    fn convert(&self, pdf: &Path) -> anyhow::Result<Vec<PathBuf>>;
}
