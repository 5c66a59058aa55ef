//! Page analysis: scaled bitmap in, ordered bubbles out.
//!
//! OCR and face detection run on the blocking pool, one chunk at a time.
//! Failures stay local: an OCR error empties its chunk, a face error leaves
//! gender unknown, a bad image drops its page. Only an empty session is an
//! error.

use crate::cache::{CacheStore, settings_fingerprint};
use crate::cancellation::CancellationToken;
use crate::classifier::SpeakerClassifier;
use crate::config::AppConfig;
use crate::error::{InvalidImageError, NarratorError, NoContentError, RecognitionError};
use crate::extractor::BubbleExtractor;
use crate::loader::ImageLoader;
use crate::model::{FaceCandidate, MangaPage, SpeechBubble, TextBlock};
use crate::scaler::ImageScaler;
use crate::segmenter::{ChunkSpan, PageSegmenter};
use crate::sequencer::ReadingOrder;
use crate::services::{FaceDetector, TextRecognizer};
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of analysing every page of a session.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub pages: Vec<MangaPage>,
    /// Sources that could not be analysed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl AnalysisReport {
    pub fn bubble_count(&self) -> usize {
        self.pages.iter().map(|p| p.bubbles.len()).sum()
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} bubble(s) across {} page(s)",
            self.bubble_count(),
            self.pages.len()
        );
        if !self.failed.is_empty() {
            text.push_str(&format!(", {} page(s) skipped", self.failed.len()));
        }
        text
    }
}

pub struct PageAnalyzer {
    scaler: ImageScaler,
    segmenter: PageSegmenter,
    extractor: BubbleExtractor,
    classifier: SpeakerClassifier,
    order: ReadingOrder,
    loader: ImageLoader,
    recognizer: Arc<dyn TextRecognizer>,
    faces: Arc<dyn FaceDetector>,
    cache: Option<CacheStore>,
    fingerprint: String,
}

impl PageAnalyzer {
    pub fn new(
        config: &AppConfig,
        recognizer: Arc<dyn TextRecognizer>,
        faces: Arc<dyn FaceDetector>,
    ) -> Self {
        let asset_dir = config.services.asset_dir.as_ref().map(PathBuf::from);
        Self {
            scaler: ImageScaler::new(config.scaling.clone()),
            segmenter: PageSegmenter::new(config.segmentation.clone()),
            extractor: BubbleExtractor::new(config.extraction.clone()),
            classifier: SpeakerClassifier::from_config(&config.classification),
            order: ReadingOrder::from_config(&config.reading_order),
            loader: ImageLoader::new(config.scaling.clone(), asset_dir),
            recognizer,
            faces,
            cache: CacheStore::from_config(&config.cache),
            fingerprint: settings_fingerprint(config),
        }
    }

    pub fn with_cache(mut self, cache: Option<CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    pub fn scaler(&self) -> &ImageScaler {
        &self.scaler
    }

    pub fn segmenter(&self) -> &PageSegmenter {
        &self.segmenter
    }

    /// Analyse every source in order. Pages that fail are reported and skipped.
    pub async fn analyze_session(
        &self,
        sources: &[String],
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, NarratorError> {
        if sources.is_empty() {
            return Err(NoContentError::NoPages.into());
        }
        let mut report = AnalysisReport::default();
        for (page_number, source) in sources.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(analysed = page_number, "Analysis cancelled");
                break;
            }
            match self.analyze_page(page_number, source).await {
                Ok(page) => {
                    info!(
                        page = page_number,
                        bubbles = page.bubbles.len(),
                        "Analysed page"
                    );
                    report.pages.push(page);
                }
                Err(err) => {
                    warn!(page = page_number, source = %source, "Skipping page: {err}");
                    report.failed.push((source.clone(), err.to_string()));
                }
            }
        }
        if report.bubble_count() == 0 {
            warn!(pages = sources.len(), "No bubbles detected");
            return Err(NoContentError::NoBubbles {
                pages: sources.len(),
            }
            .into());
        }
        info!(summary = %report.summary(), "Analysis finished");
        Ok(report)
    }

    /// Load, scale and analyse one page, going through the cache when enabled.
    pub async fn analyze_page(
        &self,
        page_number: usize,
        source: &str,
    ) -> Result<MangaPage, NarratorError> {
        let cache_path = self
            .cache
            .as_ref()
            .and_then(|_| self.loader.locate(source));
        if let (Some(cache), Some(path)) = (&self.cache, &cache_path) {
            if let Some(mut page) = cache.load_analysis(path, &self.fingerprint) {
                debug!(page = page_number, "Using cached analysis");
                page.page_number = page_number;
                page.image_path = source.to_string();
                return Ok(page);
            }
        }

        let image = self.loader.load(source)?;
        let page = self
            .analyze_bitmap(page_number, &image.source, image.bitmap)
            .await?;
        if let (Some(cache), Some(path)) = (&self.cache, &cache_path) {
            cache.save_analysis(path, &self.fingerprint, &page);
        }
        Ok(page)
    }

    /// Analyse a decoded bitmap. The original is consumed and dropped once
    /// the scaled copy exists; bubble boxes refer to the scaled image.
    pub async fn analyze_bitmap(
        &self,
        page_number: usize,
        source: &str,
        bitmap: RgbaImage,
    ) -> Result<MangaPage, InvalidImageError> {
        let scaled = self.scaler.scale(bitmap)?;
        let image = scaled.bitmap;
        let (width, height) = image.dimensions();
        let spans = self
            .segmenter
            .plan(&image, self.segmenter.config().chunk_height);
        let mut bubbles = Vec::new();
        for span in spans {
            bubbles.extend(self.analyze_span(&image, span).await);
        }
        Ok(MangaPage {
            page_number,
            image_path: source.to_string(),
            width,
            height,
            bubbles: self.order.sequence(bubbles),
        })
    }

    /// Bubbles whose center lies in `span`'s core band, in page coordinates
    /// and reading order.
    pub async fn analyze_span(&self, image: &RgbaImage, span: ChunkSpan) -> Vec<SpeechBubble> {
        let chunk = self.segmenter.materialize(image, span);
        let span = chunk.span();
        let (width, height) = chunk.bitmap.dimensions();
        let (blocks, faces) = match self.recognize(chunk.bitmap).await {
            Ok(found) => found,
            Err(err) => {
                warn!(y_offset = span.y_offset, "OCR failed for chunk: {err}");
                return Vec::new();
            }
        };

        let dy = span.y_offset as i32;
        let bubbles: Vec<SpeechBubble> = self
            .extractor
            .extract(&blocks, width, height)
            .into_iter()
            .map(|draft| {
                let mut bubble = self.classifier.classify(draft, &faces);
                bubble.bounds = bubble.bounds.translated(0, dy);
                bubble
            })
            .filter(|bubble| span.owns(bubble.bounds.center_y()))
            .collect();
        debug!(
            y_offset = span.y_offset,
            blocks = blocks.len(),
            faces = faces.len(),
            bubbles = bubbles.len(),
            "Analysed chunk"
        );
        self.order.sequence(bubbles)
    }

    async fn recognize(
        &self,
        bitmap: RgbaImage,
    ) -> Result<(Vec<TextBlock>, Vec<FaceCandidate>), RecognitionError> {
        let recognizer = Arc::clone(&self.recognizer);
        let detector = Arc::clone(&self.faces);
        tokio::task::spawn_blocking(move || -> Result<_, RecognitionError> {
            let blocks = recognizer.recognize(&bitmap)?;
            let faces = detector.detect(&bitmap).unwrap_or_else(|err| {
                warn!("Face detection failed; speaker gender will be unknown: {err}");
                Vec::new()
            });
            Ok((blocks, faces))
        })
        .await
        .map_err(|err| RecognitionError::Aborted(err.to_string()))?
    }
}
