//! Splitting tall pages into OCR-sized chunks.
//!
//! Chunks are planned as [`ChunkSpan`]s first and materialised one at a time,
//! so only one chunk bitmap needs to be alive while a page is analysed.
//! Every span carries a *core* band: detections whose center falls outside it
//! belong to the neighbouring span and are dropped, which keeps overlapping
//! windows from reporting a bubble twice.

use crate::config::{SegmentationConfig, SegmentationPolicy};
use image::RgbaImage;
use image::imageops;
use tracing::{debug, info};

/// A vertical slice of a page, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub y_offset: u32,
    pub height: u32,
    /// Leading part of the span that this chunk is authoritative for.
    pub core_height: u32,
}

impl ChunkSpan {
    pub fn whole(height: u32) -> Self {
        Self {
            y_offset: 0,
            height,
            core_height: height,
        }
    }

    pub fn end(&self) -> u32 {
        self.y_offset + self.height
    }

    pub fn core_end(&self) -> u32 {
        self.y_offset + self.core_height
    }

    /// Whether a page-space y coordinate belongs to this span's core band.
    pub fn owns(&self, y: f32) -> bool {
        y >= self.y_offset as f32 && y < self.core_end() as f32
    }
}

/// A materialised slice ready for OCR.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub bitmap: RgbaImage,
    pub original_y_offset: u32,
    pub original_height: u32,
    pub core_height: u32,
}

impl Chunk {
    pub fn span(&self) -> ChunkSpan {
        ChunkSpan {
            y_offset: self.original_y_offset,
            height: self.original_height,
            core_height: self.core_height,
        }
    }
}

/// One way of cutting a tall page into spans.
pub trait SegmentStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn plan(&self, image: &RgbaImage, target_chunk_height: u32) -> Vec<ChunkSpan>;
}

pub struct WholeImage;

impl SegmentStrategy for WholeImage {
    fn name(&self) -> &'static str {
        "whole"
    }

    fn plan(&self, image: &RgbaImage, _target_chunk_height: u32) -> Vec<ChunkSpan> {
        if image.height() == 0 {
            return Vec::new();
        }
        vec![ChunkSpan::whole(image.height())]
    }
}

/// Fixed-height windows sliding down the page with an overlap margin.
pub struct FixedHeightWindows {
    pub overlap: u32,
}

impl SegmentStrategy for FixedHeightWindows {
    fn name(&self) -> &'static str {
        "fixed-height"
    }

    fn plan(&self, image: &RgbaImage, target_chunk_height: u32) -> Vec<ChunkSpan> {
        viewport_windows(image.height(), target_chunk_height, self.overlap)
    }
}

/// Whitespace-gutter panel detection along the horizontal midpoint.
pub struct PanelBoundaries {
    pub whitespace_brightness: u8,
    pub stride: u32,
    pub min_gap_height: u32,
    pub min_panel_height: u32,
}

impl SegmentStrategy for PanelBoundaries {
    fn name(&self) -> &'static str {
        "panel-boundaries"
    }

    fn plan(&self, image: &RgbaImage, _target_chunk_height: u32) -> Vec<ChunkSpan> {
        let height = image.height();
        let gaps = self.whitespace_runs(image);
        if gaps.is_empty() {
            return Vec::new();
        }

        let mut panels = Vec::new();
        let mut cursor = 0u32;
        for (start, end) in gaps.iter().copied().chain(std::iter::once((height, height))) {
            if start > cursor {
                let panel_height = start - cursor;
                if panel_height >= self.min_panel_height {
                    panels.push(ChunkSpan {
                        y_offset: cursor,
                        height: panel_height,
                        core_height: panel_height,
                    });
                } else {
                    debug!(
                        y = cursor,
                        height = panel_height,
                        "Dropping separator strip below minimum panel height"
                    );
                }
            }
            cursor = cursor.max(end);
        }
        panels
    }
}

impl PanelBoundaries {
    /// Whitespace runs at least `min_gap_height` tall, as `[start, end)` rows.
    fn whitespace_runs(&self, image: &RgbaImage) -> Vec<(u32, u32)> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let x = width / 2;
        let stride = self.stride.max(1);

        let mut runs = Vec::new();
        let mut run: Option<(u32, u32)> = None;
        let mut y = 0u32;
        while y < height {
            if is_whitespace(image, x, y, self.whitespace_brightness) {
                run = Some(match run {
                    Some((start, _)) => (start, y + 1),
                    None => (y, y + 1),
                });
            } else if let Some((start, end)) = run.take() {
                if end - start >= self.min_gap_height {
                    runs.push((start, end));
                }
            }
            y = y.saturating_add(stride);
        }
        if let Some((start, _)) = run {
            // A run reaching the last sample extends to the bottom edge.
            if height - start >= self.min_gap_height {
                runs.push((start, height));
            }
        }
        runs
    }
}

fn is_whitespace(image: &RgbaImage, x: u32, y: u32, threshold: u8) -> bool {
    let [r, g, b, _] = image.get_pixel(x, y).0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    luma >= threshold as f32
}

/// Windows of `window` rows stepping by `window`, each extended by `overlap`.
///
/// Cores tile `[0, height)` exactly; the final window may be partial.
pub fn viewport_windows(height: u32, window: u32, overlap: u32) -> Vec<ChunkSpan> {
    let window = window.max(1);
    let mut spans = Vec::new();
    let mut y = 0u32;
    while y < height {
        let core_height = window.min(height - y);
        let span_height = window.saturating_add(overlap).min(height - y);
        spans.push(ChunkSpan {
            y_offset: y,
            height: span_height,
            core_height,
        });
        y += core_height;
    }
    spans
}

pub struct PageSegmenter {
    config: SegmentationConfig,
    strategy: Box<dyn SegmentStrategy>,
}

impl PageSegmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        let strategy: Box<dyn SegmentStrategy> = match config.policy {
            SegmentationPolicy::Whole => Box::new(WholeImage),
            SegmentationPolicy::FixedHeight | SegmentationPolicy::Viewport => {
                Box::new(FixedHeightWindows {
                    overlap: config.chunk_overlap,
                })
            }
            SegmentationPolicy::PanelBoundaries => Box::new(PanelBoundaries {
                whitespace_brightness: config.whitespace_brightness,
                stride: config.scan_stride,
                min_gap_height: config.min_gap_height,
                min_panel_height: config.min_panel_height,
            }),
        };
        Self { config, strategy }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn is_tall(&self, width: u32, height: u32) -> bool {
        width > 0 && height as f32 / width as f32 >= self.config.tall_aspect_threshold
    }

    /// Spans covering `image`; never empty for a non-empty image.
    pub fn plan(&self, image: &RgbaImage, target_chunk_height: u32) -> Vec<ChunkSpan> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        if !self.is_tall(width, height) {
            return vec![ChunkSpan::whole(height)];
        }

        let spans = self.strategy.plan(image, target_chunk_height);
        if !spans.is_empty() {
            info!(
                strategy = self.strategy.name(),
                chunks = spans.len(),
                height,
                "Segmented tall page"
            );
            return spans;
        }

        let fallback = viewport_windows(height, target_chunk_height, self.config.chunk_overlap);
        info!(
            strategy = self.strategy.name(),
            chunks = fallback.len(),
            height,
            "No boundaries detected; using fixed-height windows"
        );
        fallback
    }

    /// Copy one span out of the page.
    pub fn materialize(&self, image: &RgbaImage, span: ChunkSpan) -> Chunk {
        let height = span.height.min(image.height().saturating_sub(span.y_offset));
        let bitmap = imageops::crop_imm(image, 0, span.y_offset, image.width(), height).to_image();
        Chunk {
            bitmap,
            original_y_offset: span.y_offset,
            original_height: height,
            core_height: span.core_height.min(height),
        }
    }

    pub fn segment(&self, image: &RgbaImage, target_chunk_height: u32) -> Vec<Chunk> {
        self.plan(image, target_chunk_height)
            .into_iter()
            .map(|span| self.materialize(image, span))
            .collect()
    }
}
