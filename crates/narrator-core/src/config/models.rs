use super::defaults;
use crate::model::Gender;
use serde::{Deserialize, Serialize};

/// High-level app configuration; deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub reading_order: ReadingOrderConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::default_log_level(),
        }
    }
}

/// Memory and legibility limits applied before OCR.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Narrower images are scaled up to this width.
    pub min_ocr_width: u32,
    /// Total pixel budget of a scaled page.
    pub max_pixels: u64,
    pub max_width: u32,
    pub max_height: u32,
    /// Allocation ceiling handed to the decoder.
    pub max_decode_bytes: u64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_ocr_width: defaults::default_min_ocr_width(),
            max_pixels: defaults::default_max_pixels(),
            max_width: defaults::default_max_width(),
            max_height: defaults::default_max_height(),
            max_decode_bytes: defaults::default_max_decode_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentationPolicy {
    /// Always analyse the page as one chunk.
    Whole,
    /// Fixed-height windows with an overlap margin.
    FixedHeight,
    /// Split on horizontal whitespace gutters between panels.
    PanelBoundaries,
    /// On-demand viewport windows during continuous playback.
    Viewport,
}

impl std::fmt::Display for SegmentationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SegmentationPolicy::Whole => "whole",
            SegmentationPolicy::FixedHeight => "fixed-height",
            SegmentationPolicy::PanelBoundaries => "panel-boundaries",
            SegmentationPolicy::Viewport => "viewport",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub policy: SegmentationPolicy,
    /// Height/width ratio at or above which a page is split.
    pub tall_aspect_threshold: f32,
    pub chunk_height: u32,
    pub chunk_overlap: u32,
    /// Luma at or above which a sampled pixel counts as whitespace.
    pub whitespace_brightness: u8,
    pub scan_stride: u32,
    pub min_gap_height: u32,
    pub min_panel_height: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            policy: defaults::default_segmentation_policy(),
            tall_aspect_threshold: defaults::default_tall_aspect_threshold(),
            chunk_height: defaults::default_chunk_height(),
            chunk_overlap: defaults::default_chunk_overlap(),
            whitespace_brightness: defaults::default_whitespace_brightness(),
            scan_stride: defaults::default_scan_stride(),
            min_gap_height: defaults::default_min_gap_height(),
            min_panel_height: defaults::default_min_panel_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub min_chars: usize,
    /// Height/width ratio above which the image is treated as a webtoon.
    pub webtoon_aspect: f32,
    pub webtoon_min_area_ratio: f32,
    pub page_min_area_ratio: f32,
    pub page_aspect_min: f32,
    pub page_aspect_max: f32,
    pub webtoon_aspect_min: f32,
    pub webtoon_aspect_max: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let (page_aspect_min, page_aspect_max) = defaults::default_page_aspect_band();
        let (webtoon_aspect_min, webtoon_aspect_max) = defaults::default_webtoon_aspect_band();
        Self {
            min_chars: defaults::default_min_chars(),
            webtoon_aspect: defaults::default_webtoon_aspect(),
            webtoon_min_area_ratio: defaults::default_webtoon_min_area_ratio(),
            page_min_area_ratio: defaults::default_page_min_area_ratio(),
            page_aspect_min,
            page_aspect_max,
            webtoon_aspect_min,
            webtoon_aspect_max,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub male_aspect_above: f32,
    pub female_aspect_below: f32,
    pub smile_threshold: f32,
    /// Forces every bubble to one voice gender when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender_override: Option<Gender>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            male_aspect_above: defaults::default_male_aspect_above(),
            female_aspect_below: defaults::default_female_aspect_below(),
            smile_threshold: defaults::default_smile_threshold(),
            gender_override: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReadingOrderMode {
    TopToBottom,
    RightToLeft,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadingOrderConfig {
    pub mode: ReadingOrderMode,
    /// Band height used to group bubbles into rows for right-to-left order.
    pub row_height: u32,
}

impl Default for ReadingOrderConfig {
    fn default() -> Self {
        Self {
            mode: defaults::default_reading_order_mode(),
            row_height: defaults::default_row_height(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackMode {
    /// Step through bubbles precomputed for each page.
    Paged,
    /// OCR each viewport of one tall image on demand.
    Continuous,
}

impl std::fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlaybackMode::Paged => "paged",
            PlaybackMode::Continuous => "continuous",
        };
        write!(f, "{}", label)
    }
}

/// What a lifecycle `resume()` does after a lifecycle `pause()`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeBehavior {
    ResumeIfAutoPaused,
    StayPaused,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub mode: PlaybackMode,
    pub viewport_height: u32,
    pub settle_delay_ms: u64,
    pub inter_page_pause_ms: u64,
    pub center_spoken_bubble: bool,
    pub resume_behavior: ResumeBehavior,
    pub preview_chars: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            mode: defaults::default_playback_mode(),
            viewport_height: defaults::default_viewport_height(),
            settle_delay_ms: defaults::default_settle_delay_ms(),
            inter_page_pause_ms: defaults::default_inter_page_pause_ms(),
            center_spoken_bubble: defaults::default_center_spoken_bubble(),
            resume_behavior: defaults::default_resume_behavior(),
            preview_chars: defaults::default_preview_chars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Program invoked once per utterance.
    pub command: String,
    pub base_pitch: f32,
    pub base_rate: f32,
    /// Voice used when no gender pool matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_voice: Option<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            command: defaults::default_tts_command(),
            base_pitch: defaults::default_tts_pitch(),
            base_rate: defaults::default_tts_rate(),
            default_voice: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// OCR/face sidecar worker; sessions without one find no bubbles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar_command: Option<String>,
    pub sidecar_args: Vec<String>,
    /// Fallback directory for bundled page assets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_dir: Option<String>,
    pub pdf_converter: String,
    pub pdf_dpi: u32,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            sidecar_command: None,
            sidecar_args: Vec::new(),
            asset_dir: None,
            pdf_converter: defaults::default_pdf_converter(),
            pdf_dpi: defaults::default_pdf_dpi(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::default_cache_enabled(),
            dir: defaults::default_cache_dir(),
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        defaults::default_log_level()
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
