use super::models::{LogLevel, PlaybackMode, ReadingOrderMode, ResumeBehavior, SegmentationPolicy};

pub(crate) fn default_log_level() -> LogLevel {
    LogLevel::Info
}

pub(crate) fn default_min_ocr_width() -> u32 {
    1600
}

pub(crate) fn default_max_pixels() -> u64 {
    45_000_000
}

pub(crate) fn default_max_width() -> u32 {
    4096
}

pub(crate) fn default_max_height() -> u32 {
    65_000
}

pub(crate) fn default_max_decode_bytes() -> u64 {
    512 * 1024 * 1024
}

pub(crate) fn default_segmentation_policy() -> SegmentationPolicy {
    SegmentationPolicy::Viewport
}

pub(crate) fn default_tall_aspect_threshold() -> f32 {
    3.0
}

pub(crate) fn default_chunk_height() -> u32 {
    2000
}

pub(crate) fn default_chunk_overlap() -> u32 {
    300
}

pub(crate) fn default_whitespace_brightness() -> u8 {
    240
}

pub(crate) fn default_scan_stride() -> u32 {
    4
}

pub(crate) fn default_min_gap_height() -> u32 {
    40
}

pub(crate) fn default_min_panel_height() -> u32 {
    150
}

pub(crate) fn default_min_chars() -> usize {
    3
}

pub(crate) fn default_webtoon_aspect() -> f32 {
    3.0
}

pub(crate) fn default_webtoon_min_area_ratio() -> f32 {
    0.0001
}

pub(crate) fn default_page_min_area_ratio() -> f32 {
    0.003
}

pub(crate) fn default_page_aspect_band() -> (f32, f32) {
    (0.5, 15.0)
}

pub(crate) fn default_webtoon_aspect_band() -> (f32, f32) {
    (0.15, 25.0)
}

pub(crate) fn default_male_aspect_above() -> f32 {
    0.85
}

pub(crate) fn default_female_aspect_below() -> f32 {
    0.75
}

pub(crate) fn default_smile_threshold() -> f32 {
    0.7
}

pub(crate) fn default_reading_order_mode() -> ReadingOrderMode {
    ReadingOrderMode::TopToBottom
}

pub(crate) fn default_row_height() -> u32 {
    200
}

pub(crate) fn default_playback_mode() -> PlaybackMode {
    PlaybackMode::Continuous
}

pub(crate) fn default_viewport_height() -> u32 {
    1000
}

pub(crate) fn default_settle_delay_ms() -> u64 {
    400
}

pub(crate) fn default_inter_page_pause_ms() -> u64 {
    800
}

pub(crate) fn default_center_spoken_bubble() -> bool {
    true
}

pub(crate) fn default_resume_behavior() -> ResumeBehavior {
    ResumeBehavior::ResumeIfAutoPaused
}

pub(crate) fn default_preview_chars() -> usize {
    40
}

pub(crate) fn default_tts_command() -> String {
    "espeak-ng".to_string()
}

pub(crate) fn default_tts_pitch() -> f32 {
    1.0
}

pub(crate) fn default_tts_rate() -> f32 {
    1.0
}

pub(crate) fn default_pdf_converter() -> String {
    "pdftoppm".to_string()
}

pub(crate) fn default_pdf_dpi() -> u32 {
    150
}

pub(crate) fn default_cache_enabled() -> bool {
    true
}

pub(crate) fn default_cache_dir() -> String {
    ".cache".to_string()
}
