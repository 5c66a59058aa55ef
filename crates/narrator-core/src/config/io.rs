use super::models::AppConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return AppConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err:#}");
            AppConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).context("Parsing configuration TOML")?;
    Ok(sanitize(config))
}

pub fn serialize_config(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Serializing configuration")
}

/// Keep runtime values in bounds regardless of where they came from.
fn sanitize(mut config: AppConfig) -> AppConfig {
    let seg = &mut config.segmentation;
    seg.scan_stride = seg.scan_stride.max(1);
    seg.chunk_height = seg.chunk_height.max(1);
    seg.chunk_overlap = seg.chunk_overlap.min(seg.chunk_height.saturating_sub(1));
    seg.tall_aspect_threshold = seg.tall_aspect_threshold.max(1.0);

    let playback = &mut config.playback;
    playback.viewport_height = playback.viewport_height.max(1);
    playback.preview_chars = playback.preview_chars.max(1);

    let extraction = &mut config.extraction;
    if extraction.page_aspect_min > extraction.page_aspect_max {
        std::mem::swap(
            &mut extraction.page_aspect_min,
            &mut extraction.page_aspect_max,
        );
    }
    if extraction.webtoon_aspect_min > extraction.webtoon_aspect_max {
        std::mem::swap(
            &mut extraction.webtoon_aspect_min,
            &mut extraction.webtoon_aspect_max,
        );
    }

    config.scaling.min_ocr_width = config.scaling.min_ocr_width.max(1);
    config.reading_order.row_height = config.reading_order.row_height.max(1);
    config.tts.base_pitch = config.tts.base_pitch.clamp(0.25, 4.0);
    config.tts.base_rate = config.tts.base_rate.clamp(0.25, 4.0);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlaybackMode, ReadingOrderMode, SegmentationPolicy};

    #[test]
    fn missing_sections_use_defaults() {
        let config = parse_config("[playback]\nmode = \"paged\"\n").unwrap();
        assert_eq!(config.playback.mode, PlaybackMode::Paged);
        assert_eq!(config.playback.viewport_height, 1000);
        assert_eq!(config.segmentation.policy, SegmentationPolicy::Viewport);
        assert_eq!(config.scaling.min_ocr_width, 1600);
    }

    #[test]
    fn overlap_is_clamped_below_chunk_height() {
        let config =
            parse_config("[segmentation]\nchunk_height = 500\nchunk_overlap = 900\n").unwrap();
        assert_eq!(config.segmentation.chunk_overlap, 499);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is = = not toml").unwrap();
        let config = load_config(&path);
        assert_eq!(config.reading_order.mode, ReadingOrderMode::TopToBottom);
    }

    #[test]
    fn serialized_config_parses_back() {
        let mut config = AppConfig::default();
        config.reading_order.mode = ReadingOrderMode::RightToLeft;
        let text = serialize_config(&config).unwrap();
        let parsed = parse_config(&text).unwrap();
        assert_eq!(parsed.reading_order.mode, ReadingOrderMode::RightToLeft);
    }
}
