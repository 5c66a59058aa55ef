//! Configuration loading for the narrator.
//!
//! All user-tunable settings are centralized here and loaded from
//! `conf/config.toml` if present. Any missing or invalid entries fall back to
//! sensible defaults so a session can still start.

mod defaults;
mod io;
mod models;

pub use io::{load_config, parse_config, serialize_config};
pub use models::{
    AppConfig, CacheConfig, ClassificationConfig, ExtractionConfig, LogLevel, LoggingConfig,
    PlaybackConfig, PlaybackMode, ReadingOrderConfig, ReadingOrderMode, ResumeBehavior,
    ScalingConfig, SegmentationConfig, SegmentationPolicy, ServicesConfig, TtsConfig,
};
