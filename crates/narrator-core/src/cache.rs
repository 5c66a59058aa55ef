//! On-disk cache for analysis results and reading position.
//!
//! Entries live under `<dir>/<sha256>/`, the hash keeping arbitrary source
//! paths and URIs filesystem-safe. Analyses are JSON (`analysis.json`), the
//! bookmark is a tiny TOML file (`bookmark.toml`). Write failures are logged
//! and otherwise ignored so a read-only disk never stops narration.

use crate::config::{AppConfig, CacheConfig};
use crate::model::MangaPage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// Last narrated position for a list of sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Bookmark {
    pub page: usize,
    #[serde(default)]
    pub bubble: usize,
    #[serde(default)]
    pub scroll_y: f32,
}

#[derive(Serialize, Deserialize)]
struct AnalysisEntry {
    size: u64,
    modified_secs: u64,
    page: MangaPage,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(&config.dir))
    }

    pub fn hash_dir(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.root.join(format!("{:x}", hasher.finalize()))
    }

    /// Cached analysis of `image`, if the file is unchanged since it was stored.
    pub fn load_analysis(&self, image: &Path, fingerprint: &str) -> Option<MangaPage> {
        let path = self.analysis_path(image, fingerprint);
        let data = fs::read_to_string(&path).ok()?;
        let entry: AnalysisEntry = serde_json::from_str(&data).ok()?;
        let (size, modified_secs) = file_stamp(image)?;
        if entry.size != size || entry.modified_secs != modified_secs {
            debug!(path = %image.display(), "Cached analysis is stale");
            return None;
        }
        Some(entry.page)
    }

    pub fn save_analysis(&self, image: &Path, fingerprint: &str, page: &MangaPage) {
        let Some((size, modified_secs)) = file_stamp(image) else {
            return;
        };
        let entry = AnalysisEntry {
            size,
            modified_secs,
            page: page.clone(),
        };
        match serde_json::to_string(&entry) {
            Ok(contents) => write_entry(&self.analysis_path(image, fingerprint), &contents),
            Err(err) => warn!("Failed to serialize analysis cache entry: {err}"),
        }
    }

    pub fn load_bookmark(&self, source_key: &str) -> Option<Bookmark> {
        let data = fs::read_to_string(self.bookmark_path(source_key)).ok()?;
        toml::from_str(&data).ok()
    }

    pub fn save_bookmark(&self, source_key: &str, bookmark: &Bookmark) {
        match toml::to_string(bookmark) {
            Ok(contents) => write_entry(&self.bookmark_path(source_key), &contents),
            Err(err) => warn!("Failed to serialize bookmark: {err}"),
        }
    }

    fn analysis_path(&self, image: &Path, fingerprint: &str) -> PathBuf {
        let key = format!("{}\n{fingerprint}", image.to_string_lossy());
        self.hash_dir(&key).join("analysis.json")
    }

    fn bookmark_path(&self, source_key: &str) -> PathBuf {
        self.hash_dir(source_key).join("bookmark.toml")
    }
}

/// Digest of every setting that changes analysis output.
pub fn settings_fingerprint(config: &AppConfig) -> String {
    let relevant = (
        &config.scaling,
        &config.segmentation,
        &config.extraction,
        &config.classification,
        &config.reading_order,
    );
    let encoded = serde_json::to_string(&relevant).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Key identifying an ordered list of sources.
pub fn source_key(sources: &[String]) -> String {
    sources.join("\n")
}

fn file_stamp(path: &Path) -> Option<(u64, u64)> {
    let meta = fs::metadata(path).ok()?;
    let modified = meta
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Some((meta.len(), modified))
}

fn write_entry(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            warn!(path = %parent.display(), "Failed to create cache dir: {err}");
            return;
        }
    }
    if let Err(err) = fs::write(path, contents) {
        warn!(path = %path.display(), "Failed to write cache entry: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::model::{Emotion, Gender, SpeechBubble};

    fn page() -> MangaPage {
        MangaPage {
            page_number: 0,
            image_path: "page.png".to_string(),
            width: 1600,
            height: 2400,
            bubbles: vec![SpeechBubble {
                text: "Hello there".to_string(),
                bounds: Rect::from_xywh(10, 20, 300, 60),
                confidence: 0.9,
                gender: Gender::Female,
                emotion: Emotion::Happy,
                reading_order: 0,
            }],
        }
    }

    #[test]
    fn analysis_round_trips_until_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("page.png");
        fs::write(&image, b"first").unwrap();
        let store = CacheStore::new(dir.path().join(".cache"));

        assert!(store.load_analysis(&image, "fp").is_none());
        store.save_analysis(&image, "fp", &page());
        assert_eq!(store.load_analysis(&image, "fp"), Some(page()));
        assert!(store.load_analysis(&image, "other").is_none());

        fs::write(&image, b"changed length").unwrap();
        assert!(store.load_analysis(&image, "fp").is_none());
    }

    #[test]
    fn bookmark_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let key = source_key(&["a.png".to_string(), "b.png".to_string()]);
        assert!(store.load_bookmark(&key).is_none());

        let bookmark = Bookmark {
            page: 1,
            bubble: 3,
            scroll_y: 420.0,
        };
        store.save_bookmark(&key, &bookmark);
        assert_eq!(store.load_bookmark(&key), Some(bookmark));
        assert!(store.hash_dir(&key).join("bookmark.toml").exists());
    }

    #[test]
    fn fingerprint_tracks_analysis_settings_only() {
        let base = AppConfig::default();
        let mut other = base.clone();
        other.playback.viewport_height += 1;
        assert_eq!(settings_fingerprint(&base), settings_fingerprint(&other));
        other.extraction.min_chars += 1;
        assert_ne!(settings_fingerprint(&base), settings_fingerprint(&other));
    }

    #[test]
    fn disabled_cache_yields_no_store() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(CacheStore::from_config(&config).is_none());
    }
}
