//! Page image loading with a fixed fallback order: direct path, content-URI
//! resolver, bundled asset directory.

use crate::config::ScalingConfig;
use crate::error::LoadError;
use crate::model::PageImage;
use image::{ImageReader, Limits};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decoded originals may exceed the scaled caps by this factor; the scaler
/// brings them back within bounds.
const DECODE_HEADROOM: u32 = 4;

/// Maps a URI onto a readable path, when it can.
pub trait UriResolver: Send + Sync {
    fn resolve(&self, uri: &str) -> Option<PathBuf>;
}

/// Handles `file://` URIs; every other scheme is left unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileUriResolver;

impl UriResolver for FileUriResolver {
    fn resolve(&self, uri: &str) -> Option<PathBuf> {
        uri.strip_prefix("file://").map(PathBuf::from)
    }
}

pub struct ImageLoader {
    resolver: Box<dyn UriResolver>,
    asset_dir: Option<PathBuf>,
    limits: ScalingConfig,
}

impl ImageLoader {
    pub fn new(limits: ScalingConfig, asset_dir: Option<PathBuf>) -> Self {
        Self {
            resolver: Box::new(FileUriResolver),
            asset_dir,
            limits,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn UriResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// First existing candidate for `location`, in fallback order.
    pub fn locate(&self, location: &str) -> Option<PathBuf> {
        let direct = Some(PathBuf::from(location)).filter(|p| p.is_file());
        direct
            .or_else(|| {
                self.resolver
                    .resolve(location)
                    .filter(|p| p.is_file())
            })
            .or_else(|| {
                let name = Path::new(location).file_name()?;
                let asset = self.asset_dir.as_ref()?.join(name);
                asset.is_file().then_some(asset)
            })
    }

    pub fn load(&self, location: &str) -> Result<PageImage, LoadError> {
        let path = self
            .locate(location)
            .ok_or_else(|| LoadError::NotFound(location.to_string()))?;
        debug!(location, path = %path.display(), "Decoding page image");
        let bitmap = self.decode(&path).map_err(|source| {
            warn!(location, "Failed to decode page image: {source}");
            LoadError::Decode {
                location: location.to_string(),
                source,
            }
        })?;
        Ok(PageImage::new(location, bitmap))
    }

    fn decode(&self, path: &Path) -> image::ImageResult<image::RgbaImage> {
        let mut reader = ImageReader::open(path)?.with_guessed_format()?;
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.limits.max_decode_bytes);
        limits.max_image_width = Some(self.limits.max_width.saturating_mul(DECODE_HEADROOM));
        limits.max_image_height = Some(self.limits.max_height.saturating_mul(DECODE_HEADROOM));
        reader.limits(limits);
        Ok(reader.decode()?.into_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_png(path: &Path) {
        RgbaImage::from_pixel(4, 6, Rgba([255, 255, 255, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn direct_path_then_file_uri_then_asset() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("page1.png");
        write_png(&page);
        let assets = tempfile::tempdir().unwrap();
        write_png(&assets.path().join("bundled.png"));

        let loader = ImageLoader::new(ScalingConfig::default(), Some(assets.path().to_path_buf()));
        let direct = loader.load(page.to_str().unwrap()).unwrap();
        assert_eq!(direct.dimensions(), (4, 6));

        let uri = format!("file://{}", page.display());
        assert_eq!(loader.locate(&uri), Some(page.clone()));

        let bundled = loader.locate("missing/dir/bundled.png");
        assert_eq!(bundled, Some(assets.path().join("bundled.png")));
    }

    struct AssetScheme(PathBuf);

    impl UriResolver for AssetScheme {
        fn resolve(&self, uri: &str) -> Option<PathBuf> {
            uri.strip_prefix("asset://").map(|rest| self.0.join(rest))
        }
    }

    #[test]
    fn custom_resolver_replaces_file_uris() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("ch1.png");
        write_png(&page);
        let loader = ImageLoader::new(ScalingConfig::default(), None)
            .with_resolver(Box::new(AssetScheme(dir.path().to_path_buf())));

        assert_eq!(loader.locate("asset://ch1.png"), Some(page.clone()));
        assert_eq!(loader.locate(&format!("file://{}", page.display())), None);
    }

    #[test]
    fn oversized_dimensions_fail_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tall.png");
        write_png(&path);
        // Caps of 1px allow 4x4 after headroom; the page is 4x6.
        let limits = ScalingConfig {
            max_width: 1,
            max_height: 1,
            ..ScalingConfig::default()
        };
        let loader = ImageLoader::new(limits, None);
        assert!(matches!(
            loader.load(path.to_str().unwrap()),
            Err(LoadError::Decode { .. })
        ));
    }

    #[test]
    fn missing_image_is_not_found() {
        let loader = ImageLoader::new(ScalingConfig::default(), None);
        assert!(matches!(
            loader.load("/nowhere/page.png"),
            Err(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn garbage_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let loader = ImageLoader::new(ScalingConfig::default(), None);
        assert!(matches!(
            loader.load(path.to_str().unwrap()),
            Err(LoadError::Decode { .. })
        ));
    }
}
