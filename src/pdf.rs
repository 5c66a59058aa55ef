//! PDF pages rendered to PNG through `pdftoppm`.
//!
//! Rendered pages are kept under the cache directory, keyed by the PDF path,
//! its size and modification time and the render DPI, so reopening a volume
//! skips the conversion.

use anyhow::{Context, Result};
use narrator_core::cache::CacheStore;
use narrator_core::config::{CacheConfig, ServicesConfig};
use narrator_core::services::PdfConverter;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

const DONE_MARKER: &str = ".complete";

pub struct PdftoppmConverter {
    program: String,
    dpi: u32,
    store: CacheStore,
}

impl PdftoppmConverter {
    pub fn from_config(services: &ServicesConfig, cache: &CacheConfig) -> Self {
        let store = if cache.enabled {
            CacheStore::new(&cache.dir)
        } else {
            CacheStore::new(std::env::temp_dir().join("manga-narrator-pdf"))
        };
        Self {
            program: services.pdf_converter.clone(),
            dpi: services.pdf_dpi,
            store,
        }
    }

    fn output_dir(&self, pdf: &Path) -> Result<PathBuf> {
        let meta =
            fs::metadata(pdf).with_context(|| format!("Failed to read {}", pdf.display()))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let signature = format!(
            "pdf:{}:{}:{modified}:{}",
            pdf.to_string_lossy(),
            meta.len(),
            self.dpi
        );
        Ok(self.store.hash_dir(&signature).join("pages"))
    }
}

impl PdfConverter for PdftoppmConverter {
    fn convert(&self, pdf: &Path) -> Result<Vec<PathBuf>> {
        let out_dir = self.output_dir(pdf)?;
        if out_dir.join(DONE_MARKER).exists() {
            let pages = rendered_pages(&out_dir)?;
            if !pages.is_empty() {
                info!(path = %pdf.display(), pages = pages.len(), "Using cached PDF pages");
                return Ok(pages);
            }
        }

        fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;
        debug!(path = %pdf.display(), dpi = self.dpi, "Rendering PDF pages");
        let output = Command::new(&self.program)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(pdf)
            .arg(out_dir.join("page"))
            .output()
            .with_context(|| {
                format!("Failed to start {} for {}", self.program, pdf.display())
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} conversion failed for {}: {}",
                self.program,
                pdf.display(),
                stderr.trim()
            );
        }

        let pages = rendered_pages(&out_dir)?;
        if pages.is_empty() {
            anyhow::bail!("{} produced no pages for {}", self.program, pdf.display());
        }
        fs::write(out_dir.join(DONE_MARKER), b"")
            .with_context(|| format!("Failed to finish {}", out_dir.display()))?;
        Ok(pages)
    }
}

/// PNGs in `dir`, ordered by page number (`page-2.png` before `page-10.png`).
fn rendered_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("png"))
                .unwrap_or(false)
        })
        .filter_map(|path| page_number(&path).map(|number| (number, path)))
        .collect();
    pages.sort();
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_sort_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-02.png", "page-1.png", "notes.txt", "cover.png"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = rendered_pages(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-02.png", "page-10.png"]);
    }

    #[test]
    fn completed_renders_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("vol.pdf");
        fs::write(&pdf, b"%PDF-1.4").unwrap();
        let converter = PdftoppmConverter::from_config(
            &ServicesConfig {
                pdf_converter: "definitely-not-installed-pdftoppm".to_string(),
                ..ServicesConfig::default()
            },
            &CacheConfig {
                enabled: true,
                dir: dir.path().join(".cache").to_string_lossy().into_owned(),
            },
        );
        assert!(converter.convert(&pdf).is_err());

        let out_dir = converter.output_dir(&pdf).unwrap();
        fs::write(out_dir.join("page-1.png"), b"").unwrap();
        fs::write(out_dir.join(DONE_MARKER), b"").unwrap();
        assert_eq!(converter.convert(&pdf).unwrap(), vec![out_dir.join("page-1.png")]);
    }
}
