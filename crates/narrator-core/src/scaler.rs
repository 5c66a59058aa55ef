//! Page scaling under OCR legibility and memory limits.
//!
//! Two forces pull in opposite directions: OCR needs a minimum width to read
//! small lettering, while decode/render pipelines cap total pixels and edge
//! lengths. When they conflict the width floor wins and the result is
//! flagged so callers can log the memory risk.

use crate::config::ScalingConfig;
use crate::error::InvalidImageError;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use tracing::{debug, warn};

/// Target geometry computed before any pixels are touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalePlan {
    pub width: u32,
    pub height: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// The width floor forced a result above the pixel budget or height cap.
    pub exceeds_budget: bool,
}

impl ScalePlan {
    pub fn is_identity(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A scaled bitmap and the factors mapping original coordinates onto it.
#[derive(Debug, Clone)]
pub struct ScaledImage {
    pub bitmap: RgbaImage,
    pub scale_x: f32,
    pub scale_y: f32,
    pub exceeds_budget: bool,
}

/// Compute target dimensions for a `width` x `height` bitmap.
pub fn plan_scale(
    width: u32,
    height: u32,
    constraints: &ScalingConfig,
) -> Result<ScalePlan, InvalidImageError> {
    if width == 0 || height == 0 {
        return Err(InvalidImageError::new(format!(
            "zero-sized bitmap {width}x{height}"
        )));
    }

    let pixels = width as u64 * height as u64;
    let min_width = constraints.min_ocr_width.max(1);

    let mut target_width = if width < min_width || pixels > constraints.max_pixels {
        min_width
    } else {
        width
    };
    if target_width > constraints.max_width && constraints.max_width >= min_width {
        target_width = constraints.max_width;
    }

    let ratio = target_width as f64 / width as f64;
    let mut target_height = scaled_edge(height, ratio);

    // A height cap may shrink further, but never below the OCR width floor.
    if target_height > constraints.max_height {
        let capped_ratio = constraints.max_height as f64 / height as f64;
        let capped_width = scaled_edge(width, capped_ratio);
        if capped_width >= min_width {
            target_width = capped_width;
            target_height = constraints.max_height;
        }
    }

    let exceeds_budget = target_width as u64 * target_height as u64 > constraints.max_pixels
        || target_height > constraints.max_height;

    Ok(ScalePlan {
        width: target_width,
        height: target_height,
        scale_x: target_width as f32 / width as f32,
        scale_y: target_height as f32 / height as f32,
        exceeds_budget,
    })
}

fn scaled_edge(edge: u32, ratio: f64) -> u32 {
    ((edge as f64 * ratio).round() as u32).max(1)
}

#[derive(Debug, Clone)]
pub struct ImageScaler {
    constraints: ScalingConfig,
}

impl ImageScaler {
    pub fn new(constraints: ScalingConfig) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &ScalingConfig {
        &self.constraints
    }

    /// Scale `bitmap`, consuming it so the original is released on return.
    pub fn scale(&self, bitmap: RgbaImage) -> Result<ScaledImage, InvalidImageError> {
        let (width, height) = bitmap.dimensions();
        let plan = plan_scale(width, height, &self.constraints)?;
        if plan.exceeds_budget {
            warn!(
                width,
                height,
                target_width = plan.width,
                target_height = plan.height,
                budget = self.constraints.max_pixels,
                "OCR width floor forces a scaled page past the memory budget"
            );
        }
        if plan.is_identity(width, height) {
            debug!(width, height, "Page already within scaling limits");
            return Ok(ScaledImage {
                bitmap,
                scale_x: 1.0,
                scale_y: 1.0,
                exceeds_budget: plan.exceeds_budget,
            });
        }

        let filter = if plan.width > width {
            FilterType::CatmullRom
        } else {
            FilterType::Triangle
        };
        debug!(
            width,
            height,
            target_width = plan.width,
            target_height = plan.height,
            "Scaling page"
        );
        let scaled = imageops::resize(&bitmap, plan.width, plan.height, filter);
        drop(bitmap);
        Ok(ScaledImage {
            bitmap: scaled,
            scale_x: plan.scale_x,
            scale_y: plan.scale_y,
            exceeds_budget: plan.exceeds_budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints() -> ScalingConfig {
        ScalingConfig {
            min_ocr_width: 1600,
            max_pixels: 45_000_000,
            max_width: 4096,
            max_height: 65_000,
            max_decode_bytes: 512 * 1024 * 1024,
        }
    }

    #[test]
    fn narrow_page_within_budget_scales_up_to_min_width() {
        let plan = plan_scale(800, 1200, &constraints()).unwrap();
        assert_eq!(plan.width, 1600);
        assert_eq!(plan.height, 2400);
        assert!((plan.scale_y - 2.0).abs() < f32::EPSILON);
        assert!(!plan.exceeds_budget);
    }

    #[test]
    fn oversize_page_is_clamped_to_min_width() {
        let plan = plan_scale(6000, 20000, &constraints()).unwrap();
        assert_eq!(plan.width, 1600);
        assert_eq!(plan.height, 5333);
        assert!(plan.pixels() <= 45_000_000);
        assert!(!plan.exceeds_budget);
    }

    #[test]
    fn width_floor_wins_over_pixel_budget() {
        // 800 x 60000 scaled to 1600 wide doubles to 192M pixels.
        let plan = plan_scale(800, 60_000, &constraints()).unwrap();
        assert_eq!(plan.width, 1600);
        assert_eq!(plan.height, 120_000);
        assert!(plan.exceeds_budget);
    }

    #[test]
    fn page_within_limits_is_untouched() {
        let plan = plan_scale(2000, 3000, &constraints()).unwrap();
        assert!(plan.is_identity(2000, 3000));
        assert!((plan.scale_x - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn height_cap_shrinks_when_width_allows() {
        let mut limits = constraints();
        limits.max_height = 10_000;
        let plan = plan_scale(4000, 11_000, &limits).unwrap();
        assert_eq!(plan.height, 10_000);
        assert_eq!(plan.width, 3636);
        assert!(!plan.exceeds_budget);
    }

    #[test]
    fn zero_dimension_is_invalid() {
        assert!(plan_scale(0, 100, &constraints()).is_err());
        let scaler = ImageScaler::new(constraints());
        assert!(scaler.scale(RgbaImage::new(10, 0)).is_err());
    }

    #[test]
    fn scale_reports_achieved_factor() {
        let mut limits = constraints();
        limits.min_ocr_width = 20;
        let scaler = ImageScaler::new(limits);
        let scaled = scaler.scale(RgbaImage::new(10, 30)).unwrap();
        assert_eq!(scaled.bitmap.dimensions(), (20, 60));
        assert!((scaled.scale_y - 2.0).abs() < f32::EPSILON);
    }
}
