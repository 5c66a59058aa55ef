//! Data carried between the analysis stages and playback.

use crate::geometry::Rect;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// A decoded page bitmap together with the location it was loaded from.
///
/// Owns its pixels; pass it by value into the scaler so the original is freed
/// as soon as a scaled copy exists.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub source: String,
    pub bitmap: RgbaImage,
}

impl PageImage {
    pub fn new(source: impl Into<String>, bitmap: RgbaImage) -> Self {
        Self {
            source: source.into(),
            bitmap,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }
}

/// Raw OCR output for one text region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub bounds: Rect,
    pub text: String,
}

impl TextBlock {
    pub fn new(bounds: Rect, text: impl Into<String>) -> Self {
        Self {
            bounds,
            text: text.into(),
        }
    }
}

/// Face detector output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceCandidate {
    pub bounds: Rect,
    pub smiling_probability: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Scared,
    #[default]
    Neutral,
}

impl Emotion {
    /// Icon shown next to the status preview.
    pub fn icon(self) -> &'static str {
        match self {
            Emotion::Happy => "😊",
            Emotion::Sad => "😢",
            Emotion::Angry => "😠",
            Emotion::Surprised => "😲",
            Emotion::Scared => "😨",
            Emotion::Neutral => "💬",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Scared => "scared",
            Emotion::Neutral => "neutral",
        };
        write!(f, "{}", label)
    }
}

/// One narratable line of dialogue.
///
/// `bounds` lives in the coordinate space of the image it was analysed on;
/// use [`SpeechBubble::rescaled`] whenever the displayed image differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechBubble {
    pub text: String,
    pub bounds: Rect,
    pub confidence: f32,
    pub gender: Gender,
    pub emotion: Emotion,
    pub reading_order: usize,
}

impl SpeechBubble {
    pub fn rescaled(&self, sx: f32, sy: f32) -> SpeechBubble {
        SpeechBubble {
            bounds: self.bounds.scaled(sx, sy),
            ..self.clone()
        }
    }

    /// Short single-line preview for status displays.
    pub fn preview(&self, max_chars: usize) -> String {
        let count = self.text.chars().count();
        if count <= max_chars {
            return self.text.clone();
        }
        let mut preview: String = self.text.chars().take(max_chars).collect();
        preview.push('…');
        preview
    }
}

/// One unit of vertical scroll content with its ordered bubbles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaPage {
    pub page_number: usize,
    pub image_path: String,
    /// Dimensions of the analysed image the bubble boxes refer to.
    pub width: u32,
    pub height: u32,
    pub bubbles: Vec<SpeechBubble>,
}

impl MangaPage {
    /// Copy of this page with boxes mapped onto an image of another size.
    pub fn rescaled_to(&self, width: u32, height: u32) -> MangaPage {
        if self.width == 0 || self.height == 0 {
            return self.clone();
        }
        let sx = width as f32 / self.width as f32;
        let sy = height as f32 / self.height as f32;
        MangaPage {
            page_number: self.page_number,
            image_path: self.image_path.clone(),
            width,
            height,
            bubbles: self.bubbles.iter().map(|b| b.rescaled(sx, sy)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bubble(text: &str) -> SpeechBubble {
        SpeechBubble {
            text: text.to_string(),
            bounds: Rect::new(100, 200, 300, 260),
            confidence: 1.0,
            gender: Gender::Unknown,
            emotion: Emotion::Neutral,
            reading_order: 0,
        }
    }

    #[test]
    fn page_rescale_maps_bubble_boxes() {
        let page = MangaPage {
            page_number: 1,
            image_path: "p1.png".to_string(),
            width: 1600,
            height: 4000,
            bubbles: vec![bubble("Hello there")],
        };
        let shown = page.rescaled_to(800, 2000);
        assert_eq!(shown.bubbles[0].bounds, Rect::new(50, 100, 150, 130));
        assert_eq!(shown.bubbles[0].text, "Hello there");
    }

    #[test]
    fn preview_truncates_long_text() {
        let b = bubble("abcdefghij");
        assert_eq!(b.preview(4), "abcd…");
        assert_eq!(b.preview(20), "abcdefghij");
    }
}
