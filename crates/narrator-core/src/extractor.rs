//! Turning raw OCR blocks into speech-bubble candidates.

use crate::config::ExtractionConfig;
use crate::geometry::Rect;
use crate::model::TextBlock;
use tracing::{debug, trace};
use unicode_normalization::UnicodeNormalization;

/// A merged group of blocks before speaker/emotion classification.
#[derive(Debug, Clone, PartialEq)]
pub struct BubbleDraft {
    pub text: String,
    pub bounds: Rect,
    pub confidence: f32,
}

impl BubbleDraft {
    pub fn as_block(&self) -> TextBlock {
        TextBlock::new(self.bounds, self.text.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotDialogue,
    TooSmall,
    BadAspect,
}

#[derive(Debug, Clone)]
pub struct BubbleExtractor {
    config: ExtractionConfig,
}

impl BubbleExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Filter, group and merge blocks found on a `width` x `height` image.
    pub fn extract(&self, blocks: &[TextBlock], width: u32, height: u32) -> Vec<BubbleDraft> {
        let accepted: Vec<TextBlock> = blocks
            .iter()
            .filter_map(|block| {
                let cleaned = TextBlock::new(block.bounds, clean_text(&block.text));
                match self.check(&cleaned, width, height) {
                    Ok(()) => Some(cleaned),
                    Err(reason) => {
                        trace!(text = %cleaned.text, ?reason, "Rejected OCR block");
                        None
                    }
                }
            })
            .collect();

        let groups = group_blocks(&accepted);
        let mut drafts = Vec::with_capacity(groups.len());
        for group in groups {
            let members: Vec<&TextBlock> = group.iter().map(|&idx| &accepted[idx]).collect();
            let merged = merge_group(&members);
            if members.len() > 1 && self.check(&merged.as_block(), width, height).is_err() {
                // The union left the acceptance band; keep the lines separate.
                debug!(lines = members.len(), "Merged group rejected; emitting lines");
                drafts.extend(members.iter().map(|block| merge_group(&[*block])));
            } else {
                drafts.push(merged);
            }
        }
        debug!(
            blocks = blocks.len(),
            accepted = accepted.len(),
            bubbles = drafts.len(),
            "Extracted bubbles"
        );
        drafts
    }

    /// Run every filter stage on one block.
    pub fn check(&self, block: &TextBlock, width: u32, height: u32) -> Result<(), Rejection> {
        if !self.is_dialogue_likely(&block.text) {
            return Err(Rejection::NotDialogue);
        }
        let webtoon = self.is_webtoon(width, height);
        let image_area = width as f64 * height as f64;
        let min_ratio = if webtoon {
            self.config.webtoon_min_area_ratio
        } else {
            self.config.page_min_area_ratio
        };
        if image_area <= 0.0 || (block.bounds.area() as f64) < image_area * min_ratio as f64 {
            return Err(Rejection::TooSmall);
        }
        let (min_aspect, max_aspect) = if webtoon {
            (self.config.webtoon_aspect_min, self.config.webtoon_aspect_max)
        } else {
            (self.config.page_aspect_min, self.config.page_aspect_max)
        };
        let aspect = block.bounds.aspect_ratio();
        if aspect < min_aspect || aspect > max_aspect {
            return Err(Rejection::BadAspect);
        }
        Ok(())
    }

    pub fn is_webtoon(&self, width: u32, height: u32) -> bool {
        width > 0 && height as f32 / width as f32 > self.config.webtoon_aspect
    }

    fn is_dialogue_likely(&self, text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() < self.config.min_chars {
            return false;
        }
        let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
        if compact
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | ':' | '-' | '/'))
        {
            return false;
        }
        let glyphs = compact.chars().count();
        if (1..=3).contains(&glyphs) && compact.chars().all(|c| c.is_ascii_uppercase()) {
            return false;
        }
        compact.chars().any(char::is_alphabetic)
    }
}

/// NFKC-normalise and collapse all whitespace (line breaks included).
pub fn clean_text(text: &str) -> String {
    let normalized: String = text.nfkc().collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Two blocks belong together when their centers are closer than their
/// average height.
fn is_near(a: &Rect, b: &Rect) -> bool {
    let radius = (a.height() as f32 + b.height() as f32) / 2.0;
    a.center_distance(b) < radius
}

/// Single pass in block order: each block joins the first group holding a
/// block within reach, otherwise it starts a new group.
fn group_blocks(blocks: &[TextBlock]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (idx, block) in blocks.iter().enumerate() {
        let target = groups.iter().position(|group| {
            group
                .iter()
                .any(|&member| is_near(&blocks[member].bounds, &block.bounds))
        });
        match target {
            Some(g) => groups[g].push(idx),
            None => groups.push(vec![idx]),
        }
    }
    groups
}

fn merge_group(members: &[&TextBlock]) -> BubbleDraft {
    let mut ordered: Vec<&TextBlock> = members.to_vec();
    ordered.sort_by_key(|block| (block.bounds.top, block.bounds.left));

    let bounds = ordered
        .iter()
        .map(|block| block.bounds)
        .reduce(|acc, rect| acc.union(&rect))
        .unwrap_or_default();
    let text = ordered
        .iter()
        .map(|block| block.text.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let confidence = letter_ratio(&text);
    BubbleDraft {
        text,
        bounds,
        confidence,
    }
}

fn letter_ratio(text: &str) -> f32 {
    let mut total = 0usize;
    let mut letters = 0usize;
    for ch in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if ch.is_alphabetic() {
            letters += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    letters as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> BubbleExtractor {
        BubbleExtractor::new(ExtractionConfig::default())
    }

    fn block(x: i32, y: i32, w: i32, h: i32, text: &str) -> TextBlock {
        TextBlock::new(Rect::from_xywh(x, y, w, h), text)
    }

    #[test]
    fn adjacent_lines_merge_and_far_block_stays_alone() {
        let blocks = vec![
            block(100, 100, 300, 40, "Where are"),
            block(100, 135, 300, 40, "you going?"),
            block(100, 900, 300, 40, "Over here!"),
        ];
        let bubbles = extractor().extract(&blocks, 1000, 1500);
        assert_eq!(bubbles.len(), 2);
        assert_eq!(bubbles[0].text, "Where are you going?");
        assert_eq!(bubbles[0].bounds, Rect::new(100, 100, 400, 175));
        assert_eq!(bubbles[1].text, "Over here!");
    }

    #[test]
    fn merged_text_is_top_to_bottom_without_line_breaks() {
        let blocks = vec![
            block(100, 135, 300, 40, "second\nline"),
            block(100, 100, 300, 40, "first"),
        ];
        let bubbles = extractor().extract(&blocks, 1000, 1500);
        assert_eq!(bubbles.len(), 1);
        assert_eq!(bubbles[0].text, "first second line");
    }

    #[test]
    fn labels_numbers_and_short_text_are_rejected() {
        let e = extractor();
        let rect = Rect::from_xywh(0, 0, 300, 40);
        for text in ["ok", "1234", "12:30", "SFX", "BAM", "!!??"] {
            assert_eq!(
                e.check(&TextBlock::new(rect, text), 1000, 1500),
                Err(Rejection::NotDialogue),
                "{text}"
            );
        }
        assert!(e.check(&TextBlock::new(rect, "Hey you"), 1000, 1500).is_ok());
    }

    #[test]
    fn area_threshold_adapts_to_webtoon_pages() {
        let e = extractor();
        // 60x20 = 1200px: under 0.3% of a 1000x1500 page, above 0.01% of a webtoon strip.
        let small = TextBlock::new(Rect::from_xywh(0, 0, 60, 20), "hello");
        assert_eq!(e.check(&small, 1000, 1500), Err(Rejection::TooSmall));
        assert!(e.check(&small, 1000, 8000).is_ok());
    }

    #[test]
    fn tall_narrow_blocks_pass_only_on_webtoons() {
        let e = extractor();
        let narrow = TextBlock::new(Rect::from_xywh(0, 0, 100, 400), "vertical words");
        assert_eq!(e.check(&narrow, 1000, 1500), Err(Rejection::BadAspect));
        assert!(e.check(&narrow, 1000, 8000).is_ok());
    }

    #[test]
    fn extraction_output_passes_its_own_filter() {
        let e = extractor();
        let blocks = vec![
            block(100, 100, 300, 40, "Where are"),
            block(100, 135, 300, 40, "you going?"),
            block(500, 500, 60, 120, "Wait"),
            block(500, 560, 60, 120, "for me"),
            block(100, 900, 300, 40, "Over here!"),
        ];
        let first = e.extract(&blocks, 1000, 1500);
        let as_blocks: Vec<TextBlock> = first.iter().map(BubbleDraft::as_block).collect();
        for block in &as_blocks {
            assert!(e.check(block, 1000, 1500).is_ok(), "{}", block.text);
        }
        let second = e.extract(&as_blocks, 1000, 1500);
        assert!(second.len() <= first.len());
        assert!(!second.is_empty());
    }

    #[test]
    fn full_width_text_is_normalized() {
        assert_eq!(clean_text("ＨＥＬＬＯ\n  world"), "HELLO world");
    }
}
