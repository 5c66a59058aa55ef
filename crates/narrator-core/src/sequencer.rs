//! Narration order for the bubbles of one page.

use crate::config::{ReadingOrderConfig, ReadingOrderMode};
use crate::model::SpeechBubble;
use std::cmp::Reverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingOrder {
    /// Top edge ascending; webtoons and left-to-right comics.
    TopToBottom,
    /// Rows of `row_height` pixels top-down, right edge descending within a row.
    RightToLeft { row_height: u32 },
}

impl ReadingOrder {
    pub fn from_config(config: &ReadingOrderConfig) -> Self {
        match config.mode {
            ReadingOrderMode::TopToBottom => ReadingOrder::TopToBottom,
            ReadingOrderMode::RightToLeft => ReadingOrder::RightToLeft {
                row_height: config.row_height.max(1),
            },
        }
    }

    /// Sort in place and number the bubbles `0..n`.
    pub fn apply(&self, bubbles: &mut [SpeechBubble]) {
        match *self {
            ReadingOrder::TopToBottom => {
                bubbles.sort_by_key(|b| (b.bounds.top, b.bounds.left));
            }
            ReadingOrder::RightToLeft { row_height } => {
                let row_height = row_height.max(1) as i32;
                bubbles.sort_by_key(|b| {
                    (
                        b.bounds.top.div_euclid(row_height),
                        Reverse(b.bounds.right),
                    )
                });
            }
        }
        for (idx, bubble) in bubbles.iter_mut().enumerate() {
            bubble.reading_order = idx;
        }
    }

    pub fn sequence(&self, mut bubbles: Vec<SpeechBubble>) -> Vec<SpeechBubble> {
        self.apply(&mut bubbles);
        bubbles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::model::{Emotion, Gender};

    fn bubble(text: &str, rect: Rect) -> SpeechBubble {
        SpeechBubble {
            text: text.to_string(),
            bounds: rect,
            confidence: 1.0,
            gender: Gender::Unknown,
            emotion: Emotion::Neutral,
            reading_order: 99,
        }
    }

    fn texts(bubbles: &[SpeechBubble]) -> Vec<&str> {
        bubbles.iter().map(|b| b.text.as_str()).collect()
    }

    #[test]
    fn top_to_bottom_orders_by_top_edge() {
        let ordered = ReadingOrder::TopToBottom.sequence(vec![
            bubble("c", Rect::from_xywh(0, 900, 10, 10)),
            bubble("a", Rect::from_xywh(500, 10, 10, 10)),
            bubble("b", Rect::from_xywh(0, 300, 10, 10)),
        ]);
        assert_eq!(texts(&ordered), vec!["a", "b", "c"]);
        let indices: Vec<usize> = ordered.iter().map(|b| b.reading_order).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn right_to_left_reads_rows_from_the_right() {
        let ordered = ReadingOrder::RightToLeft { row_height: 200 }.sequence(vec![
            bubble("row0-left", Rect::from_xywh(0, 50, 100, 40)),
            bubble("row1-right", Rect::from_xywh(600, 250, 100, 40)),
            bubble("row0-right", Rect::from_xywh(600, 120, 100, 40)),
            bubble("row1-left", Rect::from_xywh(0, 210, 100, 40)),
        ]);
        assert_eq!(
            texts(&ordered),
            vec!["row0-right", "row0-left", "row1-right", "row1-left"]
        );
        assert_eq!(ordered[3].reading_order, 3);
    }
}
