use crate::config::PlaybackMode;
use crate::geometry::Rect;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// Last bubble of the last page narrated; indices are back at zero.
    Finished,
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlaybackStatus::Stopped => "stopped",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Finished => "finished",
        };
        write!(f, "{}", label)
    }
}

/// Position and status of a reading session.
///
/// `scroll_offset_y` is in the coordinates of the analysed image; continuous
/// mode uses it as the OCR cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub current_page_index: usize,
    pub current_bubble_index: usize,
    pub is_playing: bool,
    pub scroll_offset_y: f32,
    pub mode: PlaybackMode,
    pub status: PlaybackStatus,
}

impl PlaybackState {
    pub fn new(mode: PlaybackMode) -> Self {
        Self {
            current_page_index: 0,
            current_bubble_index: 0,
            is_playing: false,
            scroll_offset_y: 0.0,
            mode,
            status: PlaybackStatus::Stopped,
        }
    }

    pub(crate) fn set_status(&mut self, status: PlaybackStatus) {
        self.status = status;
        self.is_playing = status == PlaybackStatus::Playing;
    }

    pub(crate) fn reset_position(&mut self) {
        self.current_page_index = 0;
        self.current_bubble_index = 0;
        self.scroll_offset_y = 0.0;
    }
}

/// What the controller asks the UI to show. Positions are display pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Status { text: String, icon: &'static str },
    ScrollTo { page: usize, y: f32 },
    Highlight { page: usize, bubble: usize, bounds: Rect },
    StateChanged(PlaybackStatus),
    Warning(String),
}
