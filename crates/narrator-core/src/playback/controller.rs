//! The narration state machine.
//!
//! One loop task per play request. The loop and the public operations share
//! [`PlaybackState`] behind a mutex that is never held across an await.
//! Every play request gets a generation number and a cancellation token;
//! pausing bumps the generation, cancels the token and stops the speech
//! engine. After each suspension the loop re-checks its generation and
//! exits without touching state if it has been superseded.

use super::state::{PlaybackEvent, PlaybackState, PlaybackStatus};
use super::voice::VoiceSelector;
use crate::analysis::PageAnalyzer;
use crate::cache::Bookmark;
use crate::cancellation::CancellationToken;
use crate::config::{PlaybackConfig, PlaybackMode, ResumeBehavior, TtsConfig};
use crate::error::{NoContentError, TtsFailure};
use crate::geometry::Rect;
use crate::model::{Gender, MangaPage, SpeechBubble};
use crate::segmenter::ChunkSpan;
use crate::services::{SpeechEngine, UtteranceOutcome};
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One tall image narrated viewport by viewport.
pub struct Strip {
    pub source: String,
    pub bitmap: RgbaImage,
    pub analyzer: Arc<PageAnalyzer>,
}

pub enum PlaybackContent {
    /// Pre-analysed pages.
    Pages(Vec<MangaPage>),
    /// OCR on demand, one viewport at a time.
    Strip(Strip),
}

impl PlaybackContent {
    pub fn mode(&self) -> PlaybackMode {
        match self {
            PlaybackContent::Pages(_) => PlaybackMode::Paged,
            PlaybackContent::Strip(_) => PlaybackMode::Continuous,
        }
    }

    fn page_count(&self) -> usize {
        match self {
            PlaybackContent::Pages(pages) => pages.len(),
            PlaybackContent::Strip(_) => 1,
        }
    }
}

/// How a speak request ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeakOutcome {
    Spoken,
    Failed(TtsFailure),
    Cancelled,
}

struct Shared {
    state: PlaybackState,
    generation: u64,
    cancel: CancellationToken,
    lifecycle_paused: bool,
    display_width: Option<u32>,
    /// Bubbles found at a continuous-mode cursor position.
    viewport: Option<(u32, Vec<SpeechBubble>)>,
    /// Bubbles found in continuous mode since the last finish.
    bubbles_found: usize,
    gender_overrides: HashMap<(usize, usize), Gender>,
}

struct Inner {
    shared: Mutex<Shared>,
    content: PlaybackContent,
    speech: Arc<dyn SpeechEngine>,
    voices: VoiceSelector,
    config: PlaybackConfig,
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

enum Step {
    Speak {
        bubble: SpeechBubble,
        gender: Gender,
    },
    TurnPage,
    /// Continuous mode: the viewport is done, move the cursor on.
    Advance,
    Analyse {
        cursor: u32,
        window: u32,
    },
}

#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl PlaybackController {
    pub fn new(
        content: PlaybackContent,
        speech: Arc<dyn SpeechEngine>,
        config: PlaybackConfig,
        tts: &TtsConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let voices = VoiceSelector::new(&speech.voices(), tts);
        let shared = Shared {
            state: PlaybackState::new(content.mode()),
            generation: 0,
            cancel: CancellationToken::new(),
            lifecycle_paused: false,
            display_width: None,
            viewport: None,
            bubbles_found: 0,
            gender_overrides: HashMap::new(),
        };
        let controller = Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(shared),
                content,
                speech,
                voices,
                config,
                events,
            }),
        };
        (controller, receiver)
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state.clone()
    }

    pub fn mode(&self) -> PlaybackMode {
        self.inner.content.mode()
    }

    /// Width the pages are displayed at; bubble boxes and scroll offsets in
    /// events are scaled from analysed pixels to this width.
    pub fn set_display_width(&self, width: Option<u32>) {
        self.lock().display_width = width.filter(|w| *w > 0);
    }

    /// Speak one paged-mode bubble as `gender`, or clear the override.
    pub fn set_gender_override(&self, page: usize, bubble: usize, gender: Option<Gender>) {
        let mut shared = self.lock();
        match gender {
            Some(gender) => {
                shared.gender_overrides.insert((page, bubble), gender);
            }
            None => {
                shared.gender_overrides.remove(&(page, bubble));
            }
        }
    }

    pub fn toggle(&self) {
        let playing = self.lock().state.status == PlaybackStatus::Playing;
        if playing {
            self.halt(false);
        } else {
            self.play();
        }
    }

    /// Start or resume narration. Must be called inside a Tokio runtime.
    pub fn play(&self) {
        let (generation, cancel) = {
            let mut shared = self.lock();
            match shared.state.status {
                PlaybackStatus::Playing => return,
                PlaybackStatus::Finished => {
                    shared.state.reset_position();
                    shared.viewport = None;
                }
                PlaybackStatus::Stopped | PlaybackStatus::Paused => {}
            }
            shared.generation += 1;
            shared.cancel = CancellationToken::new();
            shared.lifecycle_paused = false;
            shared.state.set_status(PlaybackStatus::Playing);
            self.emit(PlaybackEvent::StateChanged(PlaybackStatus::Playing));
            info!(
                page = shared.state.current_page_index,
                bubble = shared.state.current_bubble_index,
                mode = %shared.state.mode,
                "Playback started"
            );
            if let PlaybackContent::Strip(strip) = &self.inner.content {
                info!(
                    source = %strip.source,
                    height = strip.bitmap.height(),
                    y = shared.state.scroll_offset_y,
                    "Narrating strip"
                );
            }
            (shared.generation, shared.cancel.clone())
        };
        tokio::spawn(self.clone().run(generation, cancel));
    }

    /// Explicit stop: pause that a lifecycle `resume` will not undo.
    pub fn stop(&self) -> bool {
        self.halt(false)
    }

    /// Lifecycle pause (app backgrounded, interrupt signal).
    pub fn pause(&self) -> bool {
        self.halt(true)
    }

    /// Lifecycle resume; restarts only what a lifecycle pause stopped.
    pub fn resume(&self) -> bool {
        let should_play = {
            let shared = self.lock();
            shared.state.status == PlaybackStatus::Paused
                && shared.lifecycle_paused
                && self.inner.config.resume_behavior == ResumeBehavior::ResumeIfAutoPaused
        };
        if should_play {
            self.play();
        }
        should_play
    }

    pub fn seek_next(&self) -> bool {
        self.reposition(|this, shared| match &this.inner.content {
            PlaybackContent::Pages(pages) => {
                let page = shared.state.current_page_index;
                let bubble = shared.state.current_bubble_index;
                let count = pages.get(page).map_or(0, |p| p.bubbles.len());
                if bubble + 1 < count {
                    shared.state.current_bubble_index = bubble + 1;
                    return true;
                }
                match (page + 1..pages.len()).find(|&p| !pages[p].bubbles.is_empty()) {
                    Some(next) => {
                        shared.state.current_page_index = next;
                        shared.state.current_bubble_index = 0;
                        true
                    }
                    None => false,
                }
            }
            PlaybackContent::Strip(strip) => {
                let bubble = shared.state.current_bubble_index;
                let cursor = shared.state.scroll_offset_y as u32;
                if let Some((at, bubbles)) = &shared.viewport {
                    if *at == cursor && bubble + 1 < bubbles.len() {
                        shared.state.current_bubble_index = bubble + 1;
                        return true;
                    }
                }
                let next = cursor.saturating_add(this.window_height(shared, strip.bitmap.width()));
                if next >= strip.bitmap.height() {
                    return false;
                }
                shared.state.scroll_offset_y = next as f32;
                shared.state.current_bubble_index = 0;
                shared.viewport = None;
                true
            }
        })
    }

    pub fn seek_prev(&self) -> bool {
        self.reposition(|this, shared| match &this.inner.content {
            PlaybackContent::Pages(pages) => {
                let page = shared.state.current_page_index;
                let bubble = shared.state.current_bubble_index;
                let count = pages.get(page).map_or(0, |p| p.bubbles.len());
                if bubble > 0 && count > 0 {
                    shared.state.current_bubble_index = bubble.min(count) - 1;
                    return true;
                }
                match (0..page).rev().find(|&p| !pages[p].bubbles.is_empty()) {
                    Some(prev) => {
                        shared.state.current_page_index = prev;
                        shared.state.current_bubble_index = pages[prev].bubbles.len() - 1;
                        true
                    }
                    None => false,
                }
            }
            PlaybackContent::Strip(strip) => {
                let bubble = shared.state.current_bubble_index;
                if bubble > 0 {
                    shared.state.current_bubble_index = bubble - 1;
                    return true;
                }
                let cursor = shared.state.scroll_offset_y as u32;
                if cursor == 0 {
                    return false;
                }
                let window = this.window_height(shared, strip.bitmap.width());
                shared.state.scroll_offset_y = cursor.saturating_sub(window) as f32;
                shared.state.current_bubble_index = 0;
                shared.viewport = None;
                true
            }
        })
    }

    pub fn jump_to_page(&self, page: usize) -> bool {
        self.reposition(|this, shared| {
            if page >= this.inner.content.page_count() {
                return false;
            }
            shared.state.current_page_index = page;
            shared.state.current_bubble_index = 0;
            shared.state.scroll_offset_y = 0.0;
            shared.viewport = None;
            true
        })
    }

    pub fn bookmark(&self) -> Bookmark {
        let shared = self.lock();
        Bookmark {
            page: shared.state.current_page_index,
            bubble: shared.state.current_bubble_index,
            scroll_y: shared.state.scroll_offset_y,
        }
    }

    /// Move to a saved position; out-of-range bookmarks are ignored.
    pub fn restore(&self, bookmark: &Bookmark) -> bool {
        let bookmark = *bookmark;
        self.reposition(move |this, shared| match &this.inner.content {
            PlaybackContent::Pages(pages) => {
                let Some(page) = pages.get(bookmark.page) else {
                    return false;
                };
                shared.state.current_page_index = bookmark.page;
                shared.state.current_bubble_index = bookmark.bubble.min(page.bubbles.len());
                true
            }
            PlaybackContent::Strip(strip) => {
                if bookmark.scroll_y < 0.0 || bookmark.scroll_y >= strip.bitmap.height() as f32 {
                    return false;
                }
                shared.state.scroll_offset_y = bookmark.scroll_y.floor();
                shared.state.current_bubble_index = bookmark.bubble;
                shared.viewport = None;
                true
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: PlaybackEvent) {
        // A closed receiver means nobody is watching; playback carries on.
        let _ = self.inner.events.send(event);
    }

    fn halt(&self, lifecycle: bool) -> bool {
        {
            let mut shared = self.lock();
            if shared.state.status != PlaybackStatus::Playing {
                return false;
            }
            shared.generation += 1;
            shared.cancel.cancel();
            shared.lifecycle_paused = lifecycle;
            shared.state.set_status(PlaybackStatus::Paused);
            self.emit(PlaybackEvent::StateChanged(PlaybackStatus::Paused));
            info!(
                lifecycle,
                page = shared.state.current_page_index,
                bubble = shared.state.current_bubble_index,
                "Playback paused"
            );
            // Stop before unlocking; any later play() speaks after it.
            self.inner.speech.stop();
        }
        true
    }

    /// Apply a position change; a playing session restarts from the new spot.
    fn reposition(&self, apply: impl FnOnce(&Self, &mut Shared) -> bool) -> bool {
        let restart = {
            let mut shared = self.lock();
            if !apply(self, &mut *shared) {
                return false;
            }
            if shared.state.status == PlaybackStatus::Finished {
                shared.state.set_status(PlaybackStatus::Stopped);
                self.emit(PlaybackEvent::StateChanged(PlaybackStatus::Stopped));
            }
            let page = shared.state.current_page_index;
            let y = self.position_scroll(&mut shared);
            self.emit(PlaybackEvent::ScrollTo { page, y });
            debug!(
                page,
                bubble = shared.state.current_bubble_index,
                "Playback position moved"
            );
            if shared.state.status == PlaybackStatus::Playing {
                shared.generation += 1;
                shared.cancel.cancel();
                shared.cancel = CancellationToken::new();
                Some((shared.generation, shared.cancel.clone()))
            } else {
                None
            }
        };
        if let Some((generation, cancel)) = restart {
            self.inner.speech.stop();
            tokio::spawn(self.clone().run(generation, cancel));
        }
        true
    }

    /// Scroll offset for the current position, stored in the state; returns
    /// it in display pixels.
    fn position_scroll(&self, shared: &mut Shared) -> f32 {
        match &self.inner.content {
            PlaybackContent::Pages(pages) => {
                let Some(page) = pages.get(shared.state.current_page_index) else {
                    return 0.0;
                };
                let scale = scale_for(shared.display_width, page.width);
                let offset = page
                    .bubbles
                    .get(shared.state.current_bubble_index)
                    .map(|bubble| self.scroll_target(bubble.bounds, page.height, scale))
                    .unwrap_or(0.0);
                shared.state.scroll_offset_y = offset;
                offset * scale
            }
            PlaybackContent::Strip(strip) => {
                shared.state.scroll_offset_y * scale_for(shared.display_width, strip.bitmap.width())
            }
        }
    }

    /// Analysed-pixel scroll offset that brings `bounds` into view.
    fn scroll_target(&self, bounds: Rect, content_height: u32, scale: f32) -> f32 {
        let viewport = self.inner.config.viewport_height as f32 / scale;
        let anchor = if self.inner.config.center_spoken_bubble {
            bounds.center_y() - viewport / 2.0
        } else {
            bounds.top as f32
        };
        let max = (content_height as f32 - viewport).max(0.0);
        anchor.clamp(0.0, max)
    }

    /// Viewport height in analysed pixels.
    fn window_height(&self, shared: &Shared, content_width: u32) -> u32 {
        let scale = scale_for(shared.display_width, content_width);
        ((self.inner.config.viewport_height as f32 / scale).round() as u32).max(1)
    }

    fn finish(&self, shared: &mut Shared) {
        shared.state.reset_position();
        shared.viewport = None;
        shared.bubbles_found = 0;
        shared.state.set_status(PlaybackStatus::Finished);
        self.emit(PlaybackEvent::StateChanged(PlaybackStatus::Finished));
        info!("Playback finished");
    }

    async fn run(self, generation: u64, cancel: CancellationToken) {
        debug!(generation, "Narration loop started");
        loop {
            let Some(step) = self.next_step(generation) else {
                break;
            };
            let proceed = match step {
                Step::Speak { bubble, gender } => {
                    if !self.settle(&cancel).await {
                        break;
                    }
                    let outcome = self.speak(&bubble, gender, &cancel).await;
                    self.complete_bubble(generation, outcome)
                }
                Step::TurnPage => {
                    let pause = self.inner.config.inter_page_pause_ms;
                    sleep_or_cancel(pause, &cancel).await
                }
                Step::Advance => true,
                Step::Analyse { cursor, window } => {
                    if !self.settle(&cancel).await {
                        break;
                    }
                    self.analyse_viewport(generation, cursor, window, &cancel)
                        .await
                }
            };
            if !proceed {
                break;
            }
        }
        debug!(generation, "Narration loop exited");
    }

    /// Decide the next step under the lock, emitting its UI events.
    fn next_step(&self, generation: u64) -> Option<Step> {
        let mut shared = self.lock();
        if shared.generation != generation {
            return None;
        }
        match &self.inner.content {
            PlaybackContent::Pages(pages) => self.next_paged_step(&mut shared, pages),
            PlaybackContent::Strip(strip) => self.next_strip_step(&mut shared, strip),
        }
    }

    fn next_paged_step(&self, shared: &mut Shared, pages: &[MangaPage]) -> Option<Step> {
        let page_index = shared.state.current_page_index;
        let Some(page) = pages.get(page_index) else {
            self.finish(shared);
            return None;
        };
        let bubble_index = shared.state.current_bubble_index;
        if let Some(bubble) = page.bubbles.get(bubble_index) {
            let gender = shared
                .gender_overrides
                .get(&(page_index, bubble_index))
                .copied()
                .unwrap_or(bubble.gender);
            let scale = scale_for(shared.display_width, page.width);
            let y = self.position_scroll(shared);
            self.announce(page_index, bubble_index, bubble, scale, Some(y));
            return Some(Step::Speak {
                bubble: bubble.clone(),
                gender,
            });
        }
        if page_index + 1 < pages.len() {
            shared.state.current_page_index = page_index + 1;
            shared.state.current_bubble_index = 0;
            shared.state.scroll_offset_y = 0.0;
            debug!(page = page_index + 1, "Turning page");
            self.emit(PlaybackEvent::ScrollTo {
                page: page_index + 1,
                y: 0.0,
            });
            return Some(Step::TurnPage);
        }
        self.finish(shared);
        None
    }

    fn next_strip_step(&self, shared: &mut Shared, strip: &Strip) -> Option<Step> {
        let height = strip.bitmap.height();
        let cursor = shared.state.scroll_offset_y.max(0.0) as u32;
        if cursor >= height {
            if shared.bubbles_found == 0 {
                let message = NoContentError::NoBubbles { pages: 1 }.to_string();
                warn!(source = %strip.source, "{message}");
                self.emit(PlaybackEvent::Warning(message));
            }
            self.finish(shared);
            return None;
        }
        let window = self.window_height(shared, strip.bitmap.width());
        let bubbles = match &shared.viewport {
            Some((at, bubbles)) if *at == cursor => bubbles,
            _ => {
                let scale = scale_for(shared.display_width, strip.bitmap.width());
                self.emit(PlaybackEvent::ScrollTo {
                    page: 0,
                    y: cursor as f32 * scale,
                });
                return Some(Step::Analyse { cursor, window });
            }
        };
        let bubble_index = shared.state.current_bubble_index;
        if let Some(bubble) = bubbles.get(bubble_index) {
            let scale = scale_for(shared.display_width, strip.bitmap.width());
            let bubble = bubble.clone();
            self.announce(0, bubble_index, &bubble, scale, None);
            let gender = bubble.gender;
            return Some(Step::Speak { bubble, gender });
        }
        // Viewport done; the next one starts where this one's core ended.
        shared.state.scroll_offset_y = cursor.saturating_add(window) as f32;
        shared.state.current_bubble_index = 0;
        shared.viewport = None;
        Some(Step::Advance)
    }

    fn announce(
        &self,
        page: usize,
        bubble_index: usize,
        bubble: &SpeechBubble,
        scale: f32,
        scroll: Option<f32>,
    ) {
        self.emit(PlaybackEvent::Status {
            text: bubble.preview(self.inner.config.preview_chars),
            icon: bubble.emotion.icon(),
        });
        if let Some(y) = scroll {
            self.emit(PlaybackEvent::ScrollTo { page, y });
        }
        self.emit(PlaybackEvent::Highlight {
            page,
            bubble: bubble_index,
            bounds: bubble.bounds.scaled(scale, scale),
        });
        debug!(page, bubble = bubble_index, text = %bubble.text, "Narrating bubble");
    }

    async fn settle(&self, cancel: &CancellationToken) -> bool {
        sleep_or_cancel(self.inner.config.settle_delay_ms, cancel).await
    }

    async fn speak(
        &self,
        bubble: &SpeechBubble,
        gender: Gender,
        cancel: &CancellationToken,
    ) -> SpeakOutcome {
        let utterance = self.inner.voices.utterance(bubble, gender);
        let done = self.inner.speech.speak(utterance);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => SpeakOutcome::Cancelled,
            outcome = done => match outcome {
                Ok(UtteranceOutcome::Done) => SpeakOutcome::Spoken,
                Ok(UtteranceOutcome::Failed(failure)) => SpeakOutcome::Failed(failure),
                Err(_) => SpeakOutcome::Failed(TtsFailure(
                    "speech engine dropped the utterance".to_string(),
                )),
            },
        }
    }

    /// Advance past the bubble just spoken, unless this loop was superseded.
    fn complete_bubble(&self, generation: u64, outcome: SpeakOutcome) -> bool {
        let mut shared = self.lock();
        if shared.generation != generation {
            return false;
        }
        match outcome {
            SpeakOutcome::Spoken => {}
            SpeakOutcome::Failed(failure) => {
                warn!(
                    page = shared.state.current_page_index,
                    bubble = shared.state.current_bubble_index,
                    "Skipping bubble: {failure}"
                );
                self.emit(PlaybackEvent::Warning(failure.to_string()));
            }
            SpeakOutcome::Cancelled => return false,
        }
        shared.state.current_bubble_index += 1;
        true
    }

    async fn analyse_viewport(
        &self,
        generation: u64,
        cursor: u32,
        window: u32,
        cancel: &CancellationToken,
    ) -> bool {
        let PlaybackContent::Strip(strip) = &self.inner.content else {
            return false;
        };
        let height = strip.bitmap.height();
        let overlap = strip.analyzer.segmenter().config().chunk_overlap;
        let span = ChunkSpan {
            y_offset: cursor,
            height: window.saturating_add(overlap).min(height - cursor),
            core_height: window.min(height - cursor),
        };
        let bubbles = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            bubbles = strip.analyzer.analyze_span(&strip.bitmap, span) => bubbles,
        };
        let mut shared = self.lock();
        if shared.generation != generation {
            return false;
        }
        debug!(cursor, bubbles = bubbles.len(), "Analysed viewport");
        shared.bubbles_found += bubbles.len();
        shared.viewport = Some((cursor, bubbles));
        true
    }
}

fn scale_for(display_width: Option<u32>, content_width: u32) -> f32 {
    match display_width {
        Some(width) if content_width > 0 => width as f32 / content_width as f32,
        _ => 1.0,
    }
}

async fn sleep_or_cancel(millis: u64, cancel: &CancellationToken) -> bool {
    if millis == 0 {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(Duration::from_millis(millis)) => true,
    }
}
