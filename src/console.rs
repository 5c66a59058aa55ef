//! Terminal rendering of analysis results and playback events.
//!
//! Status lines go to stdout; scroll and highlight requests have no
//! terminal counterpart and are only traced.

use narrator_core::AnalysisReport;
use narrator_core::playback::{PlaybackEvent, PlaybackStatus};
use tracing::{debug, warn};

pub fn print_report(report: &AnalysisReport) {
    for (source, reason) in &report.failed {
        warn!(%source, "Skipped page: {reason}");
    }
    println!("{}", report.summary());
}

pub fn print_event(event: &PlaybackEvent) {
    match event {
        PlaybackEvent::ScrollTo { page, y } => {
            debug!(page, y, "Scroll");
        }
        PlaybackEvent::Highlight {
            page,
            bubble,
            bounds,
        } => {
            debug!(page, bubble, ?bounds, "Highlight");
        }
        other => {
            if let Some(line) = event_line(other) {
                println!("{line}");
            }
        }
    }
}

fn event_line(event: &PlaybackEvent) -> Option<String> {
    match event {
        PlaybackEvent::Status { text, icon } => Some(format!("{icon} {text}")),
        PlaybackEvent::Warning(message) => Some(format!("! {message}")),
        PlaybackEvent::StateChanged(PlaybackStatus::Finished) => {
            Some("-- finished --".to_string())
        }
        PlaybackEvent::StateChanged(status) => Some(format!("[{status}]")),
        PlaybackEvent::ScrollTo { .. } | PlaybackEvent::Highlight { .. } => None,
    }
}
