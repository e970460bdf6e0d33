//! Progress bar for bundling runs.

use std::sync::Arc;
use std::time::Duration;

use bundler_core::{ProgressCallback, ProgressSnapshot};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar fed by pipeline snapshots.
pub(crate) struct ProgressUi {
    bar: ProgressBar,
}

impl ProgressUi {
    /// Creates a bar for `total` attachments drawing to stderr.
    pub(crate) fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        Self::with_bar(bar)
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Callback to hand to the pipeline.
    pub(crate) fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Arc::new(move |snapshot: ProgressSnapshot| {
            bar.set_position(snapshot.finished() as u64);
            bar.set_message(format_message(&snapshot));
        })
    }

    /// Removes the bar from the terminal.
    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn format_message(snapshot: &ProgressSnapshot) -> String {
    let mut message = if snapshot.failed > 0 {
        format!("{} failed", snapshot.failed)
    } else {
        String::new()
    };
    if !snapshot.in_flight.is_empty() {
        if !message.is_empty() {
            message.push_str(" | ");
        }
        message.push_str("fetching ");
        message.push_str(&snapshot.in_flight.join(", "));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(completed: usize, failed: usize, in_flight: &[&str]) -> ProgressSnapshot {
        ProgressSnapshot {
            completed,
            failed,
            total: 10,
            in_flight: in_flight.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_message_lists_in_flight_names() {
        let message = format_message(&snapshot(2, 0, &["a.pdf", "b.jpg"]));
        assert_eq!(message, "fetching a.pdf, b.jpg");
    }

    #[test]
    fn test_message_mentions_failures() {
        let message = format_message(&snapshot(2, 1, &["c.png"]));
        assert_eq!(message, "1 failed | fetching c.png");
        assert_eq!(format_message(&snapshot(9, 1, &[])), "1 failed");
    }

    #[test]
    fn test_callback_moves_position_to_finished_count() {
        let ui = ProgressUi::with_bar(ProgressBar::hidden());
        let callback = ui.callback();
        callback(snapshot(3, 2, &["d.txt"]));
        assert_eq!(ui.bar.position(), 5);
        ui.finish();
    }
}
