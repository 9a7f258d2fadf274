//! Console progress for payload transfers

use indicatif::{ProgressBar, ProgressStyle};

use crate::transfer::Progress;

/// Byte-count progress bar shown while a file moves across the wire.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:30.green}] {bytes}/{total_bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(label.to_string());
        Self { bar }
    }
}

impl Progress for BarProgress {
    fn begin(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
    }

    fn advance(&self, done: u64) {
        self.bar.set_position(done);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    fn hidden() -> BarProgress {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
        BarProgress { bar }
    }

    #[test]
    fn test_hidden_bar_tracks_position() {
        let progress = hidden();
        progress.begin(2048);
        assert_eq!(progress.bar.length(), Some(2048));
        progress.advance(1024);
        assert_eq!(progress.bar.position(), 1024);
        progress.advance(2048);
        assert_eq!(progress.bar.position(), 2048);
    }
}
