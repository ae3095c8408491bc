//! Terminal progress reporting

use hvprog_core::flash::WriteProgress;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

/// Progress reporter showing one indicatif bar per phase
pub struct IndicatifProgress {
    bar: Option<ProgressBar>,
    phase: &'static str,
    hidden: bool,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            bar: None,
            phase: "",
            hidden: false,
        }
    }

    #[cfg(test)]
    fn hidden() -> Self {
        Self {
            hidden: true,
            ..Self::new()
        }
    }

    fn start(&mut self, phase: &'static str, bar: ProgressBar) {
        self.finish();
        if self.hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_message(phase);
        self.phase = phase;
        self.bar = Some(bar);
    }

    fn start_bar(&mut self, phase: &'static str, total: usize) {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        self.start(phase, bar);
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message(format!("{} complete", self.phase));
        }
    }

    fn set_position(&self, position: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(position as u64);
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteProgress for IndicatifProgress {
    fn erasing(&mut self) {
        let spinner = ProgressBar::new_spinner();
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.start("Erase", spinner);
    }

    fn writing(&mut self, total_bytes: usize) {
        self.start_bar("Write", total_bytes);
    }

    fn write_progress(&mut self, bytes_written: usize) {
        self.set_position(bytes_written);
    }

    fn verifying(&mut self, total_bytes: usize) {
        self.start_bar("Verify", total_bytes);
    }

    fn verify_progress(&mut self, bytes_verified: usize) {
        self.set_position(bytes_verified);
    }

    fn complete(&mut self, errors: usize) {
        match self.bar.take() {
            Some(bar) if errors > 0 => {
                bar.abandon_with_message(format!("{} finished with {} errors", self.phase, errors));
            }
            bar => {
                self.bar = bar;
                self.finish();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_phase_replaces_the_previous_bar() {
        let mut progress = IndicatifProgress::hidden();
        progress.erasing();
        progress.writing(512);
        progress.write_progress(256);

        let bar = progress.bar.clone().unwrap();
        assert_eq!(bar.length(), Some(512));
        assert_eq!(bar.position(), 256);

        progress.verifying(512);
        assert!(bar.is_finished());
        assert_eq!(progress.phase, "Verify");
    }

    #[test]
    fn complete_closes_the_bar() {
        let mut progress = IndicatifProgress::hidden();
        progress.writing(64);
        let bar = progress.bar.clone().unwrap();

        progress.complete(2);
        assert!(progress.bar.is_none());
        assert!(bar.is_finished());
    }
}
