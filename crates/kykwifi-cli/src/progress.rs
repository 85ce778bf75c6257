use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Spinner shown while the client talks to the portal. A finished
/// `ProgressBar` cannot be restarted, so each `start` creates a new one.
#[derive(Default)]
pub(crate) struct Spinner(Mutex<Option<ProgressBar>>);

impl Spinner {
    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn start(&self, message: impl Into<Cow<'static, str>>) {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(100));
        if let Some(old) = self.slot().replace(bar) {
            old.finish_and_clear();
        }
    }

    pub(crate) fn stop(&self) {
        if let Some(bar) = self.slot().take() {
            bar.finish_and_clear();
        }
    }

    /// Runs `f` with the spinner hidden.
    pub(crate) fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        let slot = self.slot();
        match slot.as_ref() {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }
}
