use console::{Key, Style, Term};
use dialoguer::{Confirm, Input, Select};
use kykwifi::{CancellationToken, CredentialRecovery, CredentialStore, Credentials, EnvFileStore, RecoveryDecision};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::progress::Spinner;

/// Format a duration into a human-readable string like "1h 23m 45s".
pub(crate) fn format_duration(duration: std::time::Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Reads a password echoing `*`. Returns `None` on Ctrl+C.
fn read_masked_password(prompt: &str) -> Option<String> {
    let term = Term::stderr();
    let _ = term.write_str(prompt);
    let _ = term.write_str(": ");
    let _ = term.flush();

    let mut password = String::new();

    loop {
        match term.read_key() {
            Ok(Key::Enter) => break,
            Ok(Key::Backspace) => {
                if password.pop().is_some() {
                    let _ = term.clear_chars(1);
                    let _ = term.flush();
                }
            }
            // Raw mode swallows SIGINT; console reports Ctrl+C as an error.
            Ok(Key::Char('\x03')) | Ok(Key::CtrlC) | Err(_) => {
                let _ = term.write_line("");
                return None;
            }
            Ok(Key::Char(c)) => {
                password.push(c);
                let _ = term.write_str("*");
                let _ = term.flush();
            }
            Ok(_) => {}
        }
    }
    let _ = term.write_line("");
    Some(password)
}

/// Asks for a username and password until both are non-empty. Returns
/// `None` if the operator interrupts the prompt.
pub(crate) fn prompt_credentials() -> Option<Credentials> {
    loop {
        let username: String = Input::new()
            .with_prompt("KYK username (T.C. kimlik no)")
            .interact_text()
            .ok()?;
        let password = read_masked_password("KYK password")?;
        match Credentials::new(username, password) {
            Ok(credentials) => return Some(credentials),
            Err(e) => log::warn!("{}. Try again.", e),
        }
    }
}

/// Yes/no question. `None` when interrupted.
pub(crate) fn confirm(prompt: &str, default: bool) -> Option<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact_opt()
        .ok()
        .flatten()
}

/// Prompts for corrected credentials on the terminal and stores validated
/// ones in the `.env` file if the operator asked for that. The spinner is
/// hidden while a prompt is up.
pub(crate) struct CliRecovery {
    spinner: Arc<Spinner>,
    store: EnvFileStore,
    cancel: CancellationToken,
    save_on_validate: AtomicBool,
}

impl CliRecovery {
    pub(crate) fn new(spinner: Arc<Spinner>, store: EnvFileStore, cancel: CancellationToken) -> Self {
        Self {
            spinner,
            store,
            cancel,
            save_on_validate: AtomicBool::new(false),
        }
    }

    /// Store the next credentials the portal accepts.
    pub(crate) fn save_when_validated(&self, save: bool) {
        self.save_on_validate.store(save, Ordering::SeqCst);
    }

    /// Prompts for credentials and whether to remember them.
    pub(crate) fn ask_for_credentials(&self) -> Option<Credentials> {
        let credentials = self.spinner.suspend(prompt_credentials)?;
        let prompt = format!("Save these credentials to {}?", self.store.path().display());
        let save = self.spinner.suspend(|| confirm(&prompt, true))?;
        self.save_when_validated(save);
        Some(credentials)
    }
}

impl CredentialRecovery for CliRecovery {
    fn on_credential_error(&self, attempt: u32, max: u32) -> RecoveryDecision {
        let choice = self.spinner.suspend(|| {
            let warn = Style::new().yellow().bold();
            eprintln!(
                "{} The portal rejected the username or password ({}/{}).",
                warn.apply_to(">>"),
                attempt,
                max
            );
            Select::new()
                .with_prompt("What now?")
                .items(&[
                    "Enter new credentials",
                    "Retry with the same credentials",
                    "Exit",
                ])
                .default(0)
                .interact_opt()
                .ok()
                .flatten()
        });

        match choice {
            Some(0) => match self.ask_for_credentials() {
                Some(credentials) => RecoveryDecision::Replace(credentials),
                None => {
                    self.cancel.cancel();
                    RecoveryDecision::Exit
                }
            },
            Some(1) => RecoveryDecision::Retry,
            Some(_) => RecoveryDecision::Exit,
            None => {
                self.cancel.cancel();
                RecoveryDecision::Exit
            }
        }
    }

    fn credentials_validated(&self, credentials: &Credentials) {
        if !self.save_on_validate.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.store.save(credentials) {
            log::error!("Could not save credentials: {:#}", e);
        }
    }
}
