use crate::credentials::Credentials;

/// What to do after the portal rejected the credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Try again with the same credentials.
    Retry,
    /// Try again with these credentials.
    Replace(Credentials),
    /// Stop without logging in.
    Exit,
}

/// Supplies corrected credentials when the portal rejects the current ones.
///
/// The session controller only calls this on a classified credential error.
/// Implementations must not touch the controller's session state; they just
/// answer.
pub trait CredentialRecovery: Send + Sync {
    /// `attempt` rejected logins in a row so far, out of `max` allowed.
    fn on_credential_error(&self, attempt: u32, max: u32) -> RecoveryDecision;

    /// Called once credentials this adapter supplied (or the initial,
    /// not-yet-stored ones) were accepted by the portal.
    fn credentials_validated(&self, _credentials: &Credentials) {}

    /// `false` when nobody is around to answer; the credential budget is
    /// then treated as spent on the first rejection.
    fn is_interactive(&self) -> bool {
        true
    }
}

/// Recovery for unattended runs.
pub struct NonInteractive;

impl CredentialRecovery for NonInteractive {
    fn on_credential_error(&self, _attempt: u32, _max: u32) -> RecoveryDecision {
        RecoveryDecision::Exit
    }

    fn is_interactive(&self) -> bool {
        false
    }
}
