//! Result types of the portal operations.
//!
//! Each operation has its own sum type carrying only the variants it can
//! produce, so callers have to handle session expiry separately from a
//! transient failure. [`OutcomeKind`] is the shared four-way tag.

use crate::error::PortalError;
use std::fmt;

/// Opaque JSF view-state token required by every quota poll.
#[derive(Clone, PartialEq, Eq)]
pub struct ViewState(String);

impl ViewState {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewState(...{})", crate::utils::tail(&self.0, 20))
    }
}

/// Remaining quota as reported by the portal, in megabytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    pub remaining_mb: String,
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MB", self.remaining_mb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    CredentialError,
    TransientError,
    SessionExpired,
}

#[derive(Debug)]
pub enum LoginOutcome {
    /// Portal redirected to the landing page. The session id is `None` when
    /// the `JSESSIONID` cookie was unexpectedly absent.
    Success { session_id: Option<String> },
    /// Portal rejected the username or password.
    CredentialError,
    TransientError(PortalError),
}

#[derive(Debug)]
pub enum ViewStateOutcome {
    Success(ViewState),
    TransientError(PortalError),
}

#[derive(Debug)]
pub enum QuotaOutcome {
    /// The poll went through. Either field may be missing: no quota means the
    /// markup could not be read, no view state means it must be re-fetched
    /// before the next poll.
    Success {
        quota: Option<Quota>,
        view_state: Option<ViewState>,
    },
    SessionExpired,
    TransientError(PortalError),
}

#[derive(Debug)]
pub enum LogoutOutcome {
    /// `confirmed` is false when the request succeeded but the confirmation
    /// phrase was missing from the response.
    Success { confirmed: bool },
    TransientError(PortalError),
}

impl LoginOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            LoginOutcome::Success { .. } => OutcomeKind::Success,
            LoginOutcome::CredentialError => OutcomeKind::CredentialError,
            LoginOutcome::TransientError(_) => OutcomeKind::TransientError,
        }
    }
}

impl ViewStateOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ViewStateOutcome::Success(_) => OutcomeKind::Success,
            ViewStateOutcome::TransientError(_) => OutcomeKind::TransientError,
        }
    }
}

impl QuotaOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            QuotaOutcome::Success { .. } => OutcomeKind::Success,
            QuotaOutcome::SessionExpired => OutcomeKind::SessionExpired,
            QuotaOutcome::TransientError(_) => OutcomeKind::TransientError,
        }
    }
}

impl LogoutOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            LogoutOutcome::Success { .. } => OutcomeKind::Success,
            LogoutOutcome::TransientError(_) => OutcomeKind::TransientError,
        }
    }
}
