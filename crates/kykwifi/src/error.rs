use thiserror::Error;

/// Why a portal request did not produce a usable answer.
///
/// Every variant is retryable from the lifecycle's point of view; the
/// distinction exists for diagnosis and for [`PortalError::NotAuthenticated`],
/// which sends the controller back to login instead of burning a retry.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The portal sent us back to the login page.
    #[error("portal redirected to the login page, session is not authenticated")]
    NotAuthenticated,

    /// Expected markup was missing from a response.
    #[error("could not parse portal response: {0}")]
    Parse(String),

    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl PortalError {
    pub fn parse(what: impl Into<String>) -> Self {
        PortalError::Parse(what.into())
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, PortalError::Parse(_))
    }

    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, PortalError::NotAuthenticated)
    }

    /// Short operator-facing hint, in the tone of the log output.
    pub fn hint(&self) -> &'static str {
        match self {
            PortalError::Timeout | PortalError::Network(_) => {
                "Make sure you are connected to the KYK Wi-Fi network and the portal is reachable."
            }
            PortalError::Status(_) => "The portal answered with an error status.",
            PortalError::NotAuthenticated => "The portal session is gone; a new login is needed.",
            PortalError::Parse(_) => "The portal page layout may have changed.",
            PortalError::Client(_) => "The HTTP client could not be initialised.",
        }
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PortalError::Timeout
        } else if err.is_status() {
            PortalError::Status(err.status().map(|s| s.as_u16()).unwrap_or_default())
        } else if err.is_builder() {
            PortalError::Client(err)
        } else {
            PortalError::Network(err)
        }
    }
}
