//! Wire protocol of the KYK/GSB Wi-Fi portal.
//!
//! [`PortalClient`] speaks to the real deployment over reqwest. The session
//! controller only sees the [`Portal`] trait and the outcome types, so all
//! phrase matching and markup parsing stays in this module.

pub mod classify;
pub mod headers;
pub mod markup;

use crate::credentials::Credentials;
use crate::error::PortalError;
use crate::outcome::{LoginOutcome, LogoutOutcome, QuotaOutcome, ViewState, ViewStateOutcome};
use crate::utils::tail;
use classify::LoginRedirect;
use markup::PartialResponse;
use reqwest::blocking::{Client, Response};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Portal URLs. The defaults are the production deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub origin: String,
    pub login: String,
    pub check: String,
    /// Post-login landing page; also the target of quota polls.
    pub landing: String,
    pub logout: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::for_base("https://wifi.gsb.gov.tr")
    }
}

impl Endpoints {
    /// Same paths as production, rooted at `base` (used to aim tests at a
    /// local server).
    pub fn for_base(base: &str) -> Self {
        let origin = base.trim_end_matches('/').to_string();
        Self {
            login: format!("{}/login.html", origin),
            check: format!("{}/j_spring_security_check", origin),
            landing: format!("{}/", origin),
            logout: format!("{}/login.html?logout=1", origin),
            origin,
        }
    }
}

/// Protocol operations the session controller drives.
///
/// Implementations never propagate raw transport errors: every failure is
/// folded into the operation's outcome type.
pub trait Portal {
    /// Cookie-bearing connection context. Replaced wholesale, never reset.
    type Session;

    fn open_session(&self) -> Result<Self::Session, PortalError>;

    fn login(&self, session: &Self::Session, credentials: &Credentials) -> LoginOutcome;

    fn fetch_view_state(&self, session: &Self::Session) -> ViewStateOutcome;

    fn poll_quota(&self, session: &Self::Session, view_state: &ViewState) -> QuotaOutcome;

    /// Server-issued session id currently held by `session`, if any.
    fn session_id(&self, session: &Self::Session) -> Option<String>;

    /// Ends the server-side session identified by `session_id`, independent
    /// of any live session object.
    fn logout(&self, session_id: &str) -> LogoutOutcome;
}

/// A cookie jar plus two clients sharing it: one following redirects, one
/// not (the credential POST must see the raw redirect).
pub struct PortalSession {
    jar: Arc<Jar>,
    client: Client,
    no_redirect: Client,
}

impl PortalSession {
    fn open() -> Result<Self, PortalError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .default_headers(headers::base())
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(PortalError::Client)?;
        let no_redirect = Client::builder()
            .default_headers(headers::base())
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::none())
            .build()
            .map_err(PortalError::Client)?;
        Ok(Self {
            jar,
            client,
            no_redirect,
        })
    }

    fn cookie(&self, url: &str, name: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        let header = self.jar.cookies(&url)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
    }
}

/// reqwest-backed implementation of [`Portal`].
#[derive(Debug, Clone)]
pub struct PortalClient {
    endpoints: Endpoints,
    request_timeout: Duration,
    logout_timeout: Duration,
}

impl PortalClient {
    pub fn new(endpoints: Endpoints, request_timeout: Duration, logout_timeout: Duration) -> Self {
        Self {
            endpoints,
            request_timeout,
            logout_timeout,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn try_login(
        &self,
        session: &PortalSession,
        credentials: &Credentials,
    ) -> Result<LoginOutcome, PortalError> {
        let ep = &self.endpoints;

        log::info!("Fetching login page: {}", ep.login);
        session
            .client
            .get(&ep.login)
            .headers(headers::navigate(None, false))
            .timeout(self.request_timeout)
            .send()?
            .error_for_status()?;
        log::info!("Login page fetched, initial cookies received.");

        log::info!("Submitting credentials to {}", ep.check);
        let response = session
            .no_redirect
            .post(&ep.check)
            .headers(headers::form_post(&ep.origin, &ep.login))
            .form(&[
                ("j_username", credentials.username()),
                ("j_password", credentials.password()),
                ("submit", "Giris"),
            ])
            .timeout(self.request_timeout)
            .send()?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        log::info!("Login POST answered with status {}", status);

        match classify::classify_login_redirect(status, location.as_deref(), ep) {
            LoginRedirect::Landing => {
                log::info!("Login accepted, redirected to {}.", ep.landing);
                let session_id = self.session_id(session);
                if session_id.is_none() {
                    log::warn!("No {} cookie after a successful login.", SESSION_COOKIE);
                }
                Ok(LoginOutcome::Success { session_id })
            }
            LoginRedirect::BackToLogin(target) => {
                log::debug!("Redirected back to the login page: {}", target);
                let body = session
                    .client
                    .get(target.as_str())
                    .headers(headers::navigate(Some(&ep.login), true))
                    .timeout(self.request_timeout)
                    .send()?
                    .text()?;
                if classify::has_credential_error_phrase(&body) {
                    log::warn!("Login page reports a wrong username or password.");
                    Ok(LoginOutcome::CredentialError)
                } else {
                    log::debug!("Redirected page summary: {}", summary(&body));
                    Err(PortalError::parse(
                        "login rejected without a recognised error message",
                    ))
                }
            }
            LoginRedirect::Elsewhere(target) => {
                log::warn!(
                    "Login failed: expected redirect to {}, got '{}'.",
                    ep.landing,
                    target
                );
                Err(PortalError::Status(status))
            }
            LoginRedirect::NotRedirected => {
                let body = response.text()?;
                if classify::has_credential_error_phrase(&body) {
                    log::warn!("Login response reports a wrong username or password.");
                    Ok(LoginOutcome::CredentialError)
                } else {
                    log::warn!("Login response body summary: {}", summary(&body));
                    Err(PortalError::Status(status))
                }
            }
        }
    }

    fn try_fetch_view_state(&self, session: &PortalSession) -> Result<ViewState, PortalError> {
        let ep = &self.endpoints;
        log::info!("Fetching landing page {} for the view state...", ep.landing);
        let response = session
            .client
            .get(&ep.landing)
            .headers(headers::navigate(Some(&ep.login), true))
            .timeout(self.request_timeout)
            .send()?
            .error_for_status()?;

        if response.url().as_str().starts_with(&ep.login) {
            return Err(PortalError::NotAuthenticated);
        }

        let body = response.text()?;
        match markup::extract_view_state(&body) {
            Some(view_state) => {
                log::debug!("View state: ...{}", tail(view_state.as_str(), 20));
                Ok(view_state)
            }
            None => {
                log::debug!("Landing page summary: {}", summary(&body));
                Err(PortalError::parse(format!(
                    "{} input not found on the landing page",
                    markup::VIEW_STATE_FIELD
                )))
            }
        }
    }

    fn try_poll_quota(
        &self,
        session: &PortalSession,
        view_state: &ViewState,
    ) -> Result<QuotaOutcome, PortalError> {
        let ep = &self.endpoints;
        log::debug!("Polling quota...");
        let response = session
            .client
            .post(&ep.landing)
            .headers(headers::partial_ajax(&ep.origin, &ep.landing))
            .form(&[
                ("javax.faces.partial.ajax", "true"),
                ("javax.faces.source", "mainPanel:kota:j_idt122"),
                ("javax.faces.partial.execute", "@all"),
                ("javax.faces.partial.render", markup::QUOTA_UPDATE_ID),
                ("mainPanel:kota:j_idt122", "mainPanel:kota:j_idt122"),
                (markup::QUOTA_UPDATE_ID, markup::QUOTA_UPDATE_ID),
                (markup::VIEW_STATE_FIELD, view_state.as_str()),
            ])
            .timeout(self.request_timeout)
            .send()?;

        if classify::is_expired_content_type(content_type(&response)) {
            log::warn!("Quota poll answered with HTML instead of XML; the session has expired.");
            return Ok(QuotaOutcome::SessionExpired);
        }

        let body = response.error_for_status()?.text()?;
        let partial = PartialResponse::parse(&body)
            .ok_or_else(|| PortalError::parse("quota poll did not return a partial-response"))?;

        let new_view_state = partial.view_state();
        match &new_view_state {
            Some(vs) => log::debug!("Refreshed view state: ...{}", tail(vs.as_str(), 20)),
            None => log::warn!(
                "Quota poll carried no view state update; it will be re-fetched before the next poll."
            ),
        }

        let quota = match partial.quota_markup() {
            Some(markup) => markup::extract_quota(markup),
            None => {
                log::error!("Quota poll carried no '{}' update.", markup::QUOTA_UPDATE_ID);
                None
            }
        };

        Ok(QuotaOutcome::Success {
            quota,
            view_state: new_view_state,
        })
    }

    fn try_logout(&self, session_id: &str) -> Result<LogoutOutcome, PortalError> {
        let client = Client::builder()
            .default_headers(headers::base())
            .build()
            .map_err(PortalError::Client)?;
        let body = client
            .get(&self.endpoints.logout)
            .headers(headers::navigate(None, false))
            .header(COOKIE, format!("{}={}", SESSION_COOKIE, session_id))
            .timeout(self.logout_timeout)
            .send()?
            .error_for_status()?
            .text()?;

        let confirmed = classify::is_logout_confirmed(&body);
        if confirmed {
            log::info!("(Logout) Logged out, the portal confirmed it.");
        } else {
            log::warn!("(Logout) Request accepted but no confirmation in the response.");
            log::warn!("(Logout) The session was most likely ended, but this could not be verified.");
        }
        Ok(LogoutOutcome::Success { confirmed })
    }
}

impl Default for PortalClient {
    fn default() -> Self {
        let config = crate::config::SessionConfig::default();
        Self::new(
            Endpoints::default(),
            config.request_timeout,
            config.logout_timeout,
        )
    }
}

impl Portal for PortalClient {
    type Session = PortalSession;

    fn open_session(&self) -> Result<PortalSession, PortalError> {
        PortalSession::open()
    }

    fn login(&self, session: &PortalSession, credentials: &Credentials) -> LoginOutcome {
        self.try_login(session, credentials).unwrap_or_else(|e| {
            log_failure("Login", &e);
            LoginOutcome::TransientError(e)
        })
    }

    fn fetch_view_state(&self, session: &PortalSession) -> ViewStateOutcome {
        match self.try_fetch_view_state(session) {
            Ok(view_state) => ViewStateOutcome::Success(view_state),
            Err(e) => {
                log_failure("View state fetch", &e);
                ViewStateOutcome::TransientError(e)
            }
        }
    }

    fn poll_quota(&self, session: &PortalSession, view_state: &ViewState) -> QuotaOutcome {
        self.try_poll_quota(session, view_state).unwrap_or_else(|e| {
            log_failure("Quota poll", &e);
            QuotaOutcome::TransientError(e)
        })
    }

    fn session_id(&self, session: &PortalSession) -> Option<String> {
        session.cookie(&self.endpoints.landing, SESSION_COOKIE)
    }

    fn logout(&self, session_id: &str) -> LogoutOutcome {
        if session_id.trim().is_empty() {
            log::error!("(Logout) Session id must not be empty.");
            return LogoutOutcome::TransientError(PortalError::parse("empty session id"));
        }
        log::info!(
            "(Logout) Closing session ...{}",
            tail(session_id, 6)
        );
        self.try_logout(session_id.trim()).unwrap_or_else(|e| {
            log_failure("(Logout) Logout", &e);
            LogoutOutcome::TransientError(e)
        })
    }
}

fn content_type(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Parse failures are logged apart from network trouble so a changed page
/// layout stands out in the log.
fn log_failure(operation: &str, err: &PortalError) {
    if err.is_parse_error() {
        log::error!("{} failed, unexpected page content: {}", operation, err);
    } else {
        log::error!("{} failed: {}. {}", operation, err, err.hint());
    }
}

fn summary(body: &str) -> &str {
    match body.char_indices().nth(500) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
