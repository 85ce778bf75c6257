//! Session lifecycle: login with retry budgets, view-state upkeep, quota
//! polling, credential change and shutdown.

use crate::budget::{BudgetStatus, RetryBudgets};
use crate::config::SessionConfig;
use crate::credentials::Credentials;
use crate::error::PortalError;
use crate::marker::SessionMarker;
use crate::outcome::{LoginOutcome, LogoutOutcome, Quota, QuotaOutcome, ViewState, ViewStateOutcome};
use crate::portal::Portal;
use crate::recovery::{CredentialRecovery, RecoveryDecision};
use crate::utils::{tail, CancellationToken};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Authenticating,
    /// Authenticated. `view_state` is `None` until fetched, and again after a
    /// poll that did not refresh it.
    LoggedIn { view_state: Option<ViewState> },
    AwaitingCredentialFix,
    Terminating,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Logged out on request.
    Clean,
    /// Exited on request with the portal session left active.
    LeftOpen,
    Cancelled,
    TransientBudgetExhausted,
    CredentialBudgetExhausted,
    /// The operator declined to supply new credentials.
    Abandoned,
}

impl Termination {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Termination::TransientBudgetExhausted
                | Termination::CredentialBudgetExhausted
                | Termination::Abandoned
        )
    }
}

/// What `shutdown` does with the portal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitMode {
    Logout,
    LeaveOpen,
}

/// Result of a single login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    LoggedIn,
    /// Transient failure with budget left; try again after the delay.
    RetryAfter(Duration),
    /// Credentials rejected with budget left.
    CredentialRejected { attempt: u32, max: u32 },
    Exhausted(Termination),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub quota: Option<Quota>,
}

/// Result of one keep-alive poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    Polled(PollReport),
    /// Transient failure with budget left.
    Failed { attempt: u32, max: u32 },
    /// The portal no longer recognises the session; log in again.
    SessionLost,
    Exhausted(Termination),
    Cancelled,
}

pub struct SessionController<P: Portal> {
    portal: P,
    config: SessionConfig,
    credentials: Credentials,
    /// Credentials not yet accepted by the portal.
    pending_validation: bool,
    session: Option<P::Session>,
    state: SessionState,
    budgets: RetryBudgets,
    marker: SessionMarker,
    cancel: CancellationToken,
}

impl<P: Portal> SessionController<P> {
    pub fn new(
        portal: P,
        config: SessionConfig,
        credentials: Credentials,
        marker: SessionMarker,
        cancel: CancellationToken,
    ) -> Self {
        let budgets = RetryBudgets::new(
            config.max_transient_attempts,
            config.max_credential_attempts,
        );
        Self {
            portal,
            config,
            credentials,
            pending_validation: false,
            session: None,
            state: SessionState::LoggedOut,
            budgets,
            marker,
            cancel,
        }
    }

    /// The initial credentials have not been stored yet; report them to the
    /// recovery adapter once the portal accepts them.
    pub fn with_unvalidated_credentials(mut self) -> Self {
        self.pending_validation = true;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.state, SessionState::LoggedIn { .. })
    }

    pub fn budgets(&self) -> &RetryBudgets {
        &self.budgets
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn marker(&self) -> &SessionMarker {
        &self.marker
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn portal(&self) -> &P {
        &self.portal
    }

    /// Session id of the live session, if logged in.
    pub fn session_id(&self) -> Option<String> {
        if !self.is_logged_in() {
            return None;
        }
        self.session
            .as_ref()
            .and_then(|session| self.portal.session_id(session))
    }

    /// One login attempt on the current HTTP session, opening a fresh one
    /// first if there is none.
    pub fn login_once(&mut self) -> LoginStep {
        if self.cancel.is_cancelled() {
            return LoginStep::Cancelled;
        }
        self.state = SessionState::Authenticating;

        if self.session.is_none() {
            match self.portal.open_session() {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    log::error!("Could not set up an HTTP session: {}", e);
                    return self.login_transient_failure();
                }
            }
        }
        let Some(session) = self.session.as_ref() else {
            return self.login_transient_failure();
        };

        log::info!("Logging in as {}...", self.credentials.username());
        match self.portal.login(session, &self.credentials) {
            LoginOutcome::Success { session_id } => {
                self.budgets.record_login();
                match session_id {
                    Some(id) => {
                        log::info!("Logged in. Session id: ...{}", tail(&id, 6));
                        self.marker.store_logged(&id);
                    }
                    None => log::warn!("Logged in, but the portal issued no session id."),
                }
                self.state = SessionState::LoggedIn { view_state: None };
                match self.fetch_view_state() {
                    Ok(view_state) => {
                        self.state = SessionState::LoggedIn {
                            view_state: Some(view_state),
                        };
                    }
                    Err(e) => log::warn!(
                        "Logged in, but the view state could not be read ({}). Quota checks will retry it.",
                        e
                    ),
                }
                LoginStep::LoggedIn
            }
            LoginOutcome::CredentialError => {
                self.session = None;
                match self.budgets.record_credential() {
                    BudgetStatus::Remaining { attempt, max } => {
                        log::warn!("Credentials rejected ({}/{}).", attempt, max);
                        self.state = SessionState::LoggedOut;
                        LoginStep::CredentialRejected { attempt, max }
                    }
                    BudgetStatus::Exhausted => {
                        log::error!(
                            "Credentials rejected {} times in a row. Check your username and password.",
                            self.budgets.max_credential()
                        );
                        self.state = SessionState::AwaitingCredentialFix;
                        LoginStep::Exhausted(Termination::CredentialBudgetExhausted)
                    }
                }
            }
            LoginOutcome::TransientError(e) => {
                log::warn!("Login attempt failed: {}", e);
                self.login_transient_failure()
            }
        }
    }

    fn login_transient_failure(&mut self) -> LoginStep {
        self.session = None;
        match self.budgets.record_transient() {
            BudgetStatus::Remaining { attempt, max } => {
                log::warn!(
                    "Login failed ({}/{}). Retrying in {}s.",
                    attempt,
                    max,
                    self.config.retry_delay.as_secs()
                );
                self.state = SessionState::LoggedOut;
                LoginStep::RetryAfter(self.config.retry_delay)
            }
            BudgetStatus::Exhausted => {
                log::error!(
                    "Login failed {} times in a row. Check your connection to the portal.",
                    self.budgets.max_transient()
                );
                self.state = SessionState::Terminating;
                LoginStep::Exhausted(Termination::TransientBudgetExhausted)
            }
        }
    }

    /// Logs in, retrying transient failures after the configured delay and
    /// asking `recovery` what to do about rejected credentials.
    ///
    /// On `Err` the controller is in [`SessionState::Terminating`].
    pub fn establish(&mut self, recovery: &dyn CredentialRecovery) -> Result<(), Termination> {
        loop {
            match self.login_once() {
                LoginStep::LoggedIn => {
                    if self.pending_validation {
                        recovery.credentials_validated(&self.credentials);
                        self.pending_validation = false;
                    }
                    return Ok(());
                }
                LoginStep::RetryAfter(delay) => {
                    if self.cancel.wait(delay) {
                        return Err(self.terminate(Termination::Cancelled));
                    }
                }
                LoginStep::CredentialRejected { attempt, max } => {
                    self.state = SessionState::AwaitingCredentialFix;
                    if !recovery.is_interactive() {
                        log::error!("Credentials rejected and nobody can correct them.");
                        self.budgets.exhaust_credentials();
                        return Err(self.terminate(Termination::CredentialBudgetExhausted));
                    }
                    match recovery.on_credential_error(attempt, max) {
                        RecoveryDecision::Retry => {
                            log::info!("Retrying with the same credentials.");
                            self.state = SessionState::LoggedOut;
                        }
                        RecoveryDecision::Replace(credentials) => {
                            log::info!("Retrying as {}.", credentials.username());
                            self.credentials = credentials;
                            self.pending_validation = true;
                            self.state = SessionState::LoggedOut;
                        }
                        RecoveryDecision::Exit => {
                            return Err(self.terminate(Termination::Abandoned));
                        }
                    }
                    if self.cancel.is_cancelled() {
                        return Err(self.terminate(Termination::Cancelled));
                    }
                }
                LoginStep::Exhausted(termination) => return Err(self.terminate(termination)),
                LoginStep::Cancelled => return Err(self.terminate(Termination::Cancelled)),
            }
        }
    }

    /// Logs in unless already logged in. When the previous session was lost
    /// without a successful poll since the last login, waits the retry
    /// delay first.
    pub fn ensure_logged_in(&mut self, recovery: &dyn CredentialRecovery) -> Result<(), Termination> {
        if self.is_logged_in() {
            return Ok(());
        }
        if self.budgets.lost_sessions() > 1 {
            log::info!(
                "The new session was dropped too. Logging in again in {}s.",
                self.config.retry_delay.as_secs()
            );
            if self.cancel.wait(self.config.retry_delay) {
                return Err(self.terminate(Termination::Cancelled));
            }
        }
        self.establish(recovery)
    }

    pub(crate) fn terminate(&mut self, termination: Termination) -> Termination {
        self.state = SessionState::Terminating;
        termination
    }

    fn fetch_view_state(&self) -> Result<ViewState, PortalError> {
        let session = self.session.as_ref().ok_or(PortalError::NotAuthenticated)?;
        match self.portal.fetch_view_state(session) {
            ViewStateOutcome::Success(view_state) => Ok(view_state),
            ViewStateOutcome::TransientError(e) => Err(e),
        }
    }

    /// Drops the HTTP session so the next login starts from scratch.
    fn session_lost(&mut self) -> PollStep {
        self.session = None;
        self.state = SessionState::LoggedOut;
        match self.budgets.record_session_lost() {
            BudgetStatus::Remaining { attempt, max } => {
                log::warn!("Session expired ({}/{}), logging in again.", attempt, max);
                PollStep::SessionLost
            }
            BudgetStatus::Exhausted => {
                log::error!(
                    "The portal dropped {} sessions in a row right after login, giving up.",
                    self.budgets.max_transient()
                );
                PollStep::Exhausted(self.terminate(Termination::TransientBudgetExhausted))
            }
        }
    }

    fn poll_transient_failure(&mut self) -> PollStep {
        match self.budgets.record_transient() {
            BudgetStatus::Remaining { attempt, max } => {
                log::warn!("Quota check failed ({}/{}).", attempt, max);
                PollStep::Failed { attempt, max }
            }
            BudgetStatus::Exhausted => {
                log::error!(
                    "Quota check failed {} times in a row, giving up.",
                    self.budgets.max_transient()
                );
                PollStep::Exhausted(self.terminate(Termination::TransientBudgetExhausted))
            }
        }
    }

    /// One quota poll, fetching the view state first if it is missing.
    pub fn poll_once(&mut self) -> PollStep {
        if self.cancel.is_cancelled() {
            return PollStep::Cancelled;
        }
        let current = match &self.state {
            SessionState::LoggedIn { view_state } => view_state.clone(),
            _ => return PollStep::SessionLost,
        };

        let view_state = match current {
            Some(view_state) => view_state,
            None => match self.fetch_view_state() {
                Ok(view_state) => {
                    self.state = SessionState::LoggedIn {
                        view_state: Some(view_state.clone()),
                    };
                    view_state
                }
                Err(e) if e.is_not_authenticated() => return self.session_lost(),
                Err(_) => return self.poll_transient_failure(),
            },
        };

        if self.cancel.is_cancelled() {
            return PollStep::Cancelled;
        }
        let Some(session) = self.session.as_ref() else {
            return self.session_lost();
        };

        match self.portal.poll_quota(session, &view_state) {
            QuotaOutcome::Success { quota, view_state } => {
                self.budgets.record_success();
                self.state = SessionState::LoggedIn { view_state };
                match &quota {
                    Some(quota) => log::debug!("Remaining quota: {}", quota),
                    None => log::warn!("Quota could not be read from the response."),
                }
                PollStep::Polled(PollReport { quota })
            }
            QuotaOutcome::SessionExpired => self.session_lost(),
            QuotaOutcome::TransientError(_) => self.poll_transient_failure(),
        }
    }

    /// Polls the quota once, logging in again first if the session was
    /// lost. Returns the quota when it could be read.
    pub fn check_quota(&mut self, recovery: &dyn CredentialRecovery) -> Result<Option<Quota>, Termination> {
        loop {
            self.ensure_logged_in(recovery)?;
            match self.poll_once() {
                PollStep::Polled(report) => return Ok(report.quota),
                PollStep::Failed { .. } => return Ok(None),
                PollStep::SessionLost => continue,
                PollStep::Exhausted(termination) => return Err(termination),
                PollStep::Cancelled => return Err(self.terminate(Termination::Cancelled)),
            }
        }
    }

    /// Switches to `credentials`: logs the current session out (best
    /// effort), starts a fresh HTTP session and clears both retry budgets.
    /// The caller logs in again with [`establish`](Self::establish).
    pub fn change_credentials(&mut self, credentials: Credentials) {
        if let Some(id) = self.session_id().or_else(|| self.marker.load_logged()) {
            log::info!("Logging out the current session before switching credentials...");
            log_logout(&self.portal.logout(&id));
        }
        self.marker.clear_logged();
        self.session = None;
        self.state = SessionState::LoggedOut;
        self.credentials = credentials;
        self.pending_validation = true;
        self.budgets.reset();
    }

    /// Ends the run. With [`ExitMode::Logout`] the session is logged out
    /// using the live session id, or the one in the marker file if the live
    /// session is gone; the marker is removed afterwards whatever the
    /// result. [`ExitMode::LeaveOpen`] touches neither the portal nor the
    /// marker.
    pub fn shutdown(&mut self, mode: ExitMode) -> Option<LogoutOutcome> {
        let outcome = match mode {
            ExitMode::LeaveOpen => {
                log::info!("Exiting with the portal session left open.");
                None
            }
            ExitMode::Logout => {
                let session_id = self.session_id().or_else(|| self.marker.load_logged());
                let outcome = match session_id {
                    Some(id) => {
                        log::info!("Logging out...");
                        let outcome = self.portal.logout(&id);
                        log_logout(&outcome);
                        Some(outcome)
                    }
                    None => {
                        log::info!("No session to log out.");
                        None
                    }
                };
                self.marker.clear_logged();
                outcome
            }
        };
        self.session = None;
        self.state = SessionState::Terminating;
        outcome
    }
}

fn log_logout(outcome: &LogoutOutcome) {
    match outcome {
        LogoutOutcome::Success { confirmed: true } => log::info!("Logged out."),
        LogoutOutcome::Success { confirmed: false } => {
            log::warn!("Logout sent, but the portal did not confirm it.")
        }
        LogoutOutcome::TransientError(e) => log::error!("Logout failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::NonInteractive;
    use crate::testing::{creds, quota_success, FakePortal, ScriptedRecovery};
    use tempfile::TempDir;

    fn controller(portal: FakePortal, dir: &TempDir) -> SessionController<FakePortal> {
        let config = SessionConfig {
            retry_delay: Duration::from_millis(1),
            ..SessionConfig::default()
        };
        SessionController::new(
            portal,
            config,
            creds("alice"),
            SessionMarker::in_dir(dir.path()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn successful_login_writes_marker_and_fetches_view_state() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        let mut ctl = controller(portal.clone(), &dir);

        assert_eq!(ctl.login_once(), LoginStep::LoggedIn);
        assert_eq!(
            ctl.marker().read().unwrap().as_deref(),
            Some(portal.issued_id(1).as_str())
        );
        assert!(matches!(
            ctl.state(),
            SessionState::LoggedIn { view_state: Some(_) }
        ));
    }

    #[test]
    fn view_state_failure_after_login_is_not_counted() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_view_state(ViewStateOutcome::TransientError(PortalError::Timeout));
        let mut ctl = controller(portal.clone(), &dir);

        assert_eq!(ctl.login_once(), LoginStep::LoggedIn);
        assert_eq!(ctl.state(), &SessionState::LoggedIn { view_state: None });
        assert_eq!(ctl.budgets().transient_attempts(), 0);
    }

    #[test]
    fn transient_failures_exhaust_after_exactly_three_attempts() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        for _ in 0..5 {
            portal.push_login(LoginOutcome::TransientError(PortalError::Timeout));
        }
        let mut ctl = controller(portal.clone(), &dir);

        assert_eq!(
            ctl.establish(&NonInteractive),
            Err(Termination::TransientBudgetExhausted)
        );
        assert_eq!(portal.login_calls(), 3);
        assert_eq!(ctl.state(), &SessionState::Terminating);
    }

    #[test]
    fn two_transient_failures_then_success() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_login(LoginOutcome::TransientError(PortalError::Timeout));
        portal.push_login(LoginOutcome::TransientError(PortalError::Status(502)));
        let mut ctl = controller(portal.clone(), &dir);

        assert_eq!(ctl.establish(&NonInteractive), Ok(()));
        assert_eq!(portal.login_calls(), 3);
        assert_eq!(ctl.budgets().transient_attempts(), 0);
    }

    #[test]
    fn each_retry_uses_a_fresh_http_session() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_login(LoginOutcome::TransientError(PortalError::Timeout));
        let mut ctl = controller(portal.clone(), &dir);

        ctl.establish(&NonInteractive).unwrap();
        assert_eq!(portal.sessions_opened(), 2);
    }

    #[test]
    fn credential_error_does_not_consume_transient_budget() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_login(LoginOutcome::TransientError(PortalError::Timeout));
        portal.push_login(LoginOutcome::TransientError(PortalError::Timeout));
        portal.push_login(LoginOutcome::CredentialError);
        portal.push_login(LoginOutcome::TransientError(PortalError::Timeout));
        portal.push_login(LoginOutcome::TransientError(PortalError::Timeout));
        let recovery = ScriptedRecovery::new(vec![RecoveryDecision::Retry]);
        let mut ctl = controller(portal.clone(), &dir);

        assert_eq!(ctl.establish(&recovery), Ok(()));
        assert_eq!(portal.login_calls(), 6);
    }

    #[test]
    fn credential_budget_exhausts_at_exactly_three() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        for _ in 0..4 {
            portal.push_login(LoginOutcome::CredentialError);
        }
        let recovery = ScriptedRecovery::new(vec![
            RecoveryDecision::Replace(creds("bob")),
            RecoveryDecision::Replace(creds("carol")),
            RecoveryDecision::Replace(creds("dave")),
        ]);
        let mut ctl = controller(portal.clone(), &dir);

        assert_eq!(
            ctl.establish(&recovery),
            Err(Termination::CredentialBudgetExhausted)
        );
        assert_eq!(portal.login_calls(), 3);
        assert_eq!(recovery.asked(), vec![(1, 3), (2, 3)]);
        assert_eq!(portal.logins_as(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn credentials_reported_only_after_portal_accepts_them() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_login(LoginOutcome::CredentialError);
        let recovery = ScriptedRecovery::new(vec![RecoveryDecision::Replace(creds("bob"))]);
        let mut ctl = controller(portal.clone(), &dir);

        ctl.establish(&recovery).unwrap();
        assert_eq!(recovery.validated(), vec!["bob".to_string()]);
        assert_eq!(ctl.credentials().username(), "bob");
    }

    #[test]
    fn stored_credentials_are_not_reported_again() {
        let dir = TempDir::new().unwrap();
        let recovery = ScriptedRecovery::new(vec![]);
        let mut ctl = controller(FakePortal::new(), &dir);

        ctl.establish(&recovery).unwrap();
        assert!(recovery.validated().is_empty());
    }

    #[test]
    fn non_interactive_credential_error_terminates_immediately() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_login(LoginOutcome::CredentialError);
        let mut ctl = controller(portal.clone(), &dir);

        assert_eq!(
            ctl.establish(&NonInteractive),
            Err(Termination::CredentialBudgetExhausted)
        );
        assert_eq!(portal.login_calls(), 1);
    }

    #[test]
    fn declining_recovery_abandons() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_login(LoginOutcome::CredentialError);
        let recovery = ScriptedRecovery::new(vec![RecoveryDecision::Exit]);
        let mut ctl = controller(portal, &dir);

        assert_eq!(ctl.establish(&recovery), Err(Termination::Abandoned));
    }

    #[test]
    fn cancellation_during_retry_delay_stops_login() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_login(LoginOutcome::TransientError(PortalError::Timeout));
        let mut ctl = controller(portal.clone(), &dir);
        ctl.config.retry_delay = Duration::from_secs(600);

        let token = ctl.cancel_token().clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        });
        let started = std::time::Instant::now();
        assert_eq!(ctl.establish(&NonInteractive), Err(Termination::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(portal.login_calls(), 1);
        canceller.join().unwrap();
    }

    #[test]
    fn expired_poll_forces_exactly_one_new_login() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_quota(QuotaOutcome::SessionExpired);
        let mut ctl = controller(portal.clone(), &dir);
        ctl.establish(&NonInteractive).unwrap();

        assert_eq!(ctl.poll_once(), PollStep::SessionLost);
        assert_eq!(ctl.state(), &SessionState::LoggedOut);
        assert_eq!(ctl.budgets().transient_attempts(), 0);

        let quota = ctl.check_quota(&NonInteractive).unwrap();
        assert_eq!(quota.unwrap().remaining_mb, "1024");
        assert_eq!(portal.login_calls(), 2);
        assert_eq!(portal.sessions_opened(), 2);
    }

    #[test]
    fn portal_dropping_every_session_ends_the_run() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        for _ in 0..200 {
            portal.push_quota(QuotaOutcome::SessionExpired);
        }
        let mut ctl = controller(portal.clone(), &dir);

        assert_eq!(
            ctl.check_quota(&NonInteractive),
            Err(Termination::TransientBudgetExhausted)
        );
        assert_eq!(portal.login_calls(), 3);
        assert_eq!(portal.poll_calls(), 3);
        assert_eq!(ctl.state(), &SessionState::Terminating);
    }

    #[test]
    fn successful_poll_clears_lost_sessions() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_quota(QuotaOutcome::SessionExpired);
        portal.push_quota(QuotaOutcome::SessionExpired);
        portal.push_quota(quota_success("512", "vs-2"));
        let mut ctl = controller(portal.clone(), &dir);

        let quota = ctl.check_quota(&NonInteractive).unwrap();
        assert_eq!(quota.unwrap().remaining_mb, "512");
        assert_eq!(portal.login_calls(), 3);
        assert_eq!(ctl.budgets().lost_sessions(), 0);
    }

    #[test]
    fn second_lost_session_waits_before_logging_in() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_quota(QuotaOutcome::SessionExpired);
        portal.push_quota(QuotaOutcome::SessionExpired);
        let config = SessionConfig {
            retry_delay: Duration::from_secs(600),
            ..SessionConfig::default()
        };
        let mut ctl = SessionController::new(
            portal.clone(),
            config,
            creds("alice"),
            SessionMarker::in_dir(dir.path()),
            CancellationToken::new(),
        );
        ctl.establish(&NonInteractive).unwrap();

        assert_eq!(ctl.poll_once(), PollStep::SessionLost);
        ctl.ensure_logged_in(&NonInteractive).unwrap();
        assert_eq!(portal.login_calls(), 2);

        assert_eq!(ctl.poll_once(), PollStep::SessionLost);
        ctl.cancel_token().cancel();
        let started = std::time::Instant::now();
        assert_eq!(
            ctl.ensure_logged_in(&NonInteractive),
            Err(Termination::Cancelled)
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(portal.login_calls(), 2);
    }

    #[test]
    fn poll_without_view_state_update_forces_refetch() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_quota(QuotaOutcome::Success {
            quota: None,
            view_state: None,
        });
        let mut ctl = controller(portal.clone(), &dir);
        ctl.establish(&NonInteractive).unwrap();
        assert_eq!(portal.view_state_calls(), 1);

        assert!(matches!(ctl.poll_once(), PollStep::Polled(_)));
        assert_eq!(ctl.state(), &SessionState::LoggedIn { view_state: None });
        assert!(matches!(ctl.poll_once(), PollStep::Polled(_)));
        assert_eq!(portal.view_state_calls(), 2);
    }

    #[test]
    fn poll_sends_the_refreshed_view_state() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_quota(quota_success("900", "vs-2"));
        let mut ctl = controller(portal.clone(), &dir);
        ctl.establish(&NonInteractive).unwrap();

        ctl.poll_once();
        ctl.poll_once();
        assert_eq!(portal.polled_view_states(), vec!["vs-1", "vs-2"]);
    }

    #[test]
    fn poll_failures_exhaust_transient_budget() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        for _ in 0..3 {
            portal.push_quota(QuotaOutcome::TransientError(PortalError::Timeout));
        }
        let mut ctl = controller(portal, &dir);
        ctl.establish(&NonInteractive).unwrap();

        assert_eq!(ctl.poll_once(), PollStep::Failed { attempt: 1, max: 3 });
        assert_eq!(ctl.poll_once(), PollStep::Failed { attempt: 2, max: 3 });
        assert_eq!(
            ctl.poll_once(),
            PollStep::Exhausted(Termination::TransientBudgetExhausted)
        );
        assert_eq!(ctl.state(), &SessionState::Terminating);
    }

    #[test]
    fn not_authenticated_view_state_fetch_means_session_lost() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_view_state(ViewStateOutcome::TransientError(PortalError::Timeout));
        portal.push_view_state(ViewStateOutcome::TransientError(
            PortalError::NotAuthenticated,
        ));
        let mut ctl = controller(portal, &dir);
        ctl.establish(&NonInteractive).unwrap();

        assert_eq!(ctl.poll_once(), PollStep::SessionLost);
        assert_eq!(ctl.budgets().transient_attempts(), 0);
    }

    #[test]
    fn logout_uses_the_id_written_at_login() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        let mut ctl = controller(portal.clone(), &dir);
        ctl.establish(&NonInteractive).unwrap();
        let stored = ctl.marker().read().unwrap().unwrap();

        ctl.shutdown(ExitMode::Logout);
        assert_eq!(portal.logged_out(), vec![stored]);
        assert!(!ctl.marker().exists());
        assert_eq!(ctl.state(), &SessionState::Terminating);
    }

    #[test]
    fn logout_falls_back_to_marker() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        let mut ctl = controller(portal.clone(), &dir);
        ctl.marker().write("LEFTOVER").unwrap();

        ctl.shutdown(ExitMode::Logout);
        assert_eq!(portal.logged_out(), vec!["LEFTOVER".to_string()]);
        assert!(!ctl.marker().exists());
    }

    #[test]
    fn marker_removed_even_when_logout_fails() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_logout(LogoutOutcome::TransientError(PortalError::Timeout));
        let mut ctl = controller(portal.clone(), &dir);
        ctl.establish(&NonInteractive).unwrap();

        let outcome = ctl.shutdown(ExitMode::Logout);
        assert!(matches!(outcome, Some(LogoutOutcome::TransientError(_))));
        assert!(!ctl.marker().exists());
    }

    #[test]
    fn leave_open_keeps_marker_and_skips_logout() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        let mut ctl = controller(portal.clone(), &dir);
        ctl.establish(&NonInteractive).unwrap();

        assert!(ctl.shutdown(ExitMode::LeaveOpen).is_none());
        assert!(portal.logged_out().is_empty());
        assert!(ctl.marker().exists());
    }

    #[test]
    fn shutdown_after_cancel_still_logs_out() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        let mut ctl = controller(portal.clone(), &dir);
        ctl.establish(&NonInteractive).unwrap();
        ctl.cancel_token().cancel();

        assert_eq!(ctl.poll_once(), PollStep::Cancelled);
        ctl.shutdown(ExitMode::Logout);
        assert_eq!(portal.logged_out().len(), 1);
    }

    #[test]
    fn changing_credentials_logs_out_and_resets_budgets() {
        let dir = TempDir::new().unwrap();
        let portal = FakePortal::new();
        portal.push_quota(QuotaOutcome::TransientError(PortalError::Timeout));
        let mut ctl = controller(portal.clone(), &dir);
        ctl.establish(&NonInteractive).unwrap();
        ctl.poll_once();
        assert_eq!(ctl.budgets().transient_attempts(), 1);

        ctl.change_credentials(creds("bob"));
        assert_eq!(portal.logged_out(), vec![portal.issued_id(1)]);
        assert_eq!(ctl.state(), &SessionState::LoggedOut);
        assert_eq!(ctl.budgets().transient_attempts(), 0);
        assert!(!ctl.marker().exists());

        let recovery = ScriptedRecovery::new(vec![]);
        ctl.establish(&recovery).unwrap();
        assert_eq!(portal.logins_as(), vec!["alice", "bob"]);
        assert_eq!(recovery.validated(), vec!["bob".to_string()]);
        assert_eq!(portal.sessions_opened(), 2);
    }

    #[test]
    fn terminations_report_failure() {
        assert!(!Termination::Clean.is_failure());
        assert!(!Termination::LeftOpen.is_failure());
        assert!(!Termination::Cancelled.is_failure());
        assert!(Termination::TransientBudgetExhausted.is_failure());
        assert!(Termination::CredentialBudgetExhausted.is_failure());
        assert!(Termination::Abandoned.is_failure());
    }
}
