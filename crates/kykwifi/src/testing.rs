//! Scripted portal and recovery doubles for controller tests.

use crate::credentials::Credentials;
use crate::error::PortalError;
use crate::outcome::{LoginOutcome, LogoutOutcome, Quota, QuotaOutcome, ViewState, ViewStateOutcome};
use crate::portal::Portal;
use crate::recovery::{CredentialRecovery, RecoveryDecision};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn creds(username: &str) -> Credentials {
    Credentials::new(username, "secret").unwrap()
}

pub fn quota_success(remaining_mb: &str, view_state: &str) -> QuotaOutcome {
    QuotaOutcome::Success {
        quota: Some(Quota {
            remaining_mb: remaining_mb.to_string(),
        }),
        view_state: ViewState::new(view_state),
    }
}

#[derive(Default)]
struct Script {
    logins: VecDeque<LoginOutcome>,
    view_states: VecDeque<ViewStateOutcome>,
    quotas: VecDeque<QuotaOutcome>,
    logouts: VecDeque<LogoutOutcome>,
    sessions_opened: usize,
    logins_as: Vec<String>,
    view_state_calls: usize,
    polled_view_states: Vec<String>,
    logged_out: Vec<String>,
}

pub struct FakeSession {
    id: String,
}

/// Plays back queued outcomes; once a queue is empty every call succeeds.
#[derive(Clone, Default)]
pub struct FakePortal(Arc<Mutex<Script>>);

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued_id(&self, session: usize) -> String {
        format!("SID-{}", session)
    }

    pub fn push_login(&self, outcome: LoginOutcome) {
        self.0.lock().unwrap().logins.push_back(outcome);
    }

    pub fn push_view_state(&self, outcome: ViewStateOutcome) {
        self.0.lock().unwrap().view_states.push_back(outcome);
    }

    pub fn push_quota(&self, outcome: QuotaOutcome) {
        self.0.lock().unwrap().quotas.push_back(outcome);
    }

    pub fn push_logout(&self, outcome: LogoutOutcome) {
        self.0.lock().unwrap().logouts.push_back(outcome);
    }

    pub fn sessions_opened(&self) -> usize {
        self.0.lock().unwrap().sessions_opened
    }

    pub fn login_calls(&self) -> usize {
        self.0.lock().unwrap().logins_as.len()
    }

    pub fn logins_as(&self) -> Vec<String> {
        self.0.lock().unwrap().logins_as.clone()
    }

    pub fn view_state_calls(&self) -> usize {
        self.0.lock().unwrap().view_state_calls
    }

    pub fn poll_calls(&self) -> usize {
        self.0.lock().unwrap().polled_view_states.len()
    }

    pub fn polled_view_states(&self) -> Vec<String> {
        self.0.lock().unwrap().polled_view_states.clone()
    }

    pub fn logged_out(&self) -> Vec<String> {
        self.0.lock().unwrap().logged_out.clone()
    }
}

impl Portal for FakePortal {
    type Session = FakeSession;

    fn open_session(&self) -> Result<FakeSession, PortalError> {
        let mut script = self.0.lock().unwrap();
        script.sessions_opened += 1;
        Ok(FakeSession {
            id: format!("SID-{}", script.sessions_opened),
        })
    }

    fn login(&self, session: &FakeSession, credentials: &Credentials) -> LoginOutcome {
        let mut script = self.0.lock().unwrap();
        script.logins_as.push(credentials.username().to_string());
        script.logins.pop_front().unwrap_or(LoginOutcome::Success {
            session_id: Some(session.id.clone()),
        })
    }

    fn fetch_view_state(&self, _session: &FakeSession) -> ViewStateOutcome {
        let mut script = self.0.lock().unwrap();
        script.view_state_calls += 1;
        script
            .view_states
            .pop_front()
            .unwrap_or_else(|| ViewStateOutcome::Success(ViewState::new("vs-1").unwrap()))
    }

    fn poll_quota(&self, _session: &FakeSession, view_state: &ViewState) -> QuotaOutcome {
        let mut script = self.0.lock().unwrap();
        script.polled_view_states.push(view_state.as_str().to_string());
        script
            .quotas
            .pop_front()
            .unwrap_or_else(|| quota_success("1024", view_state.as_str()))
    }

    fn session_id(&self, session: &FakeSession) -> Option<String> {
        Some(session.id.clone())
    }

    fn logout(&self, session_id: &str) -> LogoutOutcome {
        let mut script = self.0.lock().unwrap();
        script.logged_out.push(session_id.to_string());
        script
            .logouts
            .pop_front()
            .unwrap_or(LogoutOutcome::Success { confirmed: true })
    }
}

/// Answers credential errors from a fixed list, then exits.
pub struct ScriptedRecovery {
    decisions: Mutex<VecDeque<RecoveryDecision>>,
    asked: Mutex<Vec<(u32, u32)>>,
    validated: Mutex<Vec<String>>,
}

impl ScriptedRecovery {
    pub fn new(decisions: Vec<RecoveryDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            asked: Mutex::new(Vec::new()),
            validated: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<(u32, u32)> {
        self.asked.lock().unwrap().clone()
    }

    pub fn validated(&self) -> Vec<String> {
        self.validated.lock().unwrap().clone()
    }
}

impl CredentialRecovery for ScriptedRecovery {
    fn on_credential_error(&self, attempt: u32, max: u32) -> RecoveryDecision {
        self.asked.lock().unwrap().push((attempt, max));
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RecoveryDecision::Exit)
    }

    fn credentials_validated(&self, credentials: &Credentials) {
        self.validated
            .lock()
            .unwrap()
            .push(credentials.username().to_string());
    }
}
