/// Result of charging one failure to a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    /// `attempt` failures of this kind in a row, out of `max` allowed.
    Remaining { attempt: u32, max: u32 },
    Exhausted,
}

/// Two independent retry counters: one for transient failures (network,
/// timeouts, unexpected pages), one for rejected credentials.
///
/// A failure of one kind clears the other counter, so a flaky network never
/// eats into the credential budget and the reverse.
///
/// Lost sessions are tracked apart from both. Logging in again does not
/// clear that count, only a successful poll does, so a portal that drops
/// every fresh session cannot keep the client re-logging forever. It shares
/// the transient maximum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudgets {
    transient: u32,
    credential: u32,
    lost: u32,
    max_transient: u32,
    max_credential: u32,
}

impl RetryBudgets {
    pub fn new(max_transient: u32, max_credential: u32) -> Self {
        Self {
            transient: 0,
            credential: 0,
            lost: 0,
            max_transient: max_transient.max(1),
            max_credential: max_credential.max(1),
        }
    }

    pub fn transient_attempts(&self) -> u32 {
        self.transient
    }

    pub fn credential_attempts(&self) -> u32 {
        self.credential
    }

    /// Sessions lost in a row without a successful poll in between.
    pub fn lost_sessions(&self) -> u32 {
        self.lost
    }

    pub fn max_transient(&self) -> u32 {
        self.max_transient
    }

    pub fn max_credential(&self) -> u32 {
        self.max_credential
    }

    /// A poll went through: the session is healthy again.
    pub fn record_success(&mut self) {
        self.reset();
    }

    /// The portal accepted the credentials. Leaves the lost-session count
    /// alone until a poll proves the new session works.
    pub fn record_login(&mut self) {
        self.transient = 0;
        self.credential = 0;
    }

    pub fn reset(&mut self) {
        self.record_login();
        self.lost = 0;
    }

    pub fn record_session_lost(&mut self) -> BudgetStatus {
        self.lost += 1;
        Self::status(self.lost, self.max_transient)
    }

    pub fn record_transient(&mut self) -> BudgetStatus {
        self.credential = 0;
        self.transient += 1;
        Self::status(self.transient, self.max_transient)
    }

    pub fn record_credential(&mut self) -> BudgetStatus {
        self.transient = 0;
        self.credential += 1;
        Self::status(self.credential, self.max_credential)
    }

    /// Charges the whole credential budget at once, for contexts where no
    /// one can supply corrected credentials.
    pub fn exhaust_credentials(&mut self) {
        self.credential = self.max_credential;
    }

    fn status(attempt: u32, max: u32) -> BudgetStatus {
        if attempt >= max {
            BudgetStatus::Exhausted
        } else {
            BudgetStatus::Remaining { attempt, max }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_budget_exhausts_at_exactly_max() {
        let mut budgets = RetryBudgets::new(3, 3);
        assert_eq!(
            budgets.record_transient(),
            BudgetStatus::Remaining { attempt: 1, max: 3 }
        );
        assert_eq!(
            budgets.record_transient(),
            BudgetStatus::Remaining { attempt: 2, max: 3 }
        );
        assert_eq!(budgets.record_transient(), BudgetStatus::Exhausted);
    }

    #[test]
    fn transient_failure_clears_credential_counter() {
        let mut budgets = RetryBudgets::new(3, 3);
        budgets.record_credential();
        budgets.record_credential();
        budgets.record_transient();
        assert_eq!(budgets.credential_attempts(), 0);
        assert_eq!(
            budgets.record_credential(),
            BudgetStatus::Remaining { attempt: 1, max: 3 }
        );
    }

    #[test]
    fn credential_failure_clears_transient_counter() {
        let mut budgets = RetryBudgets::new(3, 3);
        budgets.record_transient();
        budgets.record_transient();
        budgets.record_credential();
        assert_eq!(budgets.transient_attempts(), 0);
    }

    #[test]
    fn success_resets_both() {
        let mut budgets = RetryBudgets::new(3, 3);
        budgets.record_transient();
        budgets.record_success();
        budgets.record_credential();
        budgets.record_success();
        assert_eq!(budgets.transient_attempts(), 0);
        assert_eq!(budgets.credential_attempts(), 0);
    }

    #[test]
    fn login_keeps_lost_session_count() {
        let mut budgets = RetryBudgets::new(3, 3);
        assert_eq!(
            budgets.record_session_lost(),
            BudgetStatus::Remaining { attempt: 1, max: 3 }
        );
        budgets.record_login();
        assert_eq!(
            budgets.record_session_lost(),
            BudgetStatus::Remaining { attempt: 2, max: 3 }
        );
        budgets.record_login();
        assert_eq!(budgets.record_session_lost(), BudgetStatus::Exhausted);
    }

    #[test]
    fn poll_success_clears_lost_session_count() {
        let mut budgets = RetryBudgets::new(3, 3);
        budgets.record_session_lost();
        budgets.record_session_lost();
        budgets.record_success();
        assert_eq!(budgets.lost_sessions(), 0);
        assert_eq!(
            budgets.record_session_lost(),
            BudgetStatus::Remaining { attempt: 1, max: 3 }
        );
    }

    #[test]
    fn zero_max_is_treated_as_one() {
        let mut budgets = RetryBudgets::new(0, 0);
        assert_eq!(budgets.record_transient(), BudgetStatus::Exhausted);
        assert_eq!(budgets.record_credential(), BudgetStatus::Exhausted);
    }
}
