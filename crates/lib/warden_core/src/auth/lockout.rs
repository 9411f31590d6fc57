//! Failed-login lockout policy.
//!
//! Pure decisions over a user's `LockoutState`; persistence is the caller's job.

use chrono::{DateTime, Duration, Utc};

use crate::models::auth::LockoutState;

/// Failed attempts that trigger a lockout.
pub const MAX_FAILED_ATTEMPTS: i32 = 5;

/// Lockout window: 15 minutes.
pub const LOCKOUT_DURATION_MINUTES: i64 = 15;

#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    pub max_failed_attempts: i32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: MAX_FAILED_ATTEMPTS,
            lockout_duration: Duration::minutes(LOCKOUT_DURATION_MINUTES),
        }
    }
}

/// State to persist after a failed password check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureOutcome {
    pub next: LockoutState,
    /// This failure started a new lockout window.
    pub triggered_lock: bool,
}

impl LockoutPolicy {
    /// Whether the lockout window is still open at `now`.
    pub fn is_locked(&self, state: &LockoutState, now: DateTime<Utc>) -> bool {
        state.locked_until.is_some_and(|until| now < until)
    }

    /// Apply one failed attempt.
    ///
    /// The counter is not cleared when a window expires, so a failure after
    /// expiry locks again immediately.
    pub fn on_failure(&self, state: &LockoutState, now: DateTime<Utc>) -> FailureOutcome {
        let failed_attempts = state.failed_attempts.saturating_add(1);
        if failed_attempts >= self.max_failed_attempts {
            FailureOutcome {
                next: LockoutState {
                    failed_attempts,
                    locked_until: Some(
                        now.checked_add_signed(self.lockout_duration)
                            .unwrap_or(DateTime::<Utc>::MAX_UTC),
                    ),
                },
                triggered_lock: true,
            }
        } else {
            FailureOutcome {
                next: LockoutState {
                    failed_attempts,
                    locked_until: state.locked_until,
                },
                triggered_lock: false,
            }
        }
    }

    /// State after a successful login or a password reset.
    pub fn on_success(&self) -> LockoutState {
        LockoutState::default()
    }
}
