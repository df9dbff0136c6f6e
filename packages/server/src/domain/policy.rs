//! Reconnect policy.
//!
//! Decides what happens after a connection closes: reconnect after a delay,
//! or give up and mark the session terminal. The policy is pure; timers and
//! state updates live in the session supervisor.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use super::{entity::TerminalReason, error::PolicyError};

/// Default number of reconnect attempts before a session is given up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Default upper bound of the exponential delay.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Default time a connection must stay open before the retry counter resets.
pub const DEFAULT_STABLE_WINDOW: Duration = Duration::from_secs(60);

/// Why a connection closed.
///
/// Mirrors the status codes reported by the WhatsApp protocol library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisconnectReason {
    /// 401: the account was logged out, credentials are no longer valid
    LoggedOut,
    /// 403
    Forbidden,
    /// 408
    TimedOut,
    /// 411
    MultideviceMismatch,
    /// 428
    ConnectionClosed,
    /// 440: another client took over the session
    ConnectionReplaced,
    /// 500
    BadSession,
    /// 515: the server asks for a fresh connection
    RestartRequired,
    /// Transport dropped without a status code
    ConnectionLost,
    Other(u16),
}

impl DisconnectReason {
    /// Map a protocol status code. `None` means the transport went away.
    pub fn from_status_code(code: Option<u16>) -> Self {
        match code {
            None => Self::ConnectionLost,
            Some(401) => Self::LoggedOut,
            Some(403) => Self::Forbidden,
            Some(408) => Self::TimedOut,
            Some(411) => Self::MultideviceMismatch,
            Some(428) => Self::ConnectionClosed,
            Some(440) => Self::ConnectionReplaced,
            Some(500) => Self::BadSession,
            Some(515) => Self::RestartRequired,
            Some(other) => Self::Other(other),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::LoggedOut => Some(401),
            Self::Forbidden => Some(403),
            Self::TimedOut => Some(408),
            Self::MultideviceMismatch => Some(411),
            Self::ConnectionClosed => Some(428),
            Self::ConnectionReplaced => Some(440),
            Self::BadSession => Some(500),
            Self::RestartRequired => Some(515),
            Self::ConnectionLost => None,
            Self::Other(code) => Some(*code),
        }
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code() {
            Some(code) => write!(f, "{self:?} ({code})"),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Delay strategy between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `min(base * 2^(attempt - 1), max)`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }

    fn validate(&self) -> Result<(), PolicyError> {
        match *self {
            Self::Fixed(delay) if delay.is_zero() => Err(PolicyError::ZeroDelay),
            Self::Exponential { base, .. } if base.is_zero() => Err(PolicyError::ZeroDelay),
            Self::Exponential { base, max } if max < base => Err(PolicyError::MaxDelayBelowBase),
            _ => Ok(()),
        }
    }
}

/// Outcome of a connection close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after `delay`; `attempt` is the new retry count.
    Retry { attempt: u32, delay: Duration },
    /// Stop for good.
    GiveUp(TerminalReason),
}

/// Bounded-retry reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_retries: u32,
    backoff: Backoff,
    stable_window: Duration,
}

impl ReconnectPolicy {
    /// Create a policy.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` when the backoff could yield a zero delay or when
    /// the exponential cap is below its base.
    pub fn new(
        max_retries: u32,
        backoff: Backoff,
        stable_window: Duration,
    ) -> Result<Self, PolicyError> {
        backoff.validate()?;
        Ok(Self {
            max_retries,
            backoff,
            stable_window,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// How long a connection must stay open to count as recovered.
    pub fn stable_window(&self) -> Duration {
        self.stable_window
    }

    /// Decide what to do after a close, given the retries already spent.
    pub fn on_close(&self, reason: DisconnectReason, retries_so_far: u32) -> ReconnectDecision {
        if reason.is_logged_out() {
            return ReconnectDecision::GiveUp(TerminalReason::LoggedOut);
        }
        let attempt = retries_so_far.saturating_add(1);
        if attempt > self.max_retries {
            return ReconnectDecision::GiveUp(TerminalReason::RetriesExhausted);
        }
        ReconnectDecision::Retry {
            attempt,
            delay: self.backoff.delay_for(attempt),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::Fixed(DEFAULT_RECONNECT_DELAY),
            stable_window: DEFAULT_STABLE_WINDOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_policy(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(
            max_retries,
            Backoff::Fixed(Duration::from_secs(3)),
            DEFAULT_STABLE_WINDOW,
        )
        .unwrap()
    }

    #[test]
    fn test_logged_out_is_terminal() {
        // テスト項目: ログアウトによる切断は再接続しない
        // given (前提条件):
        let policy = fixed_policy(5);

        // when (操作):
        let decision = policy.on_close(DisconnectReason::LoggedOut, 0);

        // then (期待する結果):
        assert_eq!(
            decision,
            ReconnectDecision::GiveUp(TerminalReason::LoggedOut)
        );
    }

    #[test]
    fn test_transient_close_retries_until_bound() {
        // テスト項目: 一時的な切断は上限回数まで再接続する
        // given (前提条件):
        let policy = fixed_policy(3);

        // when (操作) / then (期待する結果):
        for retries_so_far in 0..3 {
            assert_eq!(
                policy.on_close(DisconnectReason::ConnectionLost, retries_so_far),
                ReconnectDecision::Retry {
                    attempt: retries_so_far + 1,
                    delay: Duration::from_secs(3)
                }
            );
        }
        assert_eq!(
            policy.on_close(DisconnectReason::ConnectionLost, 3),
            ReconnectDecision::GiveUp(TerminalReason::RetriesExhausted)
        );
    }

    #[test]
    fn test_zero_max_retries_never_reconnects() {
        // テスト項目: 上限 0 の場合は最初の切断で終了する
        let policy = fixed_policy(0);

        assert_eq!(
            policy.on_close(DisconnectReason::RestartRequired, 0),
            ReconnectDecision::GiveUp(TerminalReason::RetriesExhausted)
        );
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        // テスト項目: 指数バックオフは上限値で頭打ちになる
        // given (前提条件):
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
        };

        // then (期待する結果):
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(8));
        assert_eq!(backoff.delay_for(5), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(200), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_delay_is_rejected() {
        // テスト項目: 遅延 0 のポリシーは作成できない
        let fixed = ReconnectPolicy::new(3, Backoff::Fixed(Duration::ZERO), DEFAULT_STABLE_WINDOW);
        let exponential = ReconnectPolicy::new(
            3,
            Backoff::Exponential {
                base: Duration::ZERO,
                max: Duration::from_secs(1),
            },
            DEFAULT_STABLE_WINDOW,
        );
        let inverted = ReconnectPolicy::new(
            3,
            Backoff::Exponential {
                base: Duration::from_secs(5),
                max: Duration::from_secs(1),
            },
            DEFAULT_STABLE_WINDOW,
        );

        assert_eq!(fixed.unwrap_err(), PolicyError::ZeroDelay);
        assert_eq!(exponential.unwrap_err(), PolicyError::ZeroDelay);
        assert_eq!(inverted.unwrap_err(), PolicyError::MaxDelayBelowBase);
    }

    #[test]
    fn test_disconnect_reason_status_codes() {
        // テスト項目: ステータスコードから切断理由を判定できる
        assert_eq!(
            DisconnectReason::from_status_code(Some(401)),
            DisconnectReason::LoggedOut
        );
        assert_eq!(
            DisconnectReason::from_status_code(Some(515)),
            DisconnectReason::RestartRequired
        );
        assert_eq!(
            DisconnectReason::from_status_code(Some(499)),
            DisconnectReason::Other(499)
        );
        assert_eq!(
            DisconnectReason::from_status_code(None),
            DisconnectReason::ConnectionLost
        );
        assert_eq!(DisconnectReason::TimedOut.status_code(), Some(408));
    }
}
