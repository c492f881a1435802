//! Cancellation and time budgets for upstream calls
//!
//! Two layers of timing apply to a resolve call. [`CallOptions`] bounds a
//! single network request and links it to the caller's cancellation token;
//! [`Budget`] bounds the whole call and is checked before each remote phase.

use crate::error::{FlakepinError, FlakepinResult};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a guarded call stopped before completing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The caller's token fired
    Cancelled,
    /// The per-call timer fired
    TimedOut,
}

impl Interrupt {
    /// Convert into the matching error for `source_name`
    pub fn into_error(self, source_name: &'static str, timeout: Duration) -> FlakepinError {
        match self {
            Self::Cancelled => FlakepinError::Cancelled,
            Self::TimedOut => FlakepinError::Timeout {
                source_name,
                timeout_ms: timeout.as_millis() as u64,
            },
        }
    }
}

/// Per-call options shared by every upstream client.
///
/// `token` is the composite cancellation for one call: a child of the
/// caller's token that the per-call timer also cancels. Clients only wait
/// on `token`; the caller token is kept to tell the two causes apart.
#[derive(Debug, Clone)]
pub struct CallOptions {
    caller: CancellationToken,
    token: CancellationToken,
    per_call: Duration,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl CallOptions {
    /// Link to an optional caller token with a per-call timeout
    pub fn new(caller: Option<&CancellationToken>, timeout: Duration) -> Self {
        let caller = caller.cloned().unwrap_or_default();
        let token = caller.child_token();
        Self {
            caller,
            token,
            per_call: timeout,
            timeout,
            deadline: None,
        }
    }

    /// Cap this call and every retry derived from it at `deadline`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self.timeout = self.capped(self.per_call);
        self
    }

    /// Options for a single attempt: a fresh token and a fresh timer, still
    /// capped by the deadline
    pub fn attempt(&self) -> Self {
        let token = self.caller.child_token();
        Self {
            caller: self.caller.clone(),
            token,
            per_call: self.per_call,
            timeout: self.capped(self.per_call),
            deadline: self.deadline,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Composite token; fires on caller cancel or when `run` times out
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn capped(&self, wanted: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => wanted.min(deadline.saturating_duration_since(Instant::now())),
            None => wanted,
        }
    }

    fn interrupt(&self) -> Interrupt {
        if self.caller.is_cancelled() {
            Interrupt::Cancelled
        } else {
            Interrupt::TimedOut
        }
    }

    /// Run `fut` until it completes or the composite token fires.
    ///
    /// The timer cancels the token when it expires. The future is dropped
    /// on interruption, aborting any in-flight request.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        if self.token.is_cancelled() {
            return Err(self.interrupt());
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.interrupt()),
            _ = tokio::time::sleep(self.timeout) => {
                self.token.cancel();
                Err(Interrupt::TimedOut)
            }
            out = fut => Ok(out),
        }
    }

    /// Sleep between retries, never past the deadline, waking early if the
    /// token fires
    pub async fn pause(&self, delay: Duration) -> Result<(), Interrupt> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.interrupt()),
            _ = tokio::time::sleep(self.capped(delay)) => Ok(()),
        }
    }
}

/// Wall-clock budget spanning an entire resolve call
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Instant,
    total: Duration,
}

impl Budget {
    pub fn start(total: Duration) -> Self {
        Self {
            started: Instant::now(),
            total,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Instant the budget runs out
    pub fn deadline(&self) -> Instant {
        self.started + self.total
    }

    /// Fail with `BudgetExhausted` once the budget is spent
    pub fn check(&self) -> FlakepinResult<()> {
        let elapsed = self.elapsed();
        if elapsed >= self.total {
            return Err(FlakepinError::BudgetExhausted {
                elapsed_ms: elapsed.as_millis() as u64,
                budget_ms: self.total.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Options for the next remote call, failing if the budget is spent
    pub fn call_options(
        &self,
        caller: Option<&CancellationToken>,
        per_call: Duration,
    ) -> FlakepinResult<CallOptions> {
        self.check()?;
        Ok(CallOptions::new(caller, per_call).with_deadline(self.deadline()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_completes() {
        let opts = CallOptions::new(None, Duration::from_secs(1));
        let out = opts.run(async { 7 }).await;
        assert_eq!(out, Ok(7));
        assert!(!opts.token().is_cancelled());
    }

    #[tokio::test]
    async fn run_times_out() {
        let opts = CallOptions::new(None, Duration::from_millis(20));
        let out = opts
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(out, Err(Interrupt::TimedOut));
        assert!(opts.token().is_cancelled());
    }

    #[tokio::test]
    async fn caller_cancel_wins() {
        let caller = CancellationToken::new();
        let opts = CallOptions::new(Some(&caller), Duration::from_secs(5));

        let trigger = caller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let out = opts
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(out, Err(Interrupt::Cancelled));
        assert!(opts.token().is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_short_circuits() {
        let caller = CancellationToken::new();
        caller.cancel();
        let opts = CallOptions::new(Some(&caller), Duration::from_secs(5));
        assert_eq!(opts.run(async { 1 }).await, Err(Interrupt::Cancelled));
        assert_eq!(
            opts.pause(Duration::from_secs(5)).await,
            Err(Interrupt::Cancelled)
        );
    }

    #[tokio::test]
    async fn attempt_gets_fresh_timer() {
        let opts = CallOptions::new(None, Duration::from_millis(20));
        let first = opts.attempt();
        let _ = first.run(tokio::time::sleep(Duration::from_secs(1))).await;
        let second = opts.attempt();
        assert!(!second.token().is_cancelled());
    }

    #[tokio::test]
    async fn caller_cancel_fires_composite_token() {
        let caller = CancellationToken::new();
        let opts = CallOptions::new(Some(&caller), Duration::from_secs(5));
        caller.cancel();
        assert!(opts.token().is_cancelled());
        assert_eq!(
            opts.pause(Duration::from_secs(5)).await,
            Err(Interrupt::Cancelled)
        );
    }

    #[tokio::test]
    async fn retries_are_capped_by_deadline() {
        let opts = CallOptions::new(None, Duration::from_secs(5))
            .with_deadline(Instant::now() + Duration::from_millis(40));
        assert!(opts.timeout() <= Duration::from_millis(40));

        let started = Instant::now();
        assert_eq!(opts.pause(Duration::from_secs(5)).await, Ok(()));
        assert!(started.elapsed() < Duration::from_secs(1));

        let late = opts.attempt();
        assert_eq!(late.timeout(), Duration::ZERO);
        let out = late.run(tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(out, Err(Interrupt::TimedOut));
    }

    #[test]
    fn budget_exhaustion() {
        let budget = Budget::start(Duration::ZERO);
        let err = budget.check().unwrap_err();
        assert!(matches!(err, FlakepinError::BudgetExhausted { .. }));
        assert!(budget.call_options(None, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn budget_caps_call_timeout() {
        let budget = Budget::start(Duration::from_secs(60));
        assert!(budget.check().is_ok());
        let opts = budget.call_options(None, Duration::from_millis(500)).unwrap();
        assert_eq!(opts.timeout(), Duration::from_millis(500));

        let tight = Budget::start(Duration::from_millis(100));
        let opts = tight.call_options(None, Duration::from_secs(5)).unwrap();
        assert!(opts.timeout() <= Duration::from_millis(100));
    }

    #[test]
    fn interrupt_maps_to_errors() {
        let err = Interrupt::TimedOut.into_error("search", Duration::from_millis(1500));
        assert!(matches!(
            err,
            FlakepinError::Timeout {
                source_name: "search",
                timeout_ms: 1500
            }
        ));
        assert!(matches!(
            Interrupt::Cancelled.into_error("search", Duration::ZERO),
            FlakepinError::Cancelled
        ));
    }
}
