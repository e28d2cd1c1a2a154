use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct DomainState {
    next_allowed: Instant,
    consecutive_failures: u32,
    blocked_until: Option<Instant>,
}

/// Per-host pacing with exponential backoff after failures.
///
/// A 429 blocks the host for the current backoff window. Callers wait out
/// blocks no longer than their own budget and get an error otherwise.
#[derive(Debug)]
pub struct DomainRateLimiter {
    min_interval: Duration,
    base_backoff: Duration,
    max_backoff: Duration,
    domains: Mutex<HashMap<String, DomainState>>,
}

impl DomainRateLimiter {
    pub fn new(min_interval: Duration, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            min_interval,
            base_backoff,
            max_backoff,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Backoff after `failures` consecutive failures: base * 2^(n-1), capped.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exp = failures.saturating_sub(1).min(20);
        self.base_backoff
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Wait for this host's turn. Returns the remaining block time if the host is blocked.
    pub async fn acquire(&self, host: &str) -> Result<(), Duration> {
        self.acquire_within(host, Duration::ZERO).await
    }

    /// Like [`acquire`](Self::acquire), but sleeps through a block of at most `max_wait`.
    pub async fn acquire_within(&self, host: &str, max_wait: Duration) -> Result<(), Duration> {
        let wait = {
            let mut domains = self.domains.lock().await;
            let now = Instant::now();
            let state = domains.entry(host.to_string()).or_insert_with(|| DomainState {
                next_allowed: now,
                consecutive_failures: 0,
                blocked_until: None,
            });

            if let Some(until) = state.blocked_until {
                if until > now && until - now > max_wait {
                    return Err(until - now);
                }
                state.blocked_until = None;
                state.next_allowed = state.next_allowed.max(until);
            }

            let slot = state.next_allowed.max(now);
            state.next_allowed = slot + self.min_interval;
            slot - now
        };

        if !wait.is_zero() {
            tracing::trace!(host, wait_ms = wait.as_millis() as u64, "Pacing request");
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    pub async fn record_success(&self, host: &str) {
        let mut domains = self.domains.lock().await;
        if let Some(state) = domains.get_mut(host) {
            state.consecutive_failures = 0;
            state.blocked_until = None;
        }
    }

    pub async fn record_failure(&self, host: &str, rate_limited: bool) {
        let mut domains = self.domains.lock().await;
        let now = Instant::now();
        let state = domains.entry(host.to_string()).or_insert_with(|| DomainState {
            next_allowed: now,
            consecutive_failures: 0,
            blocked_until: None,
        });

        state.consecutive_failures += 1;
        let backoff = self.backoff_for(state.consecutive_failures);
        state.next_allowed = state.next_allowed.max(now + backoff);
        if rate_limited {
            state.blocked_until = Some(now + backoff);
            tracing::warn!(host, backoff_secs = backoff.as_secs(), "Host rate limited, blocking");
        }
    }

    pub async fn is_blocked(&self, host: &str) -> bool {
        let domains = self.domains.lock().await;
        domains
            .get(host)
            .and_then(|s| s.blocked_until)
            .is_some_and(|until| until > Instant::now())
    }

    pub async fn failures(&self, host: &str) -> u32 {
        let domains = self.domains.lock().await;
        domains.get(host).map(|s| s.consecutive_failures).unwrap_or(0)
    }
}
