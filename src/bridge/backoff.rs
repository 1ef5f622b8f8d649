//! Capped exponential backoff for bridge reconnects

use std::time::Duration;

use super::{BridgeError, BridgeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based); doubles each time up
    /// to `max_delay`. `None` once attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }

    /// Run `op`, retrying retryable failures with backoff.
    ///
    /// Non-retryable errors return immediately. Exhausting the attempts
    /// yields `BridgeError::Unreachable`.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> BridgeResult<T>
    where
        F: FnMut() -> BridgeResult<T>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("Bridge reconnected ({}) after {} retries", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    match self.delay_for(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                "Bridge {} failed ({}); retry {}/{} in {:?}",
                                what,
                                e,
                                attempt,
                                self.max_attempts,
                                delay
                            );
                            std::thread::sleep(delay);
                        }
                        None => {
                            tracing::error!("Bridge {} giving up after {} attempts", what, self.max_attempts);
                            return Err(BridgeError::Unreachable {
                                attempts: self.max_attempts,
                                last_error: e.to_string(),
                            });
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_and_cap() {
        let policy = ReconnectPolicy::default();
        let secs: Vec<u64> = (1..=5)
            .map(|a| policy.delay_for(a).unwrap().as_secs())
            .collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16]);
        assert_eq!(policy.delay_for(6), None);

        let tight = ReconnectPolicy {
            max_attempts: 10,
            ..Default::default()
        };
        assert_eq!(tight.delay_for(8), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_run_gives_up_after_max_attempts() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        let mut calls = 0;
        let result: BridgeResult<()> = policy.run("push", || {
            calls += 1;
            Err(BridgeError::Transport("connection refused".into()))
        });
        assert!(matches!(result, Err(BridgeError::Unreachable { attempts: 3, .. })));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_run_recovers() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::ZERO,
            ..Default::default()
        };
        let mut calls = 0;
        let result = policy.run("poll", || {
            calls += 1;
            if calls < 3 {
                Err(BridgeError::Http {
                    status: 503,
                    message: "starting".into(),
                })
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let mut calls = 0;
        let result: BridgeResult<()> = ReconnectPolicy::default().run("push", || {
            calls += 1;
            Err(BridgeError::Http {
                status: 400,
                message: "bad".into(),
            })
        });
        assert!(matches!(result, Err(BridgeError::Http { status: 400, .. })));
        assert_eq!(calls, 1);
    }
}
