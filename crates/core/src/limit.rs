//! Per-provider admission control.
//!
//! Two independent gates guard every provider call:
//!
//! - a sliding-window request counter (`max_requests` per `window_secs`)
//! - a counting semaphore bounding in-flight calls (`max_concurrent`)
//!
//! The limiter only delays, it never fails: callers still handle errors
//! raised by the wrapped call itself. Providers without a configured limit
//! pass through untouched (explicit opt-out).

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Instant, sleep};

/// Rate limit configuration for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests admitted per window.
    pub max_requests: usize,
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// Maximum concurrent in-flight calls.
    pub max_concurrent: usize,
}

struct ProviderGate {
    config: RateLimitConfig,
    /// Admission timestamps within the current window, oldest first.
    window: Mutex<VecDeque<Instant>>,
    semaphore: Semaphore,
}

/// Multi-provider rate limiter.
///
/// One instance is constructed from config at startup and shared (via `Arc`)
/// by every component that talks to an upstream provider.
pub struct RateLimiter {
    gates: HashMap<String, ProviderGate>,
}

impl RateLimiter {
    /// Build a limiter from a provider-name keyed config table.
    pub fn new(configs: HashMap<String, RateLimitConfig>) -> Self {
        let gates = configs
            .into_iter()
            .map(|(name, config)| {
                let gate = ProviderGate {
                    window: Mutex::new(VecDeque::new()),
                    semaphore: Semaphore::new(config.max_concurrent),
                    config,
                };
                (name, gate)
            })
            .collect();
        Self { gates }
    }

    /// Whether a provider has a configured limit.
    pub fn limits(&self, provider: &str) -> bool {
        self.gates.contains_key(provider)
    }

    /// Pass the sliding-window gate for `provider`, suspending as needed.
    ///
    /// Reserves a slot if the window has room; otherwise sleeps until the
    /// oldest admission leaves the window and re-checks. The sleep happens
    /// outside the window lock so concurrent callers are not serialized
    /// behind a waiter.
    pub async fn acquire(&self, provider: &str) {
        let Some(gate) = self.gates.get(provider) else {
            return;
        };

        let window_len = Duration::from_secs(gate.config.window_secs);
        loop {
            let wait = {
                let mut window = gate.window.lock().await;
                let now = Instant::now();

                while window.front().is_some_and(|t| now.duration_since(*t) >= window_len) {
                    window.pop_front();
                }

                if window.len() < gate.config.max_requests {
                    window.push_back(now);
                    return;
                }

                match window.front() {
                    Some(oldest) => window_len - now.duration_since(*oldest),
                    None => {
                        window.push_back(now);
                        return;
                    }
                }
            };

            // sleep OUTSIDE the lock
            if wait > Duration::ZERO {
                tracing::debug!(provider, wait_ms = wait.as_millis() as u64, "rate limit window full, waiting");
                sleep(wait).await;
            }
        }
    }

    /// Run `fut` under both the concurrency gate and the sliding window.
    ///
    /// The semaphore permit is held for the full duration of the wrapped
    /// call; the window slot is consumed at admission time.
    pub async fn run<F, T>(&self, provider: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let Some(gate) = self.gates.get(provider) else {
            return fut.await;
        };

        // The semaphore is never closed, so acquire cannot fail.
        let _permit = gate
            .semaphore
            .acquire()
            .await
            .expect("rate limiter semaphore closed");
        self.acquire(provider).await;
        fut.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limiter(max_requests: usize, window_secs: u64, max_concurrent: usize) -> RateLimiter {
        RateLimiter::new(HashMap::from([(
            "test".to_string(),
            RateLimitConfig { max_requests, window_secs, max_concurrent },
        )]))
    }

    #[tokio::test]
    async fn test_unknown_provider_passes_through() {
        let limiter = limiter(1, 60, 1);
        let out = limiter.run("unconfigured", async { 42 }).await;
        assert_eq!(out, 42);
        assert!(!limiter.limits("unconfigured"));
        assert!(limiter.limits("test"));
    }

    #[tokio::test]
    async fn test_within_budget_no_delay() {
        let limiter = limiter(10, 60, 10);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire("test").await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_bound() {
        // max_requests + 5 calls must take at least one full window.
        let limiter = limiter(4, 10, 100);
        let start = Instant::now();
        for _ in 0..9 {
            limiter.acquire("test").await;
        }
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = limiter(2, 5, 10);
        limiter.acquire("test").await;
        limiter.acquire("test").await;

        sleep(Duration::from_secs(6)).await;

        // Old admissions have left the window; no further wait needed.
        let start = Instant::now();
        limiter.acquire("test").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_concurrency_gate() {
        let limiter = Arc::new(limiter(1000, 60, 2));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run("test", async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
