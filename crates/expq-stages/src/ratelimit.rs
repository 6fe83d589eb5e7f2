//! Advisory rate limiter for model calls.
//!
//! Sliding window: at most `max_calls` acquisitions in any `window`. A caller
//! that finds the window full waits for the oldest slot to expire; it is never
//! refused. The lock is released before sleeping.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::agents::AgentError;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max_calls` per 60-second window
    pub fn per_minute(max_calls: usize) -> Self {
        Self::new(max_calls, DEFAULT_WINDOW)
    }

    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Take a slot now, or report how long until one frees up
    fn try_acquire(&self) -> Result<(), Duration> {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        while let Some(&oldest) = calls.front() {
            if now.duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
        if calls.len() < self.max_calls {
            calls.push_back(now);
            return Ok(());
        }
        let oldest = calls.front().copied().unwrap_or(now);
        Err((oldest + self.window).saturating_duration_since(now))
    }

    /// Wait until a slot is free, then take it
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "rate limit window full");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Calls currently counted against the window
    pub fn in_flight(&self) -> usize {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        calls
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count()
    }
}

/// Run a collaborator call behind the limiter and a timeout
pub async fn guarded<T, F>(
    limiter: Option<&RateLimiter>,
    timeout: Duration,
    agent: &'static str,
    call: F,
) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    if let Some(limiter) = limiter {
        limiter.acquire().await;
    }
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Timeout {
            agent,
            after_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_full_window_waits_instead_of_failing() {
        let limiter = RateLimiter::per_minute(2);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.in_flight(), 2);
        assert!(start.elapsed() < Duration::from_secs(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(11)).await;
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guarded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AgentError>(1)
        };
        let err = guarded(None, Duration::from_millis(100), "hint", slow)
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::Timeout { agent: "hint", after_ms: 100 });

        let fast = async { Ok::<_, AgentError>(7) };
        assert_eq!(guarded(None, Duration::from_millis(100), "hint", fast).await, Ok(7));
    }
}
