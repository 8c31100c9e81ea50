use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::Rng;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::LlmError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Concurrency cap and post-completion delay for one LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPreset {
    pub max_concurrent: usize,
    pub delay_ms: u64,
}

impl RateLimitPreset {
    pub const OPENAI: Self = Self {
        max_concurrent: 3,
        delay_ms: 1000,
    };
    pub const CLAUDE: Self = Self {
        max_concurrent: 2,
        delay_ms: 1500,
    };
    pub const GEMINI: Self = Self {
        max_concurrent: 5,
        delay_ms: 500,
    };
    pub const DEFAULT: Self = Self {
        max_concurrent: 3,
        delay_ms: 1000,
    };
}

impl Default for RateLimitPreset {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub queue_length: usize,
    pub active: usize,
    pub max_concurrent: usize,
}

/// FIFO scheduler that keeps at most `max_concurrent` units running.
///
/// After each completion, units already queued are started only once `delay`
/// has passed. A caller arriving while a slot is free starts at once, even if
/// that slot was released less than `delay` ago.
///
/// Cloning yields another handle to the same limiter.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

struct LimiterInner {
    state: Mutex<LimiterState>,
    max_concurrent: usize,
    delay: Duration,
}

struct LimiterState {
    waiters: VecDeque<oneshot::Sender<()>>,
    active: usize,
}

impl LimiterInner {
    fn dispatch(&self) {
        let mut state = self.state.lock().expect("RateLimiter poisoned");
        self.dispatch_locked(&mut state);
    }

    fn dispatch_locked(&self, state: &mut LimiterState) {
        while state.active < self.max_concurrent {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            // a closed receiver means the caller gave up while queued
            if waiter.send(()).is_ok() {
                state.active += 1;
            }
        }
    }

    fn release(&self) {
        let mut state = self.state.lock().expect("RateLimiter poisoned");
        state.active = state.active.saturating_sub(1);
    }
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, delay: Duration) -> Self {
        assert!(max_concurrent > 0);

        Self {
            inner: Arc::new(LimiterInner {
                state: Mutex::new(LimiterState {
                    waiters: VecDeque::new(),
                    active: 0,
                }),
                max_concurrent,
                delay,
            }),
        }
    }

    pub fn from_preset(preset: RateLimitPreset) -> Self {
        Self::new(preset.max_concurrent, Duration::from_millis(preset.delay_ms))
    }

    /// Run `work` once a slot is free and return its output untouched.
    pub async fn execute<F, Fut, T>(&self, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.acquire().await;
        work().await
    }

    pub fn get_status(&self) -> RateLimitStatus {
        let state = self.inner.state.lock().expect("RateLimiter poisoned");
        RateLimitStatus {
            queue_length: state.waiters.iter().filter(|w| !w.is_closed()).count(),
            active: state.active,
            max_concurrent: self.inner.max_concurrent,
        }
    }

    async fn acquire(&self) -> Slot {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock().expect("RateLimiter poisoned");
            state.waiters.push_back(tx);
            self.inner.dispatch_locked(&mut state);
        }

        let mut pending = PendingSlot {
            rx,
            inner: self.inner.clone(),
            granted: false,
        };
        // the sender is only consumed by a successful grant
        let _ = (&mut pending.rx).await;
        pending.granted = true;

        Slot {
            inner: self.inner.clone(),
        }
    }
}

/// Queue entry that hands its slot back if dropped after being granted.
struct PendingSlot {
    rx: oneshot::Receiver<()>,
    inner: Arc<LimiterInner>,
    granted: bool,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.inner.release();
            self.inner.dispatch();
        }
    }
}

/// A running unit. Dropping it frees the slot after the configured delay.
struct Slot {
    inner: Arc<LimiterInner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.inner.release();

        let inner = self.inner.clone();
        if inner.delay.is_zero() {
            inner.dispatch();
            return;
        }
        tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            inner.dispatch();
        });
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..1000u64);
    Duration::from_millis(2u64.pow(attempt) * 1000 + jitter)
}

/// Call `f(input)`, retrying rate-limit failures with exponential backoff.
///
/// Any other error is returned as-is on first sight. Running out of attempts
/// yields [`LlmError::MaxRetriesExceeded`].
pub async fn call_llm_with_retry<F, Fut, I, T>(
    f: F,
    input: I,
    max_retries: u32,
) -> Result<T, LlmError>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
    I: Clone,
{
    for attempt in 0..max_retries {
        match f(input.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rate_limit() => {
                if attempt + 1 >= max_retries {
                    debug!(attempt, "rate limited on final attempt");
                    break;
                }
                let delay = backoff_delay(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }

    Err(LlmError::MaxRetriesExceeded {
        attempts: max_retries,
    })
}
