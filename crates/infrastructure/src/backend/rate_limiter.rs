use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window limiter: at most `max_requests` permits per `window`
pub struct RateLimiter {
    timestamps: Mutex<VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::new()),
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Wait until a request may be sent, then record it
    pub async fn acquire(&self) {
        loop {
            let now = Instant::now();
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                while timestamps
                    .front()
                    .is_some_and(|ts| now.duration_since(*ts) >= self.window)
                {
                    timestamps.pop_front();
                }

                if timestamps.len() < self.max_requests {
                    timestamps.push_back(now);
                    return;
                }

                match timestamps.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Permits left in the current window
    pub async fn available(&self) -> usize {
        let now = Instant::now();
        let timestamps = self.timestamps.lock().await;
        let used = timestamps
            .iter()
            .filter(|ts| now.duration_since(**ts) < self.window)
            .count();
        self.max_requests.saturating_sub(used)
    }
}
