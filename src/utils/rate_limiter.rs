/// Fixed-spacing request pacer
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Keeps at least `delay` between the start of consecutive requests
pub struct RequestPacer {
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(delay: Duration) -> Self {
        RequestPacer {
            delay,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the next request is allowed, then mark it as started
    pub async fn pace(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                let wait = self.delay - elapsed;
                debug!("Pacing next request by {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
