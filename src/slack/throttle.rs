use tokio::sync::Mutex;
use tokio::time::{sleep_until, Duration, Instant};

/// Single-writer token bucket permitting one request per `interval`, with an
/// override used to honor Slack's `Retry-After`. Callers serialize through
/// `wait`.
pub struct Throttle {
    interval: Duration,
    state: Mutex<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(Instant::now()),
        }
    }

    /// Blocks until a token is available, then reserves the next slot.
    pub async fn wait(&self) {
        let mut next = self.state.lock().await;
        let now = Instant::now();
        if *next > now {
            sleep_until(*next).await;
        }
        *next = std::cmp::max(*next, now) + self.interval;
    }

    /// Overrides the next available slot, used to honor `Retry-After`. A
    /// call with a `deadline` in the past is a no-op (never moves the next
    /// slot earlier than the natural cadence).
    pub async fn set_wait_until(&self, deadline: Instant) {
        let mut next = self.state.lock().await;
        if deadline > *next {
            *next = deadline;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_does_not_block_on_first_call() {
        let throttle = Throttle::new(Duration::from_millis(50));
        let start = Instant::now();
        throttle.wait().await;
        assert!(start.elapsed() < Duration::from_millis(25));
    }

    #[tokio::test(start_paused = true)]
    async fn set_wait_until_delays_next_wait() {
        let throttle = Throttle::new(Duration::from_millis(10));
        throttle.wait().await;

        let deadline = Instant::now() + Duration::from_secs(5);
        throttle.set_wait_until(deadline).await;

        let start = Instant::now();
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
