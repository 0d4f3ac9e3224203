use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::stream::Stats;

const ROLLING_LOG_EVERY: usize = 10;

/// Per-request timing and throughput bookkeeping.
#[derive(Debug, Clone)]
pub struct MetricsAccumulator {
    started_at: Instant,
    first_token_at: Option<Instant>,
    token_count: usize,
}

impl MetricsAccumulator {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            first_token_at: None,
            token_count: 0,
        }
    }

    /// Counts one non-empty fragment and returns its 1-based `token_num`.
    pub fn record_token(&mut self, now: Instant) -> usize {
        self.token_count += 1;

        if self.first_token_at.is_none() {
            self.first_token_at = Some(now);
            info!(
                seconds = self.elapsed_at(now).as_secs_f64(),
                "time to first token"
            );
        }

        if self.token_count % ROLLING_LOG_EVERY == 0 {
            debug!(
                tokens = self.token_count,
                tokens_per_second = self.tokens_per_second_at(now),
                "rolling throughput"
            );
        }

        self.token_count
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn time_to_first_token(&self) -> Option<Duration> {
        self.first_token_at
            .map(|at| at.saturating_duration_since(self.started_at))
    }

    pub fn tokens_per_second_at(&self, now: Instant) -> f64 {
        tokens_per_second(self.token_count, self.elapsed_at(now))
    }

    pub fn finish(&self, now: Instant) -> Stats {
        let elapsed = self.elapsed_at(now);
        Stats {
            total_time_seconds: elapsed.as_secs_f64(),
            total_tokens: self.token_count,
            tokens_per_second: tokens_per_second(self.token_count, elapsed),
        }
    }

    fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

/// Under a millisecond of wall time the count itself is reported.
pub fn tokens_per_second(tokens: usize, elapsed: Duration) -> f64 {
    if elapsed < Duration::from_millis(1) {
        tokens as f64
    } else {
        tokens as f64 / elapsed.as_secs_f64()
    }
}
