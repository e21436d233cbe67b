use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Start times of the most recent attempts, at most `limit` of them.
///
/// With `limit` starts logged, the oldest one decides when the next attempt
/// may start: one `period` after it.
#[derive(Debug, Clone)]
pub(crate) struct StartLog {
    starts: VecDeque<Instant>,
    limit: usize,
}

impl StartLog {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            starts: VecDeque::new(),
            limit,
        }
    }

    /// When the next attempt may start, or `None` if it may start at `now`
    pub(crate) fn next_admission(&self, now: Instant, period: Duration) -> Option<Instant> {
        if self.starts.len() < self.limit {
            return None;
        }
        self.starts
            .front()
            .map(|oldest| *oldest + period)
            .filter(|at| now < *at)
    }

    /// Log a start, forgetting the oldest one at the limit
    pub(crate) fn record(&mut self, at: Instant) {
        if self.starts.len() >= self.limit {
            self.starts.pop_front();
        }
        self.starts.push_back(at);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.starts.len()
    }
}
