// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The replayer's per-record execution loop: rate multiplication, a global
//! concurrency cap, the middleware chain, and the one-shot `stuck` pause.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use havok_types::{LogRecord, Outcome, SummaryStats};
use tokio::sync::{mpsc, Semaphore};

use crate::middleware::{chain, Handler, Middleware, Payload, Timed};

/// Picks the bucket a record's outcome is reported under.
pub type ApiNameSelector = Arc<dyn Fn(&LogRecord) -> Option<String> + Send + Sync>;

fn default_api_name(record: &LogRecord) -> String {
    reqwest::Url::parse(&record.url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "default".to_string())
}

/// Mutable, control-event-driven parameters: rate and the one-shot stuck
/// pause. Guarded by a single read-write lock; writers are control events,
/// readers are the per-record loop.
#[derive(Debug)]
struct ReplayState {
    rate: f32,
    stuck_ms: i64,
}

pub struct ReplayerEngine {
    state: RwLock<ReplayState>,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    middlewares: Vec<Arc<dyn Middleware>>,
    terminal: Arc<dyn Handler>,
    api_name_selector: Option<ApiNameSelector>,
    stats: Arc<SummaryStats>,
}

impl ReplayerEngine {
    pub fn new(
        concurrency: usize,
        middlewares: Vec<Arc<dyn Middleware>>,
        terminal: Arc<dyn Handler>,
        api_name_selector: Option<ApiNameSelector>,
        stats: Arc<SummaryStats>,
    ) -> Arc<Self> {
        Arc::new(ReplayerEngine {
            state: RwLock::new(ReplayState {
                rate: 1.0,
                stuck_ms: 0,
            }),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            middlewares,
            terminal,
            api_name_selector,
            stats,
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Slots currently in flight, for the submitter's `current_concurrency`
    /// performance metric.
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.semaphore.available_permits()
    }

    pub fn rate(&self) -> f32 {
        self.state.read().expect("replay state lock poisoned").rate
    }

    /// Applies `rate` (if positive) and `stuck_ms` (if changed) from a
    /// control event, under the exclusive lock.
    pub fn apply_configuration(&self, rate: f32, stuck_ms: i64) {
        let mut state = self.state.write().expect("replay state lock poisoned");
        if rate > 0.0 && state.rate != rate {
            state.rate = rate;
        }
        if stuck_ms != state.stuck_ms {
            state.stuck_ms = stuck_ms;
        }
    }

    /// Consumes a pending positive `stuck`, resetting it to zero. One-shot:
    /// a second call before the next control event returns `None`.
    fn take_stuck(&self) -> Option<i64> {
        let mut state = self.state.write().expect("replay state lock poisoned");
        if state.stuck_ms > 0 {
            let stuck = state.stuck_ms;
            state.stuck_ms = 0;
            Some(stuck)
        } else {
            None
        }
    }

    /// How many sends this record should produce: the integer part is
    /// guaranteed, the fractional part is one extra send with probability
    /// equal to the fraction.
    fn send_count(&self) -> u32 {
        let rate = self.rate().max(0.0);
        let whole = rate.floor() as u32;
        let frac = rate - whole as f32;
        if frac > 0.0 && rand::random::<f32>() < frac {
            whole + 1
        } else {
            whole
        }
    }

    fn resolve_api_name(&self, record: &LogRecord) -> String {
        if let Some(selector) = &self.api_name_selector {
            if let Some(name) = selector(record) {
                return name;
            }
        }
        default_api_name(record)
    }

    /// Drains `records`, replaying each at the configured rate, until the
    /// channel closes (the fetcher/time-wheel pipeline finished, or the job
    /// was stopped upstream).
    pub async fn run(self: Arc<Self>, mut records: mpsc::Receiver<LogRecord>) {
        while let Some(record) = records.recv().await {
            if let Some(stuck) = self.take_stuck() {
                tokio::time::sleep(Duration::from_millis(stuck as u64)).await;
            }

            let sends = self.send_count();
            let api_name = self.resolve_api_name(&record);
            for _ in 0..sends {
                let permit = match self.semaphore.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                let payload = Payload::from(&record);
                let handler = chain(&self.middlewares, self.terminal.clone());
                let stats = self.stats.clone();
                let api_name = api_name.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let timed = Timed { inner: handler };
                    let (outcome, duration_ms) = timed.handle_timed(&payload).await;
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    let result = if outcome.is_failure() {
                        let reason = outcome
                            .error
                            .unwrap_or_else(|| format!("http status {}", outcome.status.unwrap_or(0)));
                        Outcome::failure(api_name, duration_ms, reason)
                    } else {
                        Outcome::success(api_name, duration_ms)
                    };
                    stats.log(&result, now_ms);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::HandlerOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        async fn handle(&self, _payload: &Payload) -> HandlerOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            HandlerOutcome {
                status: Some(200),
                error: None,
            }
        }
    }

    fn record() -> LogRecord {
        LogRecord::new("http://example.com/api/x", "GET", 0)
    }

    #[tokio::test]
    async fn rate_one_sends_exactly_once_per_record() {
        let calls = Arc::new(AtomicUsize::new(0));
        let terminal = Arc::new(CountingHandler {
            calls: calls.clone(),
        });
        let stats = Arc::new(SummaryStats::new());
        let engine = ReplayerEngine::new(10, vec![], terminal, None, stats.clone());

        let (tx, rx) = mpsc::channel(4);
        tx.send(record()).await.unwrap();
        drop(tx);
        engine.run(rx).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!stats.is_zero());
    }

    #[tokio::test]
    async fn stuck_is_consumed_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let terminal = Arc::new(CountingHandler {
            calls: calls.clone(),
        });
        let stats = Arc::new(SummaryStats::new());
        let engine = ReplayerEngine::new(10, vec![], terminal, None, stats);

        engine.apply_configuration(1.0, 5);
        assert_eq!(engine.take_stuck(), Some(5));
        assert_eq!(engine.take_stuck(), None);
    }

    #[test]
    fn api_name_falls_back_to_url_path() {
        let calls = Arc::new(AtomicUsize::new(0));
        let terminal = Arc::new(CountingHandler { calls });
        let stats = Arc::new(SummaryStats::new());
        let engine = ReplayerEngine::new(10, vec![], terminal, None, stats);
        assert_eq!(engine.resolve_api_name(&record()), "/api/x");
    }

    #[test]
    fn api_name_selector_overrides_fallback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let terminal = Arc::new(CountingHandler { calls });
        let stats = Arc::new(SummaryStats::new());
        let selector: ApiNameSelector = Arc::new(|_: &LogRecord| Some("grouped".to_string()));
        let engine = ReplayerEngine::new(10, vec![], terminal, Some(selector), stats);
        assert_eq!(engine.resolve_api_name(&record()), "grouped");
    }

    #[tokio::test]
    async fn fractional_rate_sends_two_or_three_times_per_record() {
        // rate 2.5: every record must send at least twice, never more than
        // three times, and the extra send should show up on roughly half of
        // them over enough samples.
        let calls = Arc::new(AtomicUsize::new(0));
        let terminal = Arc::new(CountingHandler {
            calls: calls.clone(),
        });
        let stats = Arc::new(SummaryStats::new());
        let engine = ReplayerEngine::new(500, vec![], terminal, None, stats);
        engine.apply_configuration(2.5, 0);

        const SAMPLES: u32 = 400;
        let mut extra_count = 0u32;
        for _ in 0..SAMPLES {
            let sends = engine.send_count();
            assert!(sends == 2 || sends == 3, "unexpected send count {sends}");
            if sends == 3 {
                extra_count += 1;
            }
        }

        let extra_fraction = f64::from(extra_count) / f64::from(SAMPLES);
        assert!(
            (0.3..0.7).contains(&extra_fraction),
            "extra-send fraction {extra_fraction} too far from the expected 0.5"
        );
    }
}
