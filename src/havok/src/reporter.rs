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

//! Batches per-replayer stats reports into one aggregate per collection
//! cycle, tolerating stragglers up to a deadline.

use std::collections::{BTreeMap, HashMap};
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use havok_proto::{dispatcher_event::Event, DispatcherEvent, StatsRequest};
use havok_types::stats::PerformanceStat;
use havok_types::{Report, SummaryStats};

use crate::manager::ReplayerManager;

#[async_trait]
pub trait ReportHandler: Send + Sync {
    async fn handle(&self, report: &Report, perf: &HashMap<String, PerformanceStat>);
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

struct Reservoir {
    expected: i32,
    replied: i32,
    summary: SummaryStats,
    per_replayer_perf: HashMap<String, PerformanceStat>,
    deadline_ms: i64,
    completed: bool,
}

impl Reservoir {
    fn is_ready(&self) -> bool {
        !self.completed && self.replied >= self.expected
    }
}

struct ReservoirState {
    reservoirs: BTreeMap<i32, Reservoir>,
    last_completed_batch: i32,
}

/// Periodically polls every subscribed replayer for its accumulated stats,
/// aggregates the replies that arrive by a fixed deadline, and hands the
/// result to every configured [`ReportHandler`].
pub struct Reporter {
    manager: Arc<ReplayerManager>,
    collect_interval: Duration,
    timeout: Duration,
    batch: AtomicI32,
    state: Mutex<ReservoirState>,
    handlers: Vec<Arc<dyn ReportHandler>>,
    last_report: Mutex<Option<Report>>,
}

impl Reporter {
    pub fn new(
        manager: Arc<ReplayerManager>,
        collect_interval: Duration,
        timeout: Duration,
        handlers: Vec<Arc<dyn ReportHandler>>,
    ) -> Arc<Self> {
        Arc::new(Reporter {
            manager,
            collect_interval,
            timeout,
            batch: AtomicI32::new(0),
            state: Mutex::new(ReservoirState {
                reservoirs: BTreeMap::new(),
                last_completed_batch: -1,
            }),
            handlers,
        })
    }

    /// Spawns the periodic poll loop and the deadline watchdog. Returns
    /// immediately; the loops run for the lifetime of the returned handles.
    pub fn spawn(self: &Arc<Self>) {
        let periodic = self.clone();
        tokio::spawn(async move { periodic.periodic_request_loop().await });
        let watchdog = self.clone();
        tokio::spawn(async move { watchdog.watchdog_loop().await });
    }

    async fn periodic_request_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.collect_interval).await;
            let ids = self.manager.ids();
            let n = ids.len() as i32;
            if n == 0 {
                continue;
            }
            let batch = self.batch.fetch_add(1, Ordering::SeqCst) + 1;
            {
                let mut state = self.state.lock().expect("reporter state lock poisoned");
                state.reservoirs.insert(
                    batch,
                    Reservoir {
                        expected: n,
                        replied: 0,
                        summary: SummaryStats::new(),
                        per_replayer_perf: HashMap::new(),
                        deadline_ms: now_ms() + self.timeout.as_millis() as i64,
                        completed: false,
                    },
                );
            }
            let event = DispatcherEvent {
                event: Some(Event::StatsCollection(StatsRequest {
                    batch_id: batch,
                    request_time_ms: now_ms(),
                })),
            };
            let mut failed = 0;
            for id in &ids {
                if !self.manager.deliver(id, event.clone()) {
                    failed += 1;
                }
            }
            if failed > 0 {
                let mut state = self.state.lock().expect("reporter state lock poisoned");
                if let Some(r) = state.reservoirs.get_mut(&batch) {
                    r.expected -= failed;
                }
            }
            self.maybe_complete(batch).await;
        }
    }

    async fn watchdog_loop(self: Arc<Self>) {
        let tick = std::cmp::max(self.timeout / 2, Duration::from_millis(500));
        loop {
            tokio::time::sleep(tick).await;
            let expired: Vec<i32> = {
                let state = self.state.lock().expect("reporter state lock poisoned");
                let now = now_ms();
                state
                    .reservoirs
                    .iter()
                    .filter(|(_, r)| !r.completed && now >= r.deadline_ms)
                    .map(|(batch, _)| *batch)
                    .collect()
            };
            for batch in expired {
                self.maybe_complete(batch).await;
            }
        }
    }

    /// Applies one replayer's stats reply to the reservoir for `batch`.
    /// Reports for an unknown (already-GC'd or never-created) batch are
    /// discarded — late or duplicate.
    pub async fn collect(
        &self,
        batch: i32,
        summary: SummaryStats,
        perf: PerformanceStat,
        replayer_id: &str,
    ) {
        let ready = {
            let mut state = self.state.lock().expect("reporter state lock poisoned");
            match state.reservoirs.get_mut(&batch) {
                Some(r) => {
                    r.summary.aggregate(&summary);
                    r.per_replayer_perf.insert(replayer_id.to_string(), perf);
                    r.replied += 1;
                    r.is_ready()
                }
                None => {
                    logger::warn!("discarding stats report for unknown batch"; "batch" => batch);
                    false
                }
            }
        };
        if ready {
            self.maybe_complete(batch).await;
        }
    }

    /// Completes `batch` exactly once — either because every expected
    /// replayer replied or because the deadline passed — then garbage
    /// collects it and every older batch.
    async fn maybe_complete(&self, batch: i32) {
        let (report, perf, run_handlers) = {
            let mut state = self.state.lock().expect("reporter state lock poisoned");
            if batch <= state.last_completed_batch {
                return;
            }
            let ready = matches!(state.reservoirs.get(&batch), Some(r) if r.is_ready() || now_ms() >= r.deadline_ms);
            if !ready {
                return;
            }
            let reservoir = state.reservoirs.get_mut(&batch).expect("checked above");
            if reservoir.completed {
                return;
            }
            reservoir.completed = true;
            let report = reservoir.summary.report(now_ms());
            let perf = reservoir.per_replayer_perf.clone();
            let is_zero = reservoir.summary.is_zero();
            state.reservoirs.retain(|b, _| *b > batch);
            state.last_completed_batch = batch;
            (report, perf, !is_zero)
        };
        // The stored last report and completed-batch id advance on every
        // completion; only the handler dispatch (console/log output) is
        // skipped for a batch with no stats to show.
        *self.last_report.lock().expect("reporter state lock poisoned") = Some(report.clone());
        if !run_handlers {
            return;
        }
        for handler in self.handlers.clone() {
            let report = report.clone();
            let perf = perf.clone();
            tokio::spawn(async move { handler.handle(&report, &perf).await });
        }
    }

    pub fn last_report(&self) -> Option<Report> {
        self.last_report.lock().expect("reporter state lock poisoned").clone()
    }

    /// The id of the most recently completed batch, or `-1` if none has
    /// completed yet — mirrors the original's `lastCompletedBatch` field.
    pub fn last_completed_batch(&self) -> i32 {
        self.state.lock().expect("reporter state lock poisoned").last_completed_batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use havok_types::stats::Outcome;

    #[tokio::test]
    async fn completes_once_all_expected_replayers_report() {
        let manager = Arc::new(ReplayerManager::new());
        let _rx1 = manager.try_register("r1").unwrap();
        let _rx2 = manager.try_register("r2").unwrap();
        let reporter = Reporter::new(
            manager.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(1),
            vec![],
        );

        {
            let mut state = reporter.state.lock().unwrap();
            state.reservoirs.insert(
                1,
                Reservoir {
                    expected: 2,
                    replied: 0,
                    summary: SummaryStats::new(),
                    per_replayer_perf: HashMap::new(),
                    deadline_ms: now_ms() + 60_000,
                    completed: false,
                },
            );
        }

        let mut s1 = SummaryStats::new();
        s1.log(&Outcome::success("api", 10), now_ms());
        reporter.collect(1, s1, HashMap::new(), "r1").await;
        assert!(reporter.last_report().is_none());

        let mut s2 = SummaryStats::new();
        s2.log(&Outcome::success("api", 20), now_ms());
        reporter.collect(1, s2, HashMap::new(), "r2").await;

        let report = reporter.last_report().expect("batch should have completed");
        assert_eq!(report.get("api").unwrap().requests, 2);
    }

    #[tokio::test]
    async fn zero_stat_batch_still_updates_last_report_and_completed_batch() {
        let manager = Arc::new(ReplayerManager::new());
        let reporter = Reporter::new(
            manager,
            Duration::from_secs(3600),
            Duration::from_secs(1),
            vec![],
        );
        {
            let mut state = reporter.state.lock().unwrap();
            state.reservoirs.insert(
                7,
                Reservoir {
                    expected: 1,
                    replied: 0,
                    summary: SummaryStats::new(),
                    per_replayer_perf: HashMap::new(),
                    deadline_ms: now_ms() + 60_000,
                    completed: false,
                },
            );
        }

        assert_eq!(reporter.last_completed_batch(), -1);
        reporter.collect(7, SummaryStats::new(), HashMap::new(), "r1").await;

        assert!(reporter.last_report().is_some());
        assert_eq!(reporter.last_completed_batch(), 7);
    }

    #[tokio::test]
    async fn late_report_for_gced_batch_is_discarded() {
        let manager = Arc::new(ReplayerManager::new());
        let reporter = Reporter::new(
            manager,
            Duration::from_secs(3600),
            Duration::from_secs(1),
            vec![],
        );
        {
            let mut state = reporter.state.lock().unwrap();
            state.last_completed_batch = 5;
        }
        let mut s = SummaryStats::new();
        s.log(&Outcome::success("api", 1), now_ms());
        reporter.collect(2, s, HashMap::new(), "r1").await;
        assert!(reporter.last_report().is_none());
    }
}
