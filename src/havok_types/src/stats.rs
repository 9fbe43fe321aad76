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

//! Per-API histograms (`AttackerStats`) and the per-replayer/aggregate
//! collection of them (`SummaryStats`).
//!
//! Bucketing, percentile selection, the trend-success sliding window and the
//! `current_qps` window are all load-bearing constants carried over
//! verbatim; see the crate-level design ledger for why.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// The percentiles a [`Report`] surfaces, in the original's fixed order.
pub const TIME_DISTRIBUTIONS: [f64; 10] =
    [0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 0.97, 0.98, 0.99, 1.0];

/// The sliding window width (seconds) for `trend_success` eviction.
const TREND_SUCCESS_WINDOW_SECS: i64 = 30;

/// The window (seconds) `current_qps` averages over.
const CURRENT_QPS_RANGE_SECS: i64 = 12;

/// One outcome produced by a single replayed request.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub api: String,
    pub duration_ms: i64,
    pub error: Option<String>,
}

impl Outcome {
    pub fn success(api: impl Into<String>, duration_ms: i64) -> Self {
        Outcome {
            api: api.into(),
            duration_ms,
            error: None,
        }
    }

    pub fn failure(api: impl Into<String>, duration_ms: i64, error: impl Into<String>) -> Self {
        Outcome {
            api: api.into(),
            duration_ms,
            error: Some(error.into()),
        }
    }
}

pub type PerformanceStat = HashMap<String, f64>;

/// Rounds a response time, in milliseconds, to a histogram bucket: 1ms
/// buckets below 100ms, 10ms buckets below 1000ms, 100ms buckets above.
pub fn bucket_ms(ms: i64) -> i64 {
    if ms < 100 {
        ms
    } else if ms < 1000 {
        ms + 5 - (ms + 5).rem_euclid(10)
    } else {
        ms + 50 - (ms + 50).rem_euclid(100)
    }
}

fn accumulate_with_eviction(map: &mut BTreeMap<i64, i64>, key: i64, value: i64, window: i64) {
    if let Some(existing) = map.get_mut(&key) {
        *existing += value;
        return;
    }
    map.retain(|k, _| key - k <= window);
    map.insert(key, value);
}

/// Per-API counters and histograms for one replayer (or, after aggregation,
/// for a whole batch).
#[derive(Clone, Debug, Default)]
pub struct AttackerStats {
    pub requests: i64,
    pub failures: i64,
    pub total_response_time_ms: i64,
    pub min_response_time_ms: i64,
    pub max_response_time_ms: i64,
    pub trend_success: BTreeMap<i64, i64>,
    pub trend_failures: BTreeMap<i64, i64>,
    pub response_times: BTreeMap<i64, i64>,
    pub failure_times: BTreeMap<String, i64>,
    pub start_time_ms: i64,
    pub last_request_time_ms: i64,
}

impl AttackerStats {
    pub fn log(&mut self, outcome: &Outcome, now_ms: i64) {
        if self.start_time_ms == 0 {
            self.start_time_ms = now_ms;
            self.min_response_time_ms = outcome.duration_ms;
        }
        self.last_request_time_ms = now_ms;
        let now_secs = now_ms / 1000;

        match &outcome.error {
            None => {
                self.requests += 1;
                if outcome.duration_ms < self.min_response_time_ms {
                    self.min_response_time_ms = outcome.duration_ms;
                }
                if outcome.duration_ms > self.max_response_time_ms {
                    self.max_response_time_ms = outcome.duration_ms;
                }
                self.total_response_time_ms += outcome.duration_ms;
                accumulate_with_eviction(
                    &mut self.trend_success,
                    now_secs,
                    1,
                    TREND_SUCCESS_WINDOW_SECS,
                );
                *self
                    .response_times
                    .entry(bucket_ms(outcome.duration_ms))
                    .or_insert(0) += 1;
            }
            Some(err) => {
                self.failures += 1;
                *self.failure_times.entry(err.clone()).or_insert(0) += 1;
                *self.trend_failures.entry(now_secs).or_insert(0) += 1;
            }
        }
    }

    pub fn average_ms(&self) -> i64 {
        if self.requests == 0 {
            0
        } else {
            self.total_response_time_ms / self.requests
        }
    }

    pub fn fail_ratio(&self) -> f64 {
        let total = self.requests + self.failures;
        if total == 0 {
            0.0
        } else {
            self.failures as f64 / total as f64
        }
    }

    /// `f<=0` returns the minimum, `f>=1` the maximum; otherwise walks the
    /// sorted bucket keys accumulating counts until the target rank is hit.
    pub fn percentile(&self, f: f64) -> i64 {
        if f <= 0.0 {
            return self.min_response_time_ms;
        }
        if f >= 1.0 {
            return self.max_response_time_ms;
        }
        if self.requests == 0 {
            return 0;
        }
        let hit = (self.requests as f64 * f + 0.5) as i64;
        if hit >= self.requests {
            return self.max_response_time_ms;
        }
        let mut remaining = hit;
        for (bucket, count) in &self.response_times {
            remaining -= count;
            if remaining <= 0 {
                return *bucket;
            }
        }
        self.max_response_time_ms
    }

    /// Sum of `trend_success` over the asymmetric window
    /// `[now-1s-(range-1s), now-1s]`, preserved verbatim from the source
    /// this was distilled from.
    pub fn current_qps(&self, now_ms: i64) -> f64 {
        let end = now_ms / 1000 - 1;
        let mut start = end - (CURRENT_QPS_RANGE_SECS - 1);
        let floor = self.start_time_ms / 1000;
        if start < floor {
            start = floor;
        }
        if end < start {
            return 0.0;
        }
        let sum: i64 = self
            .trend_success
            .range(start..=end)
            .map(|(_, v)| *v)
            .sum();
        sum as f64 / (end - start + 1) as f64
    }

    pub fn total_qps(&self) -> f64 {
        let span_secs = (self.last_request_time_ms - self.start_time_ms) as f64 / 1000.0;
        if span_secs <= 0.0 {
            0.0
        } else {
            self.requests as f64 / span_secs
        }
    }

    pub fn is_zero(&self) -> bool {
        self.requests == 0 && self.failures == 0
    }

    /// Bag-union aggregation: sums counters and per-bucket maps, takes
    /// min-of-mins and max-of-maxes, earliest start and latest last-request.
    pub fn aggregate(&mut self, other: &AttackerStats) {
        if other.is_zero() {
            return;
        }
        if self.is_zero() {
            *self = other.clone();
            return;
        }
        self.requests += other.requests;
        self.failures += other.failures;
        self.total_response_time_ms += other.total_response_time_ms;
        self.min_response_time_ms = self.min_response_time_ms.min(other.min_response_time_ms);
        self.max_response_time_ms = self.max_response_time_ms.max(other.max_response_time_ms);
        for (k, v) in &other.trend_success {
            *self.trend_success.entry(*k).or_insert(0) += v;
        }
        for (k, v) in &other.trend_failures {
            *self.trend_failures.entry(*k).or_insert(0) += v;
        }
        for (k, v) in &other.response_times {
            *self.response_times.entry(*k).or_insert(0) += v;
        }
        for (k, v) in &other.failure_times {
            *self.failure_times.entry(k.clone()).or_insert(0) += v;
        }
        self.start_time_ms = if self.start_time_ms == 0 {
            other.start_time_ms
        } else {
            self.start_time_ms.min(other.start_time_ms)
        };
        self.last_request_time_ms = self.last_request_time_ms.max(other.last_request_time_ms);
    }
}

/// One row of a rendered report.
#[derive(Clone, Debug, Default)]
pub struct AttackerReport {
    pub api: String,
    pub requests: i64,
    pub failures: i64,
    pub current_qps: f64,
    pub total_qps: f64,
    pub min_ms: i64,
    pub max_ms: i64,
    pub average_ms: i64,
    pub percentiles: Vec<(f64, i64)>,
    pub failure_times: BTreeMap<String, i64>,
}

pub type Report = BTreeMap<String, AttackerReport>;

/// Per-API collection of [`AttackerStats`], keyed by API name. Each entry is
/// independently locked; the map itself is guarded by a single mutex, the
/// way the reporter and replayer both only ever touch it under short
/// critical sections.
#[derive(Default)]
pub struct SummaryStats {
    nodes: Mutex<HashMap<String, AttackerStats>>,
}

impl SummaryStats {
    pub fn new() -> Self {
        SummaryStats {
            nodes: Mutex::new(HashMap::new()),
        }
    }

    pub fn log(&self, outcome: &Outcome, now_ms: i64) {
        let mut nodes = self.nodes.lock().expect("summary stats lock poisoned");
        nodes
            .entry(outcome.api.clone())
            .or_insert_with(AttackerStats::default)
            .log(outcome, now_ms);
    }

    /// Merges `other`'s per-API stats into `self`. The first contributor for
    /// a given API name is stored as-is; later contributors are aggregated
    /// into that entry — the Rust equivalent of the original's
    /// load-or-store-then-aggregate behavior.
    pub fn aggregate(&self, other: &SummaryStats) {
        let incoming = other.nodes.lock().expect("summary stats lock poisoned");
        let mut nodes = self.nodes.lock().expect("summary stats lock poisoned");
        for (api, stats) in incoming.iter() {
            nodes
                .entry(api.clone())
                .and_modify(|existing| existing.aggregate(stats))
                .or_insert_with(|| stats.clone());
        }
    }

    pub fn is_zero(&self) -> bool {
        self.nodes.lock().expect("summary stats lock poisoned").is_empty()
    }

    pub fn report(&self, now_ms: i64) -> Report {
        let nodes = self.nodes.lock().expect("summary stats lock poisoned");
        let mut report = Report::new();
        for (api, stats) in nodes.iter() {
            let percentiles = TIME_DISTRIBUTIONS
                .iter()
                .map(|f| (*f, stats.percentile(*f)))
                .collect();
            report.insert(
                api.clone(),
                AttackerReport {
                    api: api.clone(),
                    requests: stats.requests,
                    failures: stats.failures,
                    current_qps: stats.current_qps(now_ms),
                    total_qps: stats.total_qps(),
                    min_ms: stats.min_response_time_ms,
                    max_ms: stats.max_response_time_ms,
                    average_ms: stats.average_ms(),
                    percentiles,
                    failure_times: stats.failure_times.clone(),
                },
            );
        }
        report
    }

    pub fn to_wrappers(&self) -> Vec<havok_proto::AttackerStatsWrapper> {
        let nodes = self.nodes.lock().expect("summary stats lock poisoned");
        nodes
            .iter()
            .map(|(api, s)| havok_proto::AttackerStatsWrapper {
                api: api.clone(),
                requests: s.requests,
                failures: s.failures,
                total_response_time_ms: s.total_response_time_ms,
                min_response_time_ms: s.min_response_time_ms,
                max_response_time_ms: s.max_response_time_ms,
                trend_success: s.trend_success.clone().into_iter().collect(),
                trend_failures: s.trend_failures.clone().into_iter().collect(),
                response_times: s.response_times.clone().into_iter().collect(),
                failure_times: s.failure_times.clone().into_iter().collect(),
                start_time_ms: s.start_time_ms,
                last_request_time_ms: s.last_request_time_ms,
            })
            .collect()
    }

    pub fn from_wrappers(wrappers: &[havok_proto::AttackerStatsWrapper]) -> Self {
        let mut nodes = HashMap::new();
        for w in wrappers {
            nodes.insert(
                w.api.clone(),
                AttackerStats {
                    requests: w.requests,
                    failures: w.failures,
                    total_response_time_ms: w.total_response_time_ms,
                    min_response_time_ms: w.min_response_time_ms,
                    max_response_time_ms: w.max_response_time_ms,
                    trend_success: w.trend_success.clone().into_iter().collect(),
                    trend_failures: w.trend_failures.clone().into_iter().collect(),
                    response_times: w.response_times.clone().into_iter().collect(),
                    failure_times: w.failure_times.clone().into_iter().collect(),
                    start_time_ms: w.start_time_ms,
                    last_request_time_ms: w.last_request_time_ms,
                },
            );
        }
        SummaryStats {
            nodes: Mutex::new(nodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_rounds_per_magnitude() {
        assert_eq!(bucket_ms(42), 42);
        assert_eq!(bucket_ms(123), 120);
        assert_eq!(bucket_ms(1234), 1200);
    }

    #[test]
    fn percentile_is_monotonic() {
        let mut s = AttackerStats::default();
        let now = 1_000_000;
        for ms in [10, 20, 30, 40, 50, 100, 200, 500] {
            s.log(&Outcome::success("api", ms), now);
        }
        let p50 = s.percentile(0.5);
        let p99 = s.percentile(0.99);
        assert!(p50 <= p99);
        assert_eq!(s.percentile(0.0), s.min_response_time_ms);
        assert_eq!(s.percentile(1.0), s.max_response_time_ms);
    }

    #[test]
    fn trend_success_evicts_on_insert_not_on_a_size_cap() {
        let mut map = BTreeMap::new();
        for k in 0..50 {
            accumulate_with_eviction(&mut map, k, 1, TREND_SUCCESS_WINDOW_SECS);
        }
        // only keys within 30 of the latest insert (49) should survive
        assert!(map.keys().all(|k| 49 - k <= TREND_SUCCESS_WINDOW_SECS));
        assert!(map.len() <= (TREND_SUCCESS_WINDOW_SECS + 1) as usize);
    }

    #[test]
    fn aggregate_is_commutative_on_counters() {
        let mut a = AttackerStats::default();
        a.log(&Outcome::success("x", 10), 1000);
        a.log(&Outcome::failure("x", 10, "boom"), 2000);

        let mut b = AttackerStats::default();
        b.log(&Outcome::success("x", 20), 3000);

        let mut ab = a.clone();
        ab.aggregate(&b);
        let mut ba = b.clone();
        ba.aggregate(&a);

        assert_eq!(ab.requests, ba.requests);
        assert_eq!(ab.failures, ba.failures);
        assert_eq!(ab.total_response_time_ms, ba.total_response_time_ms);
    }

    #[test]
    fn summary_stats_first_writer_then_merges() {
        let summary = SummaryStats::new();
        summary.log(&Outcome::success("api", 10), 1000);

        let other = SummaryStats::new();
        other.log(&Outcome::success("api", 20), 1000);

        summary.aggregate(&other);
        let report = summary.report(2000);
        assert_eq!(report.get("api").unwrap().requests, 2);
    }
}
