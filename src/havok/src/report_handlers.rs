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

//! The two in-core [`ReportHandler`]s: a console table and a structured-log
//! line per API. Time-series/Prometheus sinks are external collaborators,
//! referenced only by the trait.

use std::collections::HashMap;

use async_trait::async_trait;
use havok_types::stats::PerformanceStat;
use havok_types::Report;

use crate::reporter::ReportHandler;

const CUT_LINE: &str =
    "------------------------------------------------------------------------------------------------------------------------";

/// Prints a formatted table to stdout every collection cycle.
pub struct ConsoleReportHandler;

#[async_trait]
impl ReportHandler for ConsoleReportHandler {
    async fn handle(&self, report: &Report, _perf: &HashMap<String, PerformanceStat>) {
        if report.is_empty() {
            return;
        }
        println!("{CUT_LINE}");
        println!(
            "{:<24}{:>10}{:>10}{:>10}{:>10}{:>10}{:>10}{:>10}",
            "API", "Requests", "Failures", "QPS", "Min(ms)", "Max(ms)", "Avg(ms)", "P50(ms)"
        );
        println!("{CUT_LINE}");
        for (api, row) in report {
            let median = row
                .percentiles
                .iter()
                .find(|(p, _)| (*p - 0.5).abs() < f64::EPSILON)
                .map(|(_, v)| *v)
                .unwrap_or(0);
            println!(
                "{:<24}{:>10}{:>10}{:>10.1}{:>10}{:>10}{:>10}{:>10}",
                api,
                row.requests,
                row.failures,
                row.current_qps,
                row.min_ms,
                row.max_ms,
                row.average_ms,
                median
            );
        }
        println!("{CUT_LINE}");
    }
}

/// Emits one structured log line per API, for tailing via the process's
/// normal log pipeline rather than its own stdout table.
pub struct LogReportHandler;

#[async_trait]
impl ReportHandler for LogReportHandler {
    async fn handle(&self, report: &Report, _perf: &HashMap<String, PerformanceStat>) {
        for (api, row) in report {
            logger::info!(
                "replay stats";
                "api" => api.clone(),
                "requests" => row.requests,
                "failures" => row.failures,
                "current_qps" => row.current_qps,
                "avg_ms" => row.average_ms
            );
        }
    }
}
