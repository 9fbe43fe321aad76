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

//! The dispatcher's TOML configuration shape, mirroring the original's
//! `dispatcherConfig` sections (`Job`, `Fetcher`, `Service`, `Reporter`)
//! with `#[serde(default)]` structs carrying the original's hardcoded
//! defaults.

use std::time::Duration;

use havok_types::JobConfiguration;
use logger::LoggerConfig;
use serde::{Deserialize, Serialize};
use time_ext::ReadableDuration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSection {
    pub rate: f32,
    pub speed: f32,
    pub begin_ms: i64,
    pub end_ms: i64,
}

impl Default for JobSection {
    fn default() -> Self {
        JobSection {
            rate: 1.0,
            speed: 1.0,
            begin_ms: 0,
            end_ms: 0,
        }
    }
}

impl From<&JobSection> for JobConfiguration {
    fn from(s: &JobSection) -> Self {
        JobConfiguration {
            rate: s.rate,
            speed: s.speed,
            begin_ms: s.begin_ms,
            end_ms: s.end_ms,
            stuck_ms: -1,
        }
    }
}

/// Names of registered fetcher sources to merge, in the manner of the
/// original's `conf.Fetcher.Type` switch — concrete adapters (file, Kafka,
/// SLS) register themselves against [`merge::FetcherRegistry`]; this crate
/// only names which registered sources take part in this run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSection {
    pub sources: Vec<String>,
}

impl Default for FetcherSection {
    fn default() -> Self {
        FetcherSection {
            sources: vec!["demo".to_string()],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub grpc_addr: String,
    pub http_addr: String,
    pub keepalive_interval: ReadableDuration,
}

impl Default for ServiceSection {
    fn default() -> Self {
        ServiceSection {
            grpc_addr: "0.0.0.0:16300".to_string(),
            http_addr: "0.0.0.0:16301".to_string(),
            keepalive_interval: ReadableDuration(Duration::from_secs(60)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterSection {
    pub collect_interval: ReadableDuration,
    pub timeout: ReadableDuration,
    pub console: bool,
    pub log: bool,
}

impl Default for ReporterSection {
    fn default() -> Self {
        ReporterSection {
            collect_interval: ReadableDuration(Duration::from_secs(5)),
            timeout: ReadableDuration(Duration::from_secs(3)),
            console: true,
            log: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeWheelSection {
    pub interval: ReadableDuration,
}

impl Default for TimeWheelSection {
    fn default() -> Self {
        TimeWheelSection {
            interval: ReadableDuration(Duration::from_millis(10)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub net_threads: usize,
    pub send_threads: usize,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        RuntimeSection {
            net_threads: 4,
            send_threads: 2,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub job: JobSection,
    pub fetcher: FetcherSection,
    pub timewheel: TimeWheelSection,
    pub service: ServiceSection,
    pub reporter: ReporterSection,
    pub runtime: RuntimeSection,
    pub logger: LoggerConfig,
}

impl DispatcherConfig {
    pub fn from_file(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("failed to read config file {path}: {e}"));
        toml::from_str(&content).unwrap_or_else(|e| panic!("failed to parse config file {path}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = DispatcherConfig::default();
        let serialized = toml::to_string(&config).expect("serialize");
        let parsed: DispatcherConfig = toml::from_str(&serialized).expect("parse");
        assert_eq!(parsed.job.rate, config.job.rate);
        assert_eq!(parsed.fetcher.sources, config.fetcher.sources);
        assert_eq!(parsed.service.grpc_addr, config.service.grpc_addr);
        assert_eq!(
            parsed.reporter.collect_interval.as_duration(),
            config.reporter.collect_interval.as_duration()
        );
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_sections() {
        let partial = r#"
            [service]
            grpc_addr = "0.0.0.0:9000"
        "#;
        let config: DispatcherConfig = toml::from_str(partial).expect("parse");
        assert_eq!(config.service.grpc_addr, "0.0.0.0:9000");
        assert_eq!(config.service.http_addr, ServiceSection::default().http_addr);
        assert_eq!(config.job.rate, JobSection::default().rate);
    }

    #[test]
    fn job_section_carries_stuck_ms_as_leave_unchanged() {
        let section = JobSection::default();
        let job: JobConfiguration = (&section).into();
        assert_eq!(job.stuck_ms, -1);
        assert_eq!(job.rate, section.rate);
    }
}
