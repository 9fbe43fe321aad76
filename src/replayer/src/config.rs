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

//! The replayer's TOML configuration shape, mirroring the dispatcher's
//! section-per-concern layout.

use std::time::Duration;

use logger::LoggerConfig;
use serde::{Deserialize, Serialize};
use time_ext::ReadableDuration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorSection {
    pub dispatcher_addr: String,
    pub replayer_id: String,
}

impl Default for InspectorSection {
    fn default() -> Self {
        InspectorSection {
            dispatcher_addr: "http://127.0.0.1:16300".to_string(),
            replayer_id: "replayer-1".to_string(),
        }
    }
}

/// Mirrors the original's `--rule`/selector flag: only the default URL-path
/// selector is shipped (it's also `replayer_core`'s built-in fallback, so
/// this section only decides whether to pass a selector override at all).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub concurrency: usize,
    pub record_buffer: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        EngineSection {
            concurrency: 3000,
            record_buffer: 2000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientSection {
    pub timeout: ReadableDuration,
    pub connect_timeout: ReadableDuration,
    pub keep_alive: bool,
}

impl Default for HttpClientSection {
    fn default() -> Self {
        HttpClientSection {
            timeout: ReadableDuration(Duration::from_secs(10)),
            connect_timeout: ReadableDuration(Duration::from_secs(5)),
            keep_alive: false,
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
            net_threads: 2,
            send_threads: 4,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayerConfig {
    pub inspector: InspectorSection,
    pub engine: EngineSection,
    pub http_client: HttpClientSection,
    pub runtime: RuntimeSection,
    pub logger: LoggerConfig,
}

impl ReplayerConfig {
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
        let config = ReplayerConfig::default();
        let serialized = toml::to_string(&config).expect("serialize");
        let parsed: ReplayerConfig = toml::from_str(&serialized).expect("parse");
        assert_eq!(parsed.inspector.dispatcher_addr, config.inspector.dispatcher_addr);
        assert_eq!(parsed.engine.concurrency, config.engine.concurrency);
        assert_eq!(parsed.http_client.keep_alive, config.http_client.keep_alive);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_sections() {
        let partial = r#"
            [inspector]
            replayer_id = "replayer-42"
        "#;
        let config: ReplayerConfig = toml::from_str(partial).expect("parse");
        assert_eq!(config.inspector.replayer_id, "replayer-42");
        assert_eq!(
            config.inspector.dispatcher_addr,
            InspectorSection::default().dispatcher_addr
        );
        assert_eq!(config.engine.concurrency, EngineSection::default().concurrency);
    }

    #[test]
    fn keep_alive_is_off_by_default() {
        assert!(!HttpClientSection::default().keep_alive);
    }
}
