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

//! The replayer binary: the composition root wiring the `Inspector`
//! (dispatcher-facing gRPC client), the `ReplayerEngine` (HTTP send
//! pipeline) and the stats submitter together.

mod config;

use std::sync::Arc;

use clap::Parser;
use havok_types::SummaryStats;
use inspector::{run_submitter, Inspector, InspectorConfig};
use replayer_core::{HttpClientConfig, ReplayerEngine, ReqwestHandler};
use tokio::sync::mpsc;

use crate::config::ReplayerConfig;

const RECORD_CHANNEL_CAPACITY: usize = 2000;
const BATCH_CHANNEL_CAPACITY: usize = 3;

#[derive(Parser, Debug)]
#[command(name = "havok-replayer")]
struct Args {
    /// Path to a TOML configuration file; defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
}

fn main() {
    let args = Args::parse();
    let config = match args.config {
        Some(path) => ReplayerConfig::from_file(&path),
        None => ReplayerConfig::default(),
    };

    let _log_level = logger::init_log(&config.logger);
    logger::info!("starting replayer"; "replayer_id" => config.inspector.replayer_id.clone());

    let runtimes = runtime::build_engine_runtimes(config.runtime.net_threads, config.runtime.send_threads)
        .expect("failed to build tokio runtimes");

    let http_client_config = HttpClientConfig {
        timeout: config.http_client.timeout.0,
        connect_timeout: config.http_client.connect_timeout.0,
        keep_alive: config.http_client.keep_alive,
    };
    let client = http_client_config.build().expect("failed to build http client");
    let terminal = Arc::new(ReqwestHandler::new(client));

    let stats = Arc::new(SummaryStats::new());
    // Only the URL-path selector is shipped upstream; it is also
    // `ReplayerEngine`'s built-in fallback, so no selector override is
    // passed here.
    let engine = ReplayerEngine::new(
        config.engine.concurrency,
        vec![],
        terminal,
        None,
        stats.clone(),
    );

    let inspector_config = InspectorConfig {
        dispatcher_addr: config.inspector.dispatcher_addr.clone(),
        replayer_id: config.inspector.replayer_id.clone(),
    };

    let net_runtime = runtimes.net_runtime.clone();
    let send_runtime = runtimes.send_runtime.clone();

    let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);

    let send_engine = engine.clone();
    send_runtime.spawn(async move { send_engine.run(record_rx).await });

    net_runtime.block_on(async move {
        let inspector = match Inspector::connect(inspector_config).await {
            Ok(i) => i,
            Err(e) => {
                logger::error!("failed to connect to dispatcher"; "error" => e.to_string());
                return;
            }
        };
        let client = inspector.client();
        let replayer_id = config.inspector.replayer_id.clone();

        let submitter_engine = engine.clone();
        let submitter_stats = stats.clone();
        tokio::spawn(async move {
            run_submitter(client, replayer_id, batch_rx, submitter_stats, submitter_engine).await;
        });

        if let Err(e) = inspector.run(engine, record_tx, batch_tx).await {
            logger::error!("inspector stream ended"; "error" => e.to_string());
        }
    });
}
