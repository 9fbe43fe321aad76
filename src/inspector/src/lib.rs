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

//! The replayer's gRPC-facing half: subscribes to the dispatcher's event
//! stream, routes each event to the record pipeline, the replay engine's
//! configuration, or the stats submitter, and reports batches back.

pub mod submitter;

use std::collections::HashMap;
use std::sync::Arc;

use havok_proto::{
    dispatcher_event::Event, havok_client::HavokClient, SubscribeRequest,
};
use havok_types::SummaryStats;
use replayer_core::ReplayerEngine;
use snafu::{Backtrace, ResultExt, Snafu};
use tokio::sync::mpsc;
use tonic::transport::Channel;

pub use submitter::run_submitter;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to connect to dispatcher at {}: {}", addr, source))]
    Connect {
        addr: String,
        source: tonic::transport::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("subscribe call failed: {}", source))]
    Subscribe {
        source: tonic::Status,
        backtrace: Backtrace,
    },
    #[snafu(display("subscribe stream ended with error: {}", source))]
    Stream {
        source: tonic::Status,
        backtrace: Backtrace,
    },
}

macros::define_result!(Error);

#[derive(Clone, Debug)]
pub struct InspectorConfig {
    pub dispatcher_addr: String,
    pub replayer_id: String,
}

pub struct Inspector {
    client: HavokClient<Channel>,
    replayer_id: String,
}

impl Inspector {
    pub async fn connect(config: InspectorConfig) -> Result<Self> {
        let client = HavokClient::connect(config.dispatcher_addr.clone())
            .await
            .context(ConnectSnafu {
                addr: config.dispatcher_addr,
            })?;
        Ok(Inspector {
            client,
            replayer_id: config.replayer_id,
        })
    }

    /// A cloned client handle for the stats submitter. `tonic` clients share
    /// their underlying `Channel`, so this is cheap and lets `run_submitter`
    /// issue unary `Report` calls concurrently with `run`'s open stream.
    pub fn client(&self) -> HavokClient<Channel> {
        self.client.clone()
    }

    /// Subscribes to the dispatcher and processes the event stream until it
    /// ends. `records` is the channel feeding the replay engine; `batches`
    /// is the channel feeding the stats submitter (see [`run_submitter`]).
    pub async fn run(
        mut self,
        engine: Arc<ReplayerEngine>,
        records: mpsc::Sender<havok_types::LogRecord>,
        batches: mpsc::Sender<i32>,
    ) -> Result<()> {
        let mut stream = self
            .client
            .subscribe(SubscribeRequest {
                replayer_id: self.replayer_id.clone(),
            })
            .await
            .context(SubscribeSnafu)?
            .into_inner();

        loop {
            let message = match stream.message().await {
                Ok(Some(m)) => m,
                Ok(None) => return Ok(()),
                Err(e) => return Err(e).context(StreamSnafu),
            };

            if let Step::Stop(result) =
                handle_event(message.event, &self.replayer_id, &engine, &records, &batches).await
            {
                return result;
            }
        }
    }
}

/// Outcome of processing a single [`Event`]: either keep reading the stream,
/// or `run` should return with the given result.
enum Step {
    Continue,
    Stop(Result<()>),
}

/// The event-switch at the heart of [`Inspector::run`], pulled out so it can
/// be exercised without an actual gRPC stream.
async fn handle_event(
    event: Option<Event>,
    replayer_id: &str,
    engine: &Arc<ReplayerEngine>,
    records: &mpsc::Sender<havok_types::LogRecord>,
    batches: &mpsc::Sender<i32>,
) -> Step {
    match event {
        Some(Event::Subscribed(_)) => {
            logger::info!("subscribed to dispatcher"; "replayer_id" => replayer_id.to_string());
        }
        Some(Event::Disconnected(_)) => {
            logger::info!("dispatcher requested disconnect");
            return Step::Stop(Ok(()));
        }
        Some(Event::Ping(_)) => {}
        Some(Event::JobStart(start)) => {
            if let Some(cfg) = start.configuration {
                engine.apply_configuration(cfg.rate, cfg.stuck_ms);
            }
        }
        Some(Event::JobConfiguration(cfg)) => {
            engine.apply_configuration(cfg.rate, cfg.stuck_ms);
        }
        Some(Event::JobStop(_)) | Some(Event::JobFinish(_)) => {
            logger::info!("job ended");
        }
        Some(Event::LogRecord(record)) => {
            if records.send(record.into()).await.is_err() {
                logger::warn!("record pipeline closed, dropping record");
            }
        }
        Some(Event::StatsCollection(req)) => {
            if batches.send(req.batch_id).await.is_err() {
                logger::warn!("submitter pipeline closed, dropping batch"; "batch_id" => req.batch_id);
            }
        }
        None => {}
    }
    Step::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use replayer_core::{Handler, HandlerOutcome, Payload};

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn handle(&self, _payload: &Payload) -> HandlerOutcome {
            HandlerOutcome {
                status: Some(200),
                error: None,
            }
        }
    }

    fn test_engine() -> Arc<ReplayerEngine> {
        ReplayerEngine::new(
            4,
            vec![],
            Arc::new(NoopHandler),
            None,
            Arc::new(SummaryStats::new()),
        )
    }

    #[tokio::test]
    async fn job_configuration_updates_the_engine() {
        let engine = test_engine();
        let (records_tx, _records_rx) = mpsc::channel(1);
        let (batches_tx, _batches_rx) = mpsc::channel(1);

        let step = handle_event(
            Some(Event::JobConfiguration(havok_proto::JobConfiguration {
                rate: 3.0,
                speed: 1.0,
                begin_ms: 0,
                end_ms: 0,
                stuck_ms: 7,
            })),
            "replayer-1",
            &engine,
            &records_tx,
            &batches_tx,
        )
        .await;

        assert!(matches!(step, Step::Continue));
        assert_eq!(engine.rate(), 3.0);
    }

    #[tokio::test]
    async fn job_start_applies_its_configuration() {
        let engine = test_engine();
        let (records_tx, _records_rx) = mpsc::channel(1);
        let (batches_tx, _batches_rx) = mpsc::channel(1);

        handle_event(
            Some(Event::JobStart(havok_proto::JobStart {
                configuration: Some(havok_proto::JobConfiguration {
                    rate: 5.0,
                    speed: 1.0,
                    begin_ms: 0,
                    end_ms: 0,
                    stuck_ms: 0,
                }),
            })),
            "replayer-1",
            &engine,
            &records_tx,
            &batches_tx,
        )
        .await;

        assert_eq!(engine.rate(), 5.0);
    }

    #[tokio::test]
    async fn log_record_is_forwarded_to_the_record_channel() {
        let engine = test_engine();
        let (records_tx, mut records_rx) = mpsc::channel(1);
        let (batches_tx, _batches_rx) = mpsc::channel(1);

        let proto_record = havok_proto::LogRecord {
            url: "http://example.com/a".to_string(),
            method: "GET".to_string(),
            header: Default::default(),
            body: Vec::new(),
            occur_at_ms: 42,
            hash_field: String::new(),
        };
        handle_event(
            Some(Event::LogRecord(proto_record)),
            "replayer-1",
            &engine,
            &records_tx,
            &batches_tx,
        )
        .await;

        let forwarded = records_rx.try_recv().expect("record should be forwarded");
        assert_eq!(forwarded.url, "http://example.com/a");
    }

    #[tokio::test]
    async fn stats_collection_is_forwarded_to_the_batch_channel() {
        let engine = test_engine();
        let (records_tx, _records_rx) = mpsc::channel(1);
        let (batches_tx, mut batches_rx) = mpsc::channel(1);

        handle_event(
            Some(Event::StatsCollection(havok_proto::StatsRequest {
                batch_id: 9,
                request_time_ms: 0,
            })),
            "replayer-1",
            &engine,
            &records_tx,
            &batches_tx,
        )
        .await;

        assert_eq!(batches_rx.try_recv().expect("batch id should be forwarded"), 9);
    }

    #[tokio::test]
    async fn disconnected_stops_the_loop() {
        let engine = test_engine();
        let (records_tx, _records_rx) = mpsc::channel(1);
        let (batches_tx, _batches_rx) = mpsc::channel(1);

        let step = handle_event(
            Some(Event::Disconnected(havok_proto::Disconnected {})),
            "replayer-1",
            &engine,
            &records_tx,
            &batches_tx,
        )
        .await;

        assert!(matches!(step, Step::Stop(Ok(()))));
    }

    #[tokio::test]
    async fn ping_and_subscribed_keep_the_loop_running() {
        let engine = test_engine();
        let (records_tx, _records_rx) = mpsc::channel(1);
        let (batches_tx, _batches_rx) = mpsc::channel(1);

        for event in [
            Event::Ping(havok_proto::Ping {}),
            Event::Subscribed(havok_proto::Subscribed {}),
            Event::JobStop(havok_proto::JobStop {}),
            Event::JobFinish(havok_proto::JobFinish {}),
        ] {
            let step = handle_event(Some(event), "replayer-1", &engine, &records_tx, &batches_tx).await;
            assert!(matches!(step, Step::Continue));
        }
    }

    #[test]
    fn build_report_carries_the_batch_id_and_engine_slot_usage() {
        let stats = SummaryStats::new();
        let engine = test_engine();

        let report = build_report("replayer-1", 3, &stats, &engine);

        assert_eq!(report.replayer_id, "replayer-1");
        assert_eq!(report.batch_id, 3);
        assert_eq!(
            report.performance_stats.get("total_concurrency"),
            Some(&(engine.concurrency() as f64))
        );
        assert_eq!(
            report.performance_stats.get("current_concurrency"),
            Some(&0.0)
        );
    }
}

/// Snapshots `stats` and the engine's slot usage into a wire `StatsReport`
/// for one requested batch.
pub fn build_report(
    replayer_id: &str,
    batch_id: i32,
    stats: &SummaryStats,
    engine: &ReplayerEngine,
) -> havok_proto::StatsReport {
    let mut performance_stats = HashMap::new();
    performance_stats.insert("current_concurrency".to_string(), engine.in_flight() as f64);
    performance_stats.insert("total_concurrency".to_string(), engine.concurrency() as f64);

    havok_proto::StatsReport {
        replayer_id: replayer_id.to_string(),
        report_time_ms: chrono::Utc::now().timestamp_millis(),
        batch_id,
        stats: stats.to_wrappers(),
        performance_stats,
    }
}
