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

//! Wires the configured fetchers, the k-way merge and the time wheel into
//! the [`job::Starter`] the job state machine expects, and forwards paced
//! records into the `Havok` service. The fetcher trait itself knows nothing
//! about [`SubTaskEvent`]; this module is the composition root that adapts
//! fetcher completion into that vocabulary.

use std::sync::Arc;
use std::time::Duration;

use havok::HavokService;
use havok_types::{JobConfiguration, SubTaskEvent, SubTaskKind, TaskStatus};
use merge::{Error as FetchError, FetcherRegistry};
use snafu::Backtrace;
use timewheel::TimeWheelConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SOURCE_CHANNEL_CAPACITY: usize = 100;
const MERGED_CHANNEL_CAPACITY: usize = 1000;
const PACED_CHANNEL_CAPACITY: usize = 1;

/// The per-run inputs the fetch/merge/time-wheel pipeline needs, distinct
/// from [`havok_types::JobConfiguration`] only in that `stuck_ms` plays no
/// role here.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub sources: Vec<String>,
    pub job: JobConfiguration,
    pub timewheel_interval: Duration,
}

/// Spawns the fetch -> merge -> time-wheel -> dispatch pipeline for one job
/// run and returns immediately. `notify` receives exactly one `Fetcher`
/// event once every configured source has drained, and exactly one
/// `TimeWheel` event when pacing ends.
pub fn spawn_pipeline(
    registry: Arc<FetcherRegistry>,
    config: PipelineConfig,
    havok: Arc<HavokService>,
    notify: mpsc::Sender<SubTaskEvent>,
) {
    tokio::spawn(async move {
        let cancel = CancellationToken::new();
        let mut source_rxs = Vec::with_capacity(config.sources.len());
        let mut fetch_handles = Vec::with_capacity(config.sources.len());

        for name in &config.sources {
            let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
            source_rxs.push(rx);
            let mut fetcher = match registry.build(name) {
                Ok(f) => f,
                Err(e) => {
                    logger::warn!("skipping unregistered fetcher source"; "source" => name.clone(), "error" => e.to_string());
                    continue;
                }
            };
            let source_cancel = cancel.clone();
            let source_name = name.clone();
            fetch_handles.push(tokio::spawn(async move {
                let result = fetcher.fetch(source_cancel.clone(), tx).await;
                if let Err(e) = result {
                    let source_error = FetchError::Source {
                        name: source_name,
                        msg: e.to_string(),
                        backtrace: Backtrace::generate(),
                    };
                    logger::warn!("fetcher source failed, cancelling siblings"; "error" => source_error.to_string());
                    source_cancel.cancel();
                    return Err(source_error);
                }
                Ok(())
            }));
        }

        let fetcher_notify = notify.clone();
        tokio::spawn(async move {
            let mut failed = false;
            for handle in fetch_handles {
                if !matches!(handle.await, Ok(Ok(()))) {
                    failed = true;
                }
            }
            let _ = fetcher_notify
                .send(SubTaskEvent {
                    from: SubTaskKind::Fetcher,
                    status: if failed {
                        TaskStatus::Stopped
                    } else {
                        TaskStatus::Finished
                    },
                })
                .await;
        });

        let (merged_tx, merged_rx) = mpsc::channel(MERGED_CHANNEL_CAPACITY);
        tokio::spawn(merge::merge_k_way(source_rxs, merged_tx, cancel));

        let (paced_tx, mut paced_rx) = mpsc::channel(PACED_CHANNEL_CAPACITY);
        let timewheel_config = TimeWheelConfig {
            begin_ms: config.job.begin_ms,
            end_ms: config.job.end_ms,
            speed: config.job.speed,
            interval: config.timewheel_interval,
        };
        tokio::spawn(async move {
            if let Err(e) = timewheel::run(timewheel_config, merged_rx, paced_tx, notify).await {
                logger::error!("time wheel failed"; "error" => e.to_string());
            }
        });

        while let Some(record) = paced_rx.recv().await {
            havok.send(record);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use havok::{default_hash_fn, HavokService, ReplayerManager, ReplayerProxy, Reporter};
    use havok_proto::dispatcher_event::Event;
    use havok_types::LogRecord;
    use merge::VecFetcher;

    fn now_ms() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64
    }

    fn test_fetcher() -> Box<dyn merge::Fetcher> {
        let now = now_ms();
        Box::new(VecFetcher::new(
            "test",
            vec![
                LogRecord::new("http://example.com/a", "GET", now),
                LogRecord::new("http://example.com/b", "GET", now + 5),
            ],
        ))
    }

    #[tokio::test]
    async fn spawn_pipeline_delivers_paced_records_to_the_subscribed_replayer() {
        let manager = Arc::new(ReplayerManager::new());
        let proxy = Arc::new(ReplayerProxy::new(default_hash_fn()));
        let reporter = Reporter::new(manager.clone(), Duration::from_secs(5), Duration::from_secs(3), vec![]);
        let havok = HavokService::new(manager.clone(), proxy.clone(), reporter);

        let mut inbox = manager.try_register("r1").expect("register replayer");
        proxy.register("r1");

        let mut registry = FetcherRegistry::new();
        registry.register("test", test_fetcher);
        let registry = Arc::new(registry);

        let now = now_ms();
        let config = PipelineConfig {
            sources: vec!["test".to_string()],
            job: JobConfiguration {
                rate: 1.0,
                speed: 100.0,
                begin_ms: now - 1,
                end_ms: now + 10_000,
                stuck_ms: -1,
            },
            timewheel_interval: Duration::from_millis(5),
        };

        let (notify_tx, mut notify_rx) = mpsc::channel(4);
        spawn_pipeline(registry, config, havok, notify_tx);

        let mut received = Vec::new();
        for _ in 0..2 {
            let event = tokio::time::timeout(Duration::from_secs(5), inbox.recv())
                .await
                .expect("timed out waiting for record")
                .expect("inbox closed early");
            if let Some(Event::LogRecord(record)) = event.event {
                received.push(record.url);
            }
        }
        assert_eq!(received, vec!["http://example.com/a", "http://example.com/b"]);

        let fetcher_event = notify_rx.recv().await.expect("fetcher event");
        assert_eq!(fetcher_event.from, SubTaskKind::Fetcher);
        let timewheel_event = notify_rx.recv().await.expect("timewheel event");
        assert_eq!(timewheel_event.from, SubTaskKind::TimeWheel);
    }

    #[tokio::test]
    async fn unregistered_source_is_skipped_without_panicking() {
        let manager = Arc::new(ReplayerManager::new());
        let proxy = Arc::new(ReplayerProxy::new(default_hash_fn()));
        let reporter = Reporter::new(manager.clone(), Duration::from_secs(5), Duration::from_secs(3), vec![]);
        let havok = HavokService::new(manager, proxy, reporter);
        let registry = Arc::new(FetcherRegistry::new());

        let config = PipelineConfig {
            sources: vec!["missing".to_string()],
            job: JobConfiguration {
                rate: 1.0,
                speed: 1.0,
                begin_ms: 1,
                end_ms: 2,
                stuck_ms: -1,
            },
            timewheel_interval: Duration::from_millis(5),
        };

        let (notify_tx, mut notify_rx) = mpsc::channel(4);
        spawn_pipeline(registry, config, havok, notify_tx);

        let fetcher_event = tokio::time::timeout(Duration::from_secs(2), notify_rx.recv())
            .await
            .expect("timed out")
            .expect("fetcher event");
        assert_eq!(fetcher_event.from, SubTaskKind::Fetcher);
        assert_eq!(fetcher_event.status, TaskStatus::Finished);
    }
}
