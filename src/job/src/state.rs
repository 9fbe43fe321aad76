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

//! The top-level job state machine: `Ready -> Running -> {Finished,
//! Stopped}`, wired to the fetcher and time wheel through a notify channel
//! rather than a back-reference, and driving the shake/strike feature
//! loops while running.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use havok::HavokService;
use havok_proto::{dispatcher_event::Event, DispatcherEvent, JobFinish, JobStart, JobStop};
use havok_types::{Feature, FeatureConfig, JobConfiguration, SubTaskEvent, SubTaskKind, TaskStatus};
use snafu::{Backtrace, ResultExt, Snafu};
use tokio::sync::mpsc;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("job is not ready to start (status is not Ready)"))]
    NotReady { backtrace: Backtrace },
    #[snafu(display("invalid job configuration: {}", source))]
    Configuration { source: havok_types::Error },
}

macros::define_result!(Error);

/// Spawns the fetcher and time wheel concurrently, wiring their completion
/// notifications into the given channel. Supplied by the composition root
/// (the dispatcher binary), which alone knows the concrete fetcher/time
/// wheel instances for this run.
pub type Starter = Box<dyn FnOnce(mpsc::Sender<SubTaskEvent>) + Send>;

#[derive(Clone, serde::Serialize)]
pub struct JobDescription {
    pub status: String,
    pub fetcher_status: String,
    pub timewheel_status: String,
    pub configuration: JobConfiguration,
    pub feature: Feature,
}

fn status_name(s: TaskStatus) -> String {
    match s {
        TaskStatus::Ready => "ready",
        TaskStatus::Running => "running",
        TaskStatus::Paused => "paused",
        TaskStatus::Finished => "finished",
        TaskStatus::Stopped => "stopped",
    }
    .to_string()
}

pub struct Job {
    config: RwLock<JobConfiguration>,
    feature: RwLock<Feature>,
    status: Mutex<TaskStatus>,
    fetcher_status: Mutex<TaskStatus>,
    timewheel_status: Mutex<TaskStatus>,
    havok: Arc<HavokService>,
    starter: Mutex<Option<Starter>>,
}

impl Job {
    pub fn new(config: JobConfiguration, havok: Arc<HavokService>, starter: Starter) -> Result<Arc<Self>> {
        config.check().context(ConfigurationSnafu)?;
        Ok(Arc::new(Job {
            config: RwLock::new(config),
            feature: RwLock::new(Feature::default()),
            status: Mutex::new(TaskStatus::Ready),
            fetcher_status: Mutex::new(TaskStatus::Ready),
            timewheel_status: Mutex::new(TaskStatus::Ready),
            havok,
            starter: Mutex::new(Some(starter)),
        }))
    }

    pub fn status(&self) -> TaskStatus {
        *self.status.lock().expect("job status lock poisoned")
    }

    pub fn configuration(&self) -> JobConfiguration {
        *self.config.read().expect("job config lock poisoned")
    }

    pub fn feature(&self) -> Feature {
        *self.feature.read().expect("job feature lock poisoned")
    }

    pub fn description(&self) -> JobDescription {
        JobDescription {
            status: status_name(self.status()),
            fetcher_status: status_name(*self.fetcher_status.lock().expect("job status lock poisoned")),
            timewheel_status: status_name(*self.timewheel_status.lock().expect("job status lock poisoned")),
            configuration: self.configuration(),
            feature: self.feature(),
        }
    }

    pub fn set_shake(&self, patch: FeatureConfig) {
        let mut feature = self.feature.write().expect("job feature lock poisoned");
        feature.shake = feature.shake.merge(&patch);
    }

    pub fn set_strike(&self, patch: FeatureConfig) {
        let mut feature = self.feature.write().expect("job feature lock poisoned");
        feature.strike = feature.strike.merge(&patch);
    }

    /// `Ready -> Running`. Merges an optional partial configuration,
    /// broadcasts `JobStart`, starts the fetcher/time-wheel pair and the
    /// feature loops. Only valid from `Ready`.
    pub fn start(self: &Arc<Self>, patch: Option<JobConfiguration>) -> Result<()> {
        {
            let mut status = self.status.lock().expect("job status lock poisoned");
            if *status != TaskStatus::Ready {
                return NotReadySnafu.fail();
            }
            let mut config = self.config.write().expect("job config lock poisoned");
            if let Some(p) = patch {
                *config = config.merge(&p);
            }
            config.check().context(ConfigurationSnafu)?;
            *status = TaskStatus::Running;
        }

        let active_config = self.configuration();
        self.havok.broadcast(DispatcherEvent {
            event: Some(Event::JobStart(JobStart {
                configuration: Some(active_config.into()),
            })),
        });

        let (tx, rx) = mpsc::channel(16);
        if let Some(starter) = self.starter.lock().expect("job starter lock poisoned").take() {
            starter(tx);
        }

        let notify_job = self.clone();
        tokio::spawn(async move { notify_job.notify_loop(rx).await });
        let shake_job = self.clone();
        tokio::spawn(async move { shake_job.feature_shake_loop().await });
        let strike_job = self.clone();
        tokio::spawn(async move { strike_job.feature_strike_loop().await });

        Ok(())
    }

    async fn notify_loop(self: Arc<Self>, mut rx: mpsc::Receiver<SubTaskEvent>) {
        while let Some(event) = rx.recv().await {
            match event.from {
                SubTaskKind::Fetcher => {
                    *self.fetcher_status.lock().expect("job status lock poisoned") = event.status;
                    // Fetcher completion is recorded only; the time wheel
                    // draining its own input decides when the job finishes.
                }
                SubTaskKind::TimeWheel => {
                    *self.timewheel_status.lock().expect("job status lock poisoned") = event.status;
                    match event.status {
                        TaskStatus::Finished => self.finish(),
                        TaskStatus::Stopped => self.stop(),
                        _ => {}
                    }
                }
            }
        }
    }

    /// `Running -> Stopped`, broadcasting `JobStop`. No-op outside Running.
    pub fn stop(&self) {
        let mut status = self.status.lock().expect("job status lock poisoned");
        if *status == TaskStatus::Running {
            *status = TaskStatus::Stopped;
            drop(status);
            self.havok.broadcast(DispatcherEvent {
                event: Some(Event::JobStop(JobStop {})),
            });
        }
    }

    /// `Running -> Finished`, broadcasting `JobFinish`. No-op outside Running.
    pub fn finish(&self) {
        let mut status = self.status.lock().expect("job status lock poisoned");
        if *status == TaskStatus::Running {
            *status = TaskStatus::Finished;
            drop(status);
            self.havok.broadcast(DispatcherEvent {
                event: Some(Event::JobFinish(JobFinish {})),
            });
        }
    }

    fn broadcast_configuration(&self) {
        self.havok.broadcast(DispatcherEvent {
            event: Some(Event::JobConfiguration(self.configuration().into())),
        });
    }

    /// Every `interval_secs`, with probability `probability`, injects a
    /// one-shot stall of up to `peak` seconds. Sleeps 200ms between rolls
    /// while the feature is disabled (`probability <= 0`) to avoid
    /// busy-looping.
    async fn feature_shake_loop(self: Arc<Self>) {
        loop {
            if self.status() != TaskStatus::Running {
                return;
            }
            let shake = self.feature().shake;
            if shake.probability <= 0.0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                continue;
            }
            tokio::time::sleep(Duration::from_secs(shake.interval_secs.max(1) as u64)).await;
            if self.status() != TaskStatus::Running {
                return;
            }
            if rand::random::<f32>() < shake.probability {
                let stuck_ms = (rand::random::<f32>() * shake.peak * 1000.0).max(0.0) as i64;
                {
                    let mut config = self.config.write().expect("job config lock poisoned");
                    config.stuck_ms = stuck_ms;
                }
                self.broadcast_configuration();
            }
        }
    }

    /// Every `interval_secs`, with probability `probability`, overrides
    /// `rate` with a random value up to `peak` for `coverage_secs`, then
    /// restores the original rate.
    async fn feature_strike_loop(self: Arc<Self>) {
        loop {
            if self.status() != TaskStatus::Running {
                return;
            }
            let strike = self.feature().strike;
            if strike.probability <= 0.0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                continue;
            }
            tokio::time::sleep(Duration::from_secs(strike.interval_secs.max(1) as u64)).await;
            if self.status() != TaskStatus::Running {
                return;
            }
            if rand::random::<f32>() < strike.probability {
                let original_rate = self.configuration().rate;
                let new_rate = (rand::random::<f32>() * strike.peak).max(0.01);
                {
                    let mut config = self.config.write().expect("job config lock poisoned");
                    config.rate = new_rate;
                }
                self.broadcast_configuration();

                tokio::time::sleep(Duration::from_secs(strike.coverage_secs.max(0) as u64)).await;

                {
                    let mut config = self.config.write().expect("job config lock poisoned");
                    config.rate = original_rate;
                }
                self.broadcast_configuration();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use havok::{HavokService, ReplayerManager, ReplayerProxy, Reporter};
    use std::time::Duration as StdDuration;

    fn test_havok() -> Arc<HavokService> {
        let manager = Arc::new(ReplayerManager::new());
        let proxy = Arc::new(ReplayerProxy::new(havok::default_hash_fn()));
        let reporter = Reporter::new(manager.clone(), StdDuration::from_secs(3600), StdDuration::from_secs(1), vec![]);
        HavokService::new(manager, proxy, reporter)
    }

    fn valid_config() -> JobConfiguration {
        JobConfiguration {
            rate: 1.0,
            speed: 1.0,
            begin_ms: 1,
            end_ms: 2,
            stuck_ms: -1,
        }
    }

    #[test]
    fn starts_only_from_ready() {
        let job = Job::new(valid_config(), test_havok(), Box::new(|_| {})).unwrap();
        assert_eq!(job.status(), TaskStatus::Ready);
        job.start(None).unwrap();
        assert_eq!(job.status(), TaskStatus::Running);
        assert!(job.start(None).is_err());
    }

    #[test]
    fn stop_and_finish_are_noop_outside_running() {
        let job = Job::new(valid_config(), test_havok(), Box::new(|_| {})).unwrap();
        job.stop();
        assert_eq!(job.status(), TaskStatus::Ready);
        job.finish();
        assert_eq!(job.status(), TaskStatus::Ready);
    }

    #[tokio::test]
    async fn timewheel_finished_notification_finishes_the_job() {
        let job = Job::new(valid_config(), test_havok(), Box::new(|_| {})).unwrap();
        job.start(None).unwrap();
        let (tx, rx) = mpsc::channel(4);
        let job_clone = job.clone();
        tokio::spawn(async move { job_clone.notify_loop(rx).await });
        tx.send(SubTaskEvent {
            from: SubTaskKind::TimeWheel,
            status: TaskStatus::Finished,
        })
        .await
        .unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(job.status(), TaskStatus::Finished);
    }
}
