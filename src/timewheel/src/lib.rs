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

//! Paces record emission so a log's original inter-arrival gaps are
//! replayed at `speed`x wall-clock speed.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use havok_types::{LogRecord, SubTaskEvent, SubTaskKind, TaskStatus};
use snafu::{Backtrace, Snafu};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid time wheel configuration: {}", msg))]
    InvalidConfiguration { msg: String, backtrace: Backtrace },
}

macros::define_result!(Error);

/// 10ms, the original tick granularity.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);
/// Input channel capacity between the merge fetcher and the time wheel.
pub const DEFAULT_INBOX_BUFFER: usize = 1000;

#[derive(Clone, Copy, Debug)]
pub struct TimeWheelConfig {
    pub begin_ms: i64,
    pub end_ms: i64,
    pub speed: f32,
    pub interval: Duration,
}

impl TimeWheelConfig {
    pub fn check(&self) -> Result<()> {
        if self.speed <= 0.0 {
            return InvalidConfigurationSnafu {
                msg: "speed must be positive".to_string(),
            }
            .fail();
        }
        if self.begin_ms == 0 || self.end_ms == 0 {
            return InvalidConfigurationSnafu {
                msg: "begin and end must be set".to_string(),
            }
            .fail();
        }
        Ok(())
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

struct Pace {
    offset_ms: i64,
    next_stop_ms: i64,
}

fn advance(pace: &Mutex<Pace>, interval_ms: i64, speed: f32) {
    let mut p = pace.lock().expect("time wheel pace lock poisoned");
    p.offset_ms += (interval_ms as f64 * (speed as f64 - 1.0)) as i64;
    p.next_stop_ms = now_ms() + p.offset_ms + (interval_ms as f64 * speed as f64) as i64;
}

async fn wheeling(pace: Arc<Mutex<Pace>>, interval: Duration, speed: f32, mut stop: oneshot::Receiver<()>) {
    let interval_ms = interval.as_millis() as i64;
    advance(&pace, interval_ms, speed);
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => advance(&pace, interval_ms, speed),
            _ = &mut stop => break,
        }
    }
}

/// Runs the time wheel to completion: consumes `input` until it closes or a
/// record past `end_ms` is seen (Finished), releasing each accepted record
/// to `output` no earlier than its paced wall-clock deadline, and reporting
/// its terminal state via `notify`.
pub async fn run(
    config: TimeWheelConfig,
    mut input: mpsc::Receiver<LogRecord>,
    output: mpsc::Sender<LogRecord>,
    notify: mpsc::Sender<SubTaskEvent>,
) -> Result<()> {
    config.check()?;

    let pace = Arc::new(Mutex::new(Pace {
        offset_ms: 0,
        next_stop_ms: now_ms(),
    }));
    let mut delta_ms: Option<i64> = None;
    let mut wheeling_stop: Option<oneshot::Sender<()>> = None;
    let mut terminal_status = TaskStatus::Finished;

    while let Some(record) = input.recv().await {
        if record.occur_at_ms < config.begin_ms {
            continue;
        }
        if record.occur_at_ms > config.end_ms {
            terminal_status = TaskStatus::Finished;
            break;
        }

        if delta_ms.is_none() {
            delta_ms = Some(now_ms() - record.occur_at_ms);
            let (tx, rx) = oneshot::channel();
            wheeling_stop = Some(tx);
            tokio::spawn(wheeling(pace.clone(), config.interval, config.speed, rx));
        }
        let target_ms = record.occur_at_ms + delta_ms.expect("delta set above");

        loop {
            let next_stop_ms = pace.lock().expect("time wheel pace lock poisoned").next_stop_ms;
            if next_stop_ms >= target_ms {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        if output.send(record).await.is_err() {
            terminal_status = TaskStatus::Stopped;
            break;
        }
    }

    if let Some(stop) = wheeling_stop {
        let _ = stop.send(());
    }
    let _ = notify
        .send(SubTaskEvent {
            from: SubTaskKind::TimeWheel,
            status: terminal_status,
        })
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use havok_types::LogRecord;

    #[tokio::test]
    async fn drops_records_before_begin_and_finishes_after_end() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (notify_tx, mut notify_rx) = mpsc::channel(8);

        let now = now_ms();
        let config = TimeWheelConfig {
            begin_ms: now,
            end_ms: now + 100,
            speed: 100.0, // fast-forward for the test
            interval: Duration::from_millis(5),
        };

        let handle = tokio::spawn(run(config, in_rx, out_tx, notify_tx));

        in_tx.send(LogRecord::new("/x", "GET", now - 1000)).await.unwrap(); // before begin, dropped
        in_tx.send(LogRecord::new("/x", "GET", now + 10)).await.unwrap();
        in_tx.send(LogRecord::new("/x", "GET", now + 1000)).await.unwrap(); // after end, triggers finish
        drop(in_tx);

        let mut received = 0;
        while let Some(_r) = out_rx.recv().await {
            received += 1;
        }
        assert_eq!(received, 1);

        let event = notify_rx.recv().await.unwrap();
        assert_eq!(event.status, TaskStatus::Finished);
        handle.await.unwrap().unwrap();
    }

    #[test]
    fn rejects_non_positive_speed() {
        let config = TimeWheelConfig {
            begin_ms: 1,
            end_ms: 2,
            speed: 0.0,
            interval: DEFAULT_INTERVAL,
        };
        assert!(config.check().is_err());
    }
}
