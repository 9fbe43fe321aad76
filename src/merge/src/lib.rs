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

//! A k-way time-ordered merge over any number of sub-fetchers, without
//! buffering whole streams: each sub-fetcher feeds its own channel, and the
//! merge keeps only one "head" record per still-open channel at a time.

use std::collections::HashMap;

use async_trait::async_trait;
use havok_types::LogRecord;
use snafu::{Backtrace, Snafu};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("source '{}' failed: {}", name, msg))]
    Source {
        name: String,
        msg: String,
        backtrace: Backtrace,
    },
    #[snafu(display("no fetcher registered under name '{}'", name))]
    UnknownFetcher { name: String, backtrace: Backtrace },
}

macros::define_result!(Error);

/// A source adapter producing a locally time-ordered stream of
/// [`LogRecord`]. Concrete adapters (file, Kafka, object-store log
/// exporters, ...) live outside this crate; this trait is the extension
/// point they implement against.
#[async_trait]
pub trait Fetcher: Send {
    fn name(&self) -> &str;

    /// Streams records into `out` until the source is exhausted or `cancel`
    /// fires. Implementations must keep `out`'s receiver non-decreasing in
    /// `occur_at_ms`.
    async fn fetch(&mut self, cancel: CancellationToken, out: mpsc::Sender<LogRecord>)
        -> Result<()>;
}

pub type FetcherFactory = fn() -> Box<dyn Fetcher>;

/// A static registry standing in for the original's dynamic plugin loader:
/// concrete adapters register a constructor under a name, and the
/// composition root looks one up by the configured fetcher type.
#[derive(Default)]
pub struct FetcherRegistry {
    factories: HashMap<&'static str, FetcherFactory>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        FetcherRegistry::default()
    }

    pub fn register(&mut self, name: &'static str, factory: FetcherFactory) {
        self.factories.insert(name, factory);
    }

    pub fn build(&self, name: &str) -> Result<Box<dyn Fetcher>> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| Error::UnknownFetcher {
                name: name.to_string(),
                backtrace: Backtrace::generate(),
            })
    }
}

/// An in-memory fetcher that replays a fixed, pre-sorted vector of records.
/// Used by tests and as a minimal standalone source; not a production
/// adapter.
pub struct VecFetcher {
    name: String,
    records: Vec<LogRecord>,
}

impl VecFetcher {
    pub fn new(name: impl Into<String>, records: Vec<LogRecord>) -> Self {
        VecFetcher {
            name: name.into(),
            records,
        }
    }
}

#[async_trait]
impl Fetcher for VecFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &mut self,
        cancel: CancellationToken,
        out: mpsc::Sender<LogRecord>,
    ) -> Result<()> {
        for record in self.records.drain(..) {
            if cancel.is_cancelled() {
                break;
            }
            if out.send(record).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

struct Head {
    record: LogRecord,
    source: usize,
}

/// Merges `sources` (each already streaming into its own channel) into
/// `out`, preserving non-decreasing `occur_at_ms` order across all sources.
/// A linear-scan sorted list is used; callers merging eight or more sources
/// concurrently should prefer a binary-heap variant instead.
pub async fn merge_k_way(
    mut sources: Vec<mpsc::Receiver<LogRecord>>,
    out: mpsc::Sender<LogRecord>,
    cancel: CancellationToken,
) {
    let mut heads: Vec<Head> = Vec::new();
    for (idx, rx) in sources.iter_mut().enumerate() {
        if let Some(record) = rx.recv().await {
            insert_sorted(&mut heads, Head { record, source: idx });
        }
    }

    while !heads.is_empty() {
        if cancel.is_cancelled() {
            break;
        }
        let head = heads.remove(0);
        let source = head.source;
        if out.send(head.record).await.is_err() {
            break;
        }
        if let Some(next) = sources[source].recv().await {
            insert_sorted(&mut heads, Head { record: next, source });
        }
    }
}

fn insert_sorted(heads: &mut Vec<Head>, head: Head) {
    let pos = heads
        .iter()
        .position(|h| h.record.occur_at_ms > head.record.occur_at_ms)
        .unwrap_or(heads.len());
    heads.insert(pos, head);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(t: i64) -> LogRecord {
        LogRecord::new("/x", "GET", t)
    }

    #[tokio::test]
    async fn merges_multiple_sorted_streams_into_one() {
        let (tx1, rx1) = mpsc::channel(8);
        let (tx2, rx2) = mpsc::channel(8);
        let (tx3, rx3) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(32);

        for t in [1, 4, 7] {
            tx1.send(rec(t)).await.unwrap();
        }
        for t in [2, 3, 9] {
            tx2.send(rec(t)).await.unwrap();
        }
        for t in [5, 6, 8] {
            tx3.send(rec(t)).await.unwrap();
        }
        drop(tx1);
        drop(tx2);
        drop(tx3);

        let cancel = CancellationToken::new();
        merge_k_way(vec![rx1, rx2, rx3], out_tx, cancel).await;

        let mut seen = Vec::new();
        while let Some(r) = out_rx.recv().await {
            seen.push(r.occur_at_ms);
        }
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
        assert_eq!(seen.len(), 9);
    }

    #[tokio::test]
    async fn empty_source_contributes_nothing() {
        let (_tx, rx1) = mpsc::channel::<LogRecord>(1);
        let (tx2, rx2) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(32);

        tx2.send(rec(1)).await.unwrap();
        drop(tx2);
        drop(_tx);

        merge_k_way(vec![rx1, rx2], out_tx, CancellationToken::new()).await;
        let mut count = 0;
        while out_rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }
}
