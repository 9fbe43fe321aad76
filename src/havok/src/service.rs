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

//! The gRPC-facing half of the dispatcher: accepts `Subscribe` streams,
//! forwards records chosen by the proxy, and relays stats reports to the
//! reporter.

use std::pin::Pin;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use havok_proto::{
    dispatcher_event::Event, havok_server::Havok, DispatcherEvent, Disconnected, Ping,
    ReportReturn, StatsReport, SubscribeRequest, Subscribed,
};
use havok_types::{LogRecord, SummaryStats};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::manager::ReplayerManager;
use crate::proxy::ReplayerProxy;
use crate::reporter::Reporter;

pub struct HavokService {
    manager: Arc<ReplayerManager>,
    proxy: Arc<ReplayerProxy>,
    reporter: Arc<Reporter>,
    sent: AtomicI64,
}

impl HavokService {
    pub fn new(manager: Arc<ReplayerManager>, proxy: Arc<ReplayerProxy>, reporter: Arc<Reporter>) -> Arc<Self> {
        Arc::new(HavokService {
            manager,
            proxy,
            reporter,
            sent: AtomicI64::new(0),
        })
    }

    /// Routes one record to its hashed replayer. Drops and logs a warning
    /// when no replayer is subscribed.
    pub fn send(&self, record: LogRecord) {
        match self.proxy.forward(&record.hash_field) {
            Some(id) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                let event = DispatcherEvent {
                    event: Some(Event::LogRecord(record.into())),
                };
                if !self.manager.deliver(&id, event) {
                    logger::warn!("dropping record, replayer inbox unavailable"; "replayer_id" => id);
                }
            }
            None => {
                logger::warn!("dropping record, no replayer subscribed");
            }
        }
    }

    pub fn broadcast(&self, event: DispatcherEvent) {
        self.manager.broadcast(event);
    }

    pub async fn disconnect_replayer(&self, id: &str) {
        self.manager.deliver(
            id,
            DispatcherEvent {
                event: Some(Event::Disconnected(Disconnected {})),
            },
        );
        self.proxy.remove(id);
        self.manager.remove(id);
    }

    pub fn spawn_keep_alive(self: &Arc<Self>, interval: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                this.broadcast(DispatcherEvent {
                    event: Some(Event::Ping(Ping {})),
                });
            }
        });
    }

    /// Records sent in the last second, sampled by the caller once per
    /// second (matches the original's QPS counter loop).
    pub fn sample_and_reset_qps(&self) -> i64 {
        self.sent.swap(0, Ordering::Relaxed)
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }
}

/// Wraps the per-replayer receiver stream so that, whenever it ends for any
/// reason (client disconnect, server shutdown, send error), the replayer is
/// removed from both the registry and the proxy ring exactly once.
struct SubscriptionStream {
    inner: ReceiverStream<DispatcherEvent>,
    manager: Arc<ReplayerManager>,
    proxy: Arc<ReplayerProxy>,
    id: String,
}

impl Stream for SubscriptionStream {
    type Item = Result<DispatcherEvent, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|opt| opt.map(Ok))
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.manager.remove(&self.id);
        self.proxy.remove(&self.id);
    }
}

#[tonic::async_trait]
impl Havok for HavokService {
    type SubscribeStream = Pin<Box<dyn Stream<Item = Result<DispatcherEvent, Status>> + Send>>;

    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let id = request.into_inner().replayer_id;
        let rx = self
            .manager
            .try_register(&id)
            .map_err(|e| Status::already_exists(e.to_string()))?;
        self.proxy.register(&id);
        self.manager.deliver(
            &id,
            DispatcherEvent {
                event: Some(Event::Subscribed(Subscribed {})),
            },
        );

        let stream = SubscriptionStream {
            inner: ReceiverStream::new(rx),
            manager: self.manager.clone(),
            proxy: self.proxy.clone(),
            id,
        };
        Ok(Response::new(Box::pin(stream)))
    }

    async fn report(&self, request: Request<StatsReport>) -> Result<Response<ReportReturn>, Status> {
        let req = request.into_inner();
        let summary = SummaryStats::from_wrappers(&req.stats);
        self.reporter
            .collect(req.batch_id, summary, req.performance_stats, &req.replayer_id)
            .await;
        Ok(Response::new(ReportReturn { ok: true }))
    }
}
