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

//! Thin `Havok` trait delegation so the gRPC server can own an `Arc` to the
//! same [`HavokService`] the HTTP control surface and job state machine
//! share, instead of `tonic` wrapping a second one internally.

use std::sync::Arc;

use havok::HavokService;
use havok_proto::havok_server::Havok;
use havok_proto::{ReportReturn, StatsReport, SubscribeRequest};
use tonic::{Request, Response, Status};

pub struct GrpcHavok(pub Arc<HavokService>);

#[tonic::async_trait]
impl Havok for GrpcHavok {
    type SubscribeStream = <HavokService as Havok>::SubscribeStream;

    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        self.0.subscribe(request).await
    }

    async fn report(&self, request: Request<StatsReport>) -> Result<Response<ReportReturn>, Status> {
        self.0.report(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use havok::{default_hash_fn, ReplayerManager, ReplayerProxy, Reporter};
    use std::time::Duration;

    fn test_service() -> Arc<HavokService> {
        let manager = Arc::new(ReplayerManager::new());
        let proxy = Arc::new(ReplayerProxy::new(default_hash_fn()));
        let reporter = Reporter::new(manager.clone(), Duration::from_secs(5), Duration::from_secs(3), vec![]);
        HavokService::new(manager, proxy, reporter)
    }

    #[tokio::test]
    async fn subscribe_delegates_to_the_shared_service() {
        let service = test_service();
        let wrapper = GrpcHavok(service.clone());

        let _response = wrapper
            .subscribe(Request::new(SubscribeRequest {
                replayer_id: "r1".to_string(),
            }))
            .await
            .expect("subscribe should succeed");

        // The same underlying service registered the subscription, so a
        // second attempt through the wrapper under the same id conflicts
        // exactly as it would calling the service directly, as long as the
        // first stream is still alive.
        let second = wrapper
            .subscribe(Request::new(SubscribeRequest {
                replayer_id: "r1".to_string(),
            }))
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn report_delegates_to_the_shared_service() {
        let service = test_service();
        let wrapper = GrpcHavok(service);

        let response = wrapper
            .report(Request::new(StatsReport {
                replayer_id: "r1".to_string(),
                report_time_ms: 0,
                batch_id: 0,
                stats: vec![],
                performance_stats: Default::default(),
            }))
            .await
            .expect("report should succeed");
        assert!(response.into_inner().ok);
    }
}
