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

//! Drains requested batch ids and reports a stats snapshot for each back to
//! the dispatcher, the way the original's `submitter`/`reportorPipeline`
//! pair does, collapsed into a single loop since `tonic`'s client needs no
//! separate outbound channel to serialize sends.

use std::sync::Arc;

use havok_proto::havok_client::HavokClient;
use havok_types::SummaryStats;
use replayer_core::ReplayerEngine;
use tokio::sync::mpsc;
use tonic::transport::Channel;

use crate::build_report;

/// Runs until `batches` closes (the subscribe loop ended). Reporting
/// failures are logged and skipped; a single dropped batch does not stop
/// the loop.
pub async fn run_submitter(
    mut client: HavokClient<Channel>,
    replayer_id: String,
    mut batches: mpsc::Receiver<i32>,
    stats: Arc<SummaryStats>,
    engine: Arc<ReplayerEngine>,
) {
    while let Some(batch_id) = batches.recv().await {
        let report = build_report(&replayer_id, batch_id, &stats, &engine);
        if let Err(e) = client.report(report).await {
            logger::warn!("failed to submit stats report"; "batch_id" => batch_id, "error" => e.to_string());
        }
    }
}
