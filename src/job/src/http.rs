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

//! The job's HTTP control surface: `/api/job/*`, `/api/havok/qps`,
//! `/api/reporter/last_report`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use havok::HavokService;
use havok_types::{FeatureConfig, JobConfiguration};
use serde_json::json;

use crate::state::Job;

#[derive(Clone)]
pub struct AppState {
    pub job: Arc<Job>,
    pub havok: Arc<HavokService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/job/start", post(start))
        .route("/api/job/description", get(description))
        .route("/api/job/shake", post(shake))
        .route("/api/job/strike", post(strike))
        .route("/api/havok/qps", get(qps))
        .route("/api/reporter/last_report", get(last_report))
        .with_state(state)
}

fn error_body(msg: impl std::fmt::Display) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"code": 500, "err_msg": msg.to_string()})),
    )
}

async fn start(
    State(state): State<AppState>,
    body: Option<Json<JobConfiguration>>,
) -> impl IntoResponse {
    let patch = body.map(|Json(c)| c);
    match state.job.start(patch) {
        Ok(()) => (StatusCode::OK, Json(json!({"code": 0}))).into_response(),
        Err(e) => error_body(e).into_response(),
    }
}

async fn description(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"code": 0, "data": state.job.description()}))
}

async fn shake(State(state): State<AppState>, Json(patch): Json<FeatureConfig>) -> impl IntoResponse {
    state.job.set_shake(patch);
    Json(json!({"code": 0}))
}

async fn strike(State(state): State<AppState>, Json(patch): Json<FeatureConfig>) -> impl IntoResponse {
    state.job.set_strike(patch);
    Json(json!({"code": 0}))
}

async fn qps(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"code": 0, "qps": state.havok.sample_and_reset_qps()}))
}

async fn last_report(State(state): State<AppState>) -> impl IntoResponse {
    let reporter = state.havok.reporter();
    let batch = reporter.last_completed_batch();
    match reporter.last_report() {
        Some(report) => {
            Json(json!({"code": 0, "batch": batch, "data": report_to_json(&report)})).into_response()
        }
        None => Json(json!({"code": 0, "batch": batch, "data": null})).into_response(),
    }
}

fn report_to_json(report: &havok_types::Report) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (api, row) in report {
        map.insert(
            api.clone(),
            json!({
                "requests": row.requests,
                "failures": row.failures,
                "current_qps": row.current_qps,
                "total_qps": row.total_qps,
                "min_ms": row.min_ms,
                "max_ms": row.max_ms,
                "average_ms": row.average_ms,
                "percentiles": row.percentiles,
            }),
        );
    }
    serde_json::Value::Object(map)
}
