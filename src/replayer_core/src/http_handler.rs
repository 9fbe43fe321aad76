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

//! The terminal handler: issues the replayed request over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use snafu::{Backtrace, ResultExt, Snafu};

use crate::middleware::{Handler, HandlerOutcome, Payload};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to build http client: {}", source))]
    Build {
        source: reqwest::Error,
        backtrace: Backtrace,
    },
}

macros::define_result!(Error);

#[derive(Clone, Copy, Debug)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Whether idle connections are pooled for reuse across sends. The
    /// original exposes this as a single `-keepAlive` flag on the replayer
    /// binary rather than per-connection tuning.
    pub keep_alive: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        HttpClientConfig {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            keep_alive: false,
        }
    }
}

impl HttpClientConfig {
    pub fn build(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout);
        if !self.keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }
        builder.build().context(BuildSnafu)
    }
}

pub struct ReqwestHandler {
    client: reqwest::Client,
}

impl ReqwestHandler {
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestHandler { client }
    }
}

fn to_header_map(header: &std::collections::HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(header.len() + 1);
    for (k, v) in header {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(k.as_bytes()),
            HeaderValue::from_str(v),
        ) {
            map.insert(name, value);
        }
    }
    if !map.contains_key(USER_AGENT) {
        map.insert(USER_AGENT, HeaderValue::from_static("havok-replayer"));
    }
    map
}

#[async_trait]
impl Handler for ReqwestHandler {
    async fn handle(&self, payload: &Payload) -> HandlerOutcome {
        let method = match payload.method.parse::<reqwest::Method>() {
            Ok(m) => m,
            Err(e) => {
                return HandlerOutcome {
                    status: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let result = self
            .client
            .request(method, &payload.url)
            .headers(to_header_map(&payload.header))
            .body(payload.body.clone())
            .send()
            .await;

        match result {
            Ok(resp) => HandlerOutcome {
                status: Some(resp.status().as_u16()),
                error: None,
            },
            Err(e) => HandlerOutcome {
                status: None,
                error: Some(e.to_string()),
            },
        }
    }
}
