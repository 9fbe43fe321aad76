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

//! The replayer worker's core execution engine: the rate-multiplying,
//! concurrency-capped, middleware-chained HTTP send loop, decoupled from
//! how records and control events arrive (that's `inspector`'s job).

pub mod engine;
pub mod http_handler;
pub mod middleware;

pub use engine::{ApiNameSelector, ReplayerEngine};
pub use http_handler::{HttpClientConfig, ReqwestHandler};
pub use middleware::{chain, Handler, HandlerOutcome, Middleware, Payload};
