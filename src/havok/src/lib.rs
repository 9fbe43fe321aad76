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

//! The dispatcher's core: the gRPC `Havok` service, the replayer registry,
//! the hash-based fan-out proxy, and the stats reporter.

pub mod hash;
pub mod manager;
pub mod proxy;
pub mod report_handlers;
pub mod reporter;
pub mod service;

pub use hash::{default_hash_fn, fnv1a_32, HashFn, RoundRobin};
pub use manager::ReplayerManager;
pub use proxy::ReplayerProxy;
pub use report_handlers::{ConsoleReportHandler, LogReportHandler};
pub use reporter::{ReportHandler, Reporter};
pub use service::HavokService;
