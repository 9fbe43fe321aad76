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

//! Domain types shared by the dispatcher and replayer: the record and job
//! configuration shapes, and the stats model used for reporting.

pub mod config;
pub mod record;
pub mod stats;
pub mod task;

pub use config::{Feature, FeatureConfig, JobConfiguration};
pub use record::LogRecord;
pub use stats::{AttackerReport, AttackerStats, Outcome, Report, SummaryStats};
pub use task::{SubTaskEvent, SubTaskKind, TaskStatus};

use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid job configuration: {}", msg))]
    InvalidConfiguration { msg: String, backtrace: Backtrace },
}

macros::define_result!(Error);
