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

use std::collections::HashMap;

use bytes::Bytes;

/// A single historical request, enriched with the routing key (`hash_field`)
/// used by the proxy's hash fan-out. Immutable once decoded; middlewares
/// that need to mutate headers clone first.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub url: String,
    pub method: String,
    pub header: HashMap<String, String>,
    pub body: Bytes,
    /// Milliseconds since the Unix epoch, UTC.
    pub occur_at_ms: i64,
    pub hash_field: String,
}

impl LogRecord {
    pub fn new(url: impl Into<String>, method: impl Into<String>, occur_at_ms: i64) -> Self {
        LogRecord {
            url: url.into(),
            method: method.into(),
            header: HashMap::new(),
            body: Bytes::new(),
            occur_at_ms,
            hash_field: String::new(),
        }
    }

    pub fn with_hash_field(mut self, hash_field: impl Into<String>) -> Self {
        self.hash_field = hash_field.into();
        self
    }

    /// `true` if `begin <= occur_at <= end`.
    pub fn within_window(&self, begin_ms: i64, end_ms: i64) -> bool {
        self.occur_at_ms >= begin_ms && self.occur_at_ms <= end_ms
    }
}

impl From<LogRecord> for havok_proto::LogRecord {
    fn from(r: LogRecord) -> Self {
        havok_proto::LogRecord {
            url: r.url,
            method: r.method,
            header: r.header,
            body: r.body.to_vec(),
            occur_at_ms: r.occur_at_ms,
            hash_field: r.hash_field,
        }
    }
}

impl From<havok_proto::LogRecord> for LogRecord {
    fn from(r: havok_proto::LogRecord) -> Self {
        LogRecord {
            url: r.url,
            method: r.method,
            header: r.header,
            body: Bytes::from(r.body),
            occur_at_ms: r.occur_at_ms,
            hash_field: r.hash_field,
        }
    }
}
