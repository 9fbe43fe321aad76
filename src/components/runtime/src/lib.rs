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

//! Named, sized `tokio` runtimes, built once at process startup instead of
//! relying on a single ambient `#[tokio::main]` executor.

use std::sync::Arc;

use snafu::{Backtrace, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to build tokio runtime '{}', err:{}", name, source))]
    Build {
        name: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

macros::define_result!(Error);

pub type RuntimeRef = Arc<tokio::runtime::Runtime>;

#[derive(Clone, Debug)]
pub struct Builder {
    name: String,
    worker_threads: usize,
    stack_size: Option<usize>,
}

impl Builder {
    pub fn new(name: impl Into<String>) -> Self {
        Builder {
            name: name.into(),
            worker_threads: 2,
            stack_size: None,
        }
    }

    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn build(self) -> Result<RuntimeRef> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder
            .worker_threads(self.worker_threads)
            .thread_name(self.name.clone())
            .enable_all();
        if let Some(size) = self.stack_size {
            builder.thread_stack_size(size);
        }
        let rt = builder.build().context(BuildSnafu {
            name: self.name.clone(),
        })?;
        Ok(Arc::new(rt))
    }
}

/// The set of runtimes a dispatcher or replayer process needs: one for
/// network I/O (gRPC/HTTP serving), one for outbound sends, one for the
/// periodic reporter loop.
#[derive(Clone)]
pub struct EngineRuntimes {
    pub net_runtime: RuntimeRef,
    pub send_runtime: RuntimeRef,
    pub report_runtime: RuntimeRef,
}

pub fn build_engine_runtimes(net_threads: usize, send_threads: usize) -> Result<EngineRuntimes> {
    Ok(EngineRuntimes {
        net_runtime: Builder::new("havok-net").worker_threads(net_threads).build()?,
        send_runtime: Builder::new("havok-send")
            .worker_threads(send_threads)
            .build()?,
        report_runtime: Builder::new("havok-report").worker_threads(1).build()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_runtime() {
        let rt = Builder::new("test-rt").worker_threads(1).build().unwrap();
        rt.block_on(async { assert_eq!(1 + 1, 2) });
    }
}
