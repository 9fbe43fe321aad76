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

//! A middleware chain wrapping a terminal HTTP handler, the same shape as
//! the original's `func(next Handler) Handler`: each middleware is given the
//! already-wrapped remainder of the chain and decides whether, and how, to
//! call into it.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use havok_types::LogRecord;

/// What went into the wire request, after any middleware rewriting.
#[derive(Clone, Debug)]
pub struct Payload {
    pub method: String,
    pub url: String,
    pub header: std::collections::HashMap<String, String>,
    pub body: bytes::Bytes,
}

impl From<&LogRecord> for Payload {
    fn from(record: &LogRecord) -> Self {
        Payload {
            method: record.method.clone(),
            url: record.url.clone(),
            header: record.header.clone(),
            body: record.body.clone(),
        }
    }
}

/// The outcome the terminal handler (or a short-circuiting middleware)
/// produces: an HTTP status, or a transport-level failure.
#[derive(Clone, Debug)]
pub struct HandlerOutcome {
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl HandlerOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || matches!(self.status, Some(s) if s >= 400)
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, payload: &Payload) -> HandlerOutcome;
}

pub type Next = Arc<dyn Handler>;

#[async_trait]
impl Handler for Next {
    async fn handle(&self, payload: &Payload) -> HandlerOutcome {
        (**self).handle(payload).await
    }
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, payload: &Payload, next: Next) -> HandlerOutcome;
}

struct Wrapped {
    middleware: Arc<dyn Middleware>,
    next: Next,
}

#[async_trait]
impl Handler for Wrapped {
    async fn handle(&self, payload: &Payload) -> HandlerOutcome {
        self.middleware.handle(payload, self.next.clone()).await
    }
}

/// Builds the handler chain, last-registered middleware wrapping first
/// (i.e. it runs outermost), terminating in `terminal`.
pub fn chain(middlewares: &[Arc<dyn Middleware>], terminal: Next) -> Next {
    middlewares.iter().rev().fold(terminal, |next, mw| {
        Arc::new(Wrapped {
            middleware: mw.clone(),
            next,
        }) as Next
    })
}

/// Wraps a handler chain and reports how long it took, the way
/// `TimerMiddleware` times the send in the original. `ReplayerEngine::run`
/// wraps the built chain in this rather than timing it inline.
pub struct Timed<H> {
    pub inner: H,
}

impl<H> Timed<H> {
    pub async fn handle_timed(&self, payload: &Payload) -> (HandlerOutcome, i64)
    where
        H: Handler,
    {
        let start = Instant::now();
        let outcome = self.inner.handle(payload).await;
        (outcome, start.elapsed().as_millis() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SleepyHandler;

    #[async_trait]
    impl Handler for SleepyHandler {
        async fn handle(&self, _payload: &Payload) -> HandlerOutcome {
            tokio::time::sleep(std::time::Duration::from_millis(15)).await;
            HandlerOutcome {
                status: Some(200),
                error: None,
            }
        }
    }

    fn payload() -> Payload {
        Payload {
            method: "GET".to_string(),
            url: "http://example.com".to_string(),
            header: std::collections::HashMap::new(),
            body: bytes::Bytes::new(),
        }
    }

    #[tokio::test]
    async fn handle_timed_reports_elapsed_time_alongside_the_outcome() {
        let timed = Timed {
            inner: SleepyHandler,
        };
        let (outcome, duration_ms) = timed.handle_timed(&payload()).await;
        assert_eq!(outcome.status, Some(200));
        assert!(duration_ms >= 15, "expected at least 15ms, got {duration_ms}");
    }
}
