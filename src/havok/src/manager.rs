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

//! The registry of currently-subscribed replayers and their outbound event
//! inboxes.

use std::collections::HashMap;
use std::sync::RwLock;

use havok_proto::DispatcherEvent;
use snafu::{Backtrace, Snafu};
use tokio::sync::mpsc;

/// Per-replayer inbox capacity.
pub const INBOX_CAPACITY: usize = 20;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("replayer id must not be empty"))]
    EmptyId { backtrace: Backtrace },
    #[snafu(display("replayer '{}' is already subscribed", id))]
    Duplicate { id: String, backtrace: Backtrace },
}

macros::define_result!(Error);

#[derive(Default)]
pub struct ReplayerManager {
    replayers: RwLock<HashMap<String, mpsc::Sender<DispatcherEvent>>>,
}

impl ReplayerManager {
    pub fn new() -> Self {
        ReplayerManager::default()
    }

    /// Registers a new replayer and returns the receiving half of its
    /// inbox. Rejects an empty or already-registered id.
    pub fn try_register(&self, id: &str) -> Result<mpsc::Receiver<DispatcherEvent>> {
        if id.is_empty() {
            return EmptyIdSnafu.fail();
        }
        let mut replayers = self.replayers.write().expect("replayer registry lock poisoned");
        if replayers.contains_key(id) {
            return DuplicateSnafu { id: id.to_string() }.fail();
        }
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        replayers.insert(id.to_string(), tx);
        Ok(rx)
    }

    pub fn remove(&self, id: &str) {
        self.replayers
            .write()
            .expect("replayer registry lock poisoned")
            .remove(id);
    }

    /// Best-effort, non-blocking delivery. Returns `false` if the replayer
    /// is unknown, its inbox is full, or it has disconnected.
    pub fn deliver(&self, id: &str, event: DispatcherEvent) -> bool {
        let replayers = self.replayers.read().expect("replayer registry lock poisoned");
        match replayers.get(id) {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    pub fn broadcast(&self, event: DispatcherEvent) {
        let replayers = self.replayers.read().expect("replayer registry lock poisoned");
        for (id, tx) in replayers.iter() {
            if tx.try_send(event.clone()).is_err() {
                logger::warn!("failed to deliver broadcast event"; "replayer_id" => id.clone());
            }
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.replayers
            .read()
            .expect("replayer registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.replayers.read().expect("replayer registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping() -> DispatcherEvent {
        DispatcherEvent {
            event: Some(havok_proto::dispatcher_event::Event::Ping(
                havok_proto::Ping {},
            )),
        }
    }

    #[test]
    fn rejects_empty_and_duplicate_ids() {
        let manager = ReplayerManager::new();
        assert!(manager.try_register("").is_err());
        manager.try_register("r1").unwrap();
        assert!(manager.try_register("r1").is_err());
    }

    #[tokio::test]
    async fn deliver_reaches_the_registered_inbox() {
        let manager = ReplayerManager::new();
        let mut rx = manager.try_register("r1").unwrap();
        assert!(manager.deliver("r1", ping()));
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.event,
            Some(havok_proto::dispatcher_event::Event::Ping(_))
        ));
    }

    #[test]
    fn deliver_to_unknown_id_is_false() {
        let manager = ReplayerManager::new();
        assert!(!manager.deliver("ghost", ping()));
    }
}
