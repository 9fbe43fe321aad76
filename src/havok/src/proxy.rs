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

//! The hash ring: maps a record's `hash_field` onto one of the currently
//! subscribed replayers.

use std::sync::RwLock;

use crate::hash::{HashFn, RoundRobin};

/// Routes records to replayer ids by hash. On removal the ring is
/// re-compacted: remaining ids keep their relative order but shift down to
/// fill the gap, so `index = hash(key) % count` stays valid. This means a
/// removal changes routing for every record, not just the removed
/// replayer's share — preserved verbatim as a documented property of the
/// deployment model (replayers are stateless).
pub struct ReplayerProxy {
    backends: RwLock<Vec<String>>,
    hash: HashFn,
    round_robin: RoundRobin,
}

impl ReplayerProxy {
    pub fn new(hash: HashFn) -> Self {
        ReplayerProxy {
            backends: RwLock::new(Vec::new()),
            hash,
            round_robin: RoundRobin::default(),
        }
    }

    pub fn register(&self, id: &str) {
        let mut backends = self.backends.write().expect("proxy ring lock poisoned");
        if !backends.iter().any(|b| b == id) {
            backends.push(id.to_string());
        }
    }

    /// Removes `id` from the ring, re-indexing everything after it.
    pub fn remove(&self, id: &str) {
        let mut backends = self.backends.write().expect("proxy ring lock poisoned");
        if let Some(pos) = backends.iter().position(|b| b == id) {
            backends.remove(pos);
        }
    }

    /// Picks the replayer id this `hash_field` routes to, or `None` if no
    /// replayer is currently subscribed. An empty `hash_field` falls back to
    /// round robin instead of every such record hashing to the same slot.
    pub fn forward(&self, hash_field: &str) -> Option<String> {
        let backends = self.backends.read().expect("proxy ring lock poisoned");
        if backends.is_empty() {
            return None;
        }
        let key = if hash_field.is_empty() {
            self.round_robin.hash(hash_field)
        } else {
            (self.hash)(hash_field)
        };
        let idx = key as usize % backends.len();
        Some(backends[idx].clone())
    }

    pub fn count(&self) -> usize {
        self.backends.read().expect("proxy ring lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::default_hash_fn;

    #[test]
    fn forward_is_deterministic_for_a_fixed_ring() {
        let proxy = ReplayerProxy::new(default_hash_fn());
        proxy.register("r1");
        proxy.register("r2");
        proxy.register("r3");

        let first = proxy.forward("tenant-42");
        let second = proxy.forward("tenant-42");
        assert_eq!(first, second);
    }

    #[test]
    fn empty_ring_forwards_nothing() {
        let proxy = ReplayerProxy::new(default_hash_fn());
        assert_eq!(proxy.forward("x"), None);
    }

    #[test]
    fn empty_hash_field_falls_back_to_round_robin() {
        let proxy = ReplayerProxy::new(default_hash_fn());
        proxy.register("r1");
        proxy.register("r2");

        let first = proxy.forward("").expect("ring is non-empty");
        let second = proxy.forward("").expect("ring is non-empty");
        assert_ne!(first, second);
    }

    #[test]
    fn removal_recompacts_and_changes_routing_domain() {
        let proxy = ReplayerProxy::new(default_hash_fn());
        proxy.register("r1");
        proxy.register("r2");
        assert_eq!(proxy.count(), 2);
        proxy.remove("r1");
        assert_eq!(proxy.count(), 1);
        assert_eq!(proxy.forward("anything"), Some("r2".to_string()));
    }
}
