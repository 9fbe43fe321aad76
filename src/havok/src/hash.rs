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

//! Hash functions used by the replayer proxy to choose a fan-out target.

use std::sync::{atomic::{AtomicU32, Ordering}, Arc};

pub type HashFn = Arc<dyn Fn(&str) -> u32 + Send + Sync>;

/// FNV-1a, 32-bit. The default hash: deterministic, cheap, good enough
/// spread for routing keys like tenant or session ids.
pub fn fnv1a_32(s: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub fn default_hash_fn() -> HashFn {
    Arc::new(fnv1a_32)
}

/// Pure round-robin, ignoring the input entirely: the fallback used when a
/// record carries no `hash_field`.
#[derive(Default)]
pub struct RoundRobin {
    counter: AtomicU32,
}

impl RoundRobin {
    pub fn hash(&self, _s: &str) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn into_hash_fn(self: Arc<Self>) -> HashFn {
        Arc::new(move |s: &str| self.hash(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_is_deterministic() {
        assert_eq!(fnv1a_32("tenant-1"), fnv1a_32("tenant-1"));
        assert_ne!(fnv1a_32("tenant-1"), fnv1a_32("tenant-2"));
    }

    #[test]
    fn round_robin_increments() {
        let rr = RoundRobin::default();
        let a = rr.hash("x");
        let b = rr.hash("x");
        assert_eq!(b, a + 1);
    }
}
