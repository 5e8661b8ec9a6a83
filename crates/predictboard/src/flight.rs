// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use dashmap::DashSet;

/// At most one in-flight operation per key. Requests arriving while one is running are
/// refused rather than queued.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    in_flight: Arc<DashSet<String>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if another caller holds it.
    pub fn try_acquire(&self, key: &str) -> Option<FlightGuard> {
        if self.in_flight.insert(key.to_string()) {
            Some(FlightGuard { in_flight: self.in_flight.clone(), key: key.to_string() })
        } else {
            None
        }
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }
}

/// Releases its key on drop, including when the holding future is cancelled.
#[derive(Debug)]
pub struct FlightGuard {
    in_flight: Arc<DashSet<String>>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}
