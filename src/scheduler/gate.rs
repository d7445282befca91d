// At most one check cycle per host: entering returns a guard, dropping it leaves the gate.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct InFlightGate {
    hosts: Arc<Mutex<HashSet<String>>>,
}

impl InFlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.hosts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `None` when a cycle for `host` is already running.
    pub fn try_enter(&self, host: &str) -> Option<InFlightGuard> {
        if self.lock().insert(host.to_string()) {
            Some(InFlightGuard {
                gate: self.clone(),
                host: host.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_in_flight(&self, host: &str) -> bool {
        self.lock().contains(host)
    }
}

pub struct InFlightGuard {
    gate: InFlightGate,
    host: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gate.lock().remove(&self.host);
    }
}
