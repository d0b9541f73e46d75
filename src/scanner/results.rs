use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Hosts that accepted the credentials, keyed by address, with whatever the
/// remote command printed.
///
/// Probe tasks write into the table concurrently, one entry per address.
/// Readers only look at it once the scan has joined every task.
#[derive(Debug, Default)]
pub struct HostTable {
    hosts: Mutex<HashMap<IpAddr, String>>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `output` for `addr`.
    ///
    /// Returns `false` and keeps the existing entry if `addr` was already
    /// stored.
    pub fn store(&self, addr: IpAddr, output: String) -> bool {
        let mut hosts = self.lock();
        if hosts.contains_key(&addr) {
            return false;
        }
        hosts.insert(addr, output);
        true
    }

    pub fn get(&self, addr: &IpAddr) -> Option<String> {
        self.lock().get(addr).cloned()
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.lock().contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Visits every entry in ascending address order.
    pub fn for_each(&self, mut f: impl FnMut(&IpAddr, &str)) {
        let hosts = self.lock();
        let mut addrs = hosts.keys().collect::<Vec<_>>();
        addrs.sort_unstable();

        for addr in addrs {
            f(addr, &hosts[addr]);
        }
    }

    /// Consumes the table into `(address, output)` pairs, ascending.
    pub fn into_sorted_vec(self) -> Vec<(IpAddr, String)> {
        let hosts = self
            .hosts
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        let mut entries = hosts.into_iter().collect::<Vec<_>>();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    // A writer that panicked mid-insert cannot leave the map half-written,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, String>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for HostTable {
    fn clone(&self) -> Self {
        Self {
            hosts: Mutex::new(self.lock().clone()),
        }
    }
}
