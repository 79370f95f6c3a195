//! Temporary BSSID blocklist consulted by network selection.

use std::collections::{HashMap, HashSet};

use stalink_supplicant::Ssid;

/// Upper bound for a computed block duration.
pub const MAX_BLOCK_DURATION_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Framework moved off this AP and wants to try another one quickly;
    /// cleared by the next full-band scan.
    FastReconnect,
    ConnectionFailure,
}

#[derive(Debug, Clone, PartialEq)]
struct BlockEntry {
    ssid: Ssid,
    reason: BlockReason,
    until_ms: u64,
    failures: u32,
}

#[derive(Debug, Clone)]
pub struct BssidBlocklist {
    base_duration_ms: u64,
    entries: HashMap<String, BlockEntry>,
}

impl BssidBlocklist {
    pub fn new(base_duration_ms: u64) -> Self {
        Self {
            base_duration_ms,
            entries: HashMap::new(),
        }
    }

    /// Blocks for an explicit duration, never shortening an existing block.
    pub fn block_for(
        &mut self,
        bssid: &str,
        ssid: &Ssid,
        duration_ms: u64,
        reason: BlockReason,
        now_ms: u64,
    ) {
        let until_ms = now_ms.saturating_add(duration_ms);
        let key = bssid.to_ascii_lowercase();
        let entry = self.entries.entry(key).or_insert_with(|| BlockEntry {
            ssid: ssid.clone(),
            reason,
            until_ms,
            failures: 0,
        });
        entry.until_ms = entry.until_ms.max(until_ms);
        entry.reason = reason;
    }

    /// Blocks after a failed attempt. Repeated failures on the same BSSID
    /// double the duration up to [`MAX_BLOCK_DURATION_MS`].
    pub fn block_failure(&mut self, bssid: &str, ssid: &Ssid, now_ms: u64) -> u64 {
        let key = bssid.to_ascii_lowercase();
        let failures = self
            .entries
            .get(&key)
            .map(|e| e.failures.saturating_add(1))
            .unwrap_or(1);
        let duration_ms = self.duration_for(failures);
        self.block_for(bssid, ssid, duration_ms, BlockReason::ConnectionFailure, now_ms);
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.failures = failures;
        }
        duration_ms
    }

    pub fn duration_for(&self, failures: u32) -> u64 {
        let shift = failures.saturating_sub(1).min(16);
        self.base_duration_ms
            .saturating_mul(1u64 << shift)
            .min(MAX_BLOCK_DURATION_MS.max(self.base_duration_ms))
    }

    pub fn is_blocked(&self, bssid: &str, now_ms: u64) -> bool {
        self.entries
            .get(&bssid.to_ascii_lowercase())
            .map(|e| e.until_ms > now_ms)
            .unwrap_or(false)
    }

    /// Drops expired entries and returns the BSSIDs still blocked.
    pub fn blocked(&mut self, now_ms: u64) -> HashSet<String> {
        self.entries.retain(|_, e| e.until_ms > now_ms);
        self.entries.keys().cloned().collect()
    }

    pub fn clear_reason(&mut self, reason: BlockReason) {
        self.entries.retain(|_, e| e.reason != reason);
    }

    pub fn clear_ssid(&mut self, ssid: &Ssid) {
        self.entries.retain(|_, e| &e.ssid != ssid);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_duration_doubles_and_caps() {
        let mut list = BssidBlocklist::new(10_000);
        let ssid = Ssid::from("cafe");
        assert_eq!(list.block_failure("AA:BB:CC:00:00:01", &ssid, 0), 10_000);
        assert_eq!(list.block_failure("aa:bb:cc:00:00:01", &ssid, 0), 20_000);
        assert_eq!(list.duration_for(30), MAX_BLOCK_DURATION_MS);
        assert!(list.is_blocked("aa:bb:cc:00:00:01", 19_999));
        assert!(!list.is_blocked("aa:bb:cc:00:00:01", 20_000));
    }

    #[test]
    fn blocked_evicts_expired_entries() {
        let mut list = BssidBlocklist::new(10_000);
        let ssid = Ssid::from("cafe");
        list.block_for("aa:aa:aa:aa:aa:aa", &ssid, 5_000, BlockReason::FastReconnect, 0);
        list.block_failure("bb:bb:bb:bb:bb:bb", &ssid, 0);
        let blocked = list.blocked(6_000);
        assert_eq!(blocked.len(), 1);
        assert!(blocked.contains("bb:bb:bb:bb:bb:bb"));
    }

    #[test]
    fn clear_by_reason_and_ssid() {
        let mut list = BssidBlocklist::new(10_000);
        list.block_for(
            "aa:aa:aa:aa:aa:aa",
            &Ssid::from("a"),
            10_000,
            BlockReason::FastReconnect,
            0,
        );
        list.block_failure("bb:bb:bb:bb:bb:bb", &Ssid::from("b"), 0);
        list.clear_reason(BlockReason::FastReconnect);
        assert!(!list.is_blocked("aa:aa:aa:aa:aa:aa", 1));
        list.clear_ssid(&Ssid::from("b"));
        assert!(list.blocked(1).is_empty());
    }
}
