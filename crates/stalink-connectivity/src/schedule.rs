//! Periodic single-scan schedule.
//!
//! One schedule is active at a time, picked by connection state. Each fire
//! advances the index; lookups past the end reuse the last entry.

use crate::config::{ScheduleConfig, DEFAULT_SCAN_SCHEDULE_SEC, DEFAULT_SCAN_TYPE};
use crate::types::ScanType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    Connected,
    Disconnected,
    SingleSavedNetwork,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub interval_ms: u64,
    pub scan_type: ScanType,
}

#[derive(Debug, Clone)]
pub struct ScanSchedule {
    connected: ScheduleConfig,
    disconnected: ScheduleConfig,
    single_saved: ScheduleConfig,
    /// Overrides the per-mode schedules while screen-on when set.
    external: Option<ScheduleConfig>,
    mode: Option<ScheduleMode>,
    index: usize,
}

impl ScanSchedule {
    pub fn new(
        connected: ScheduleConfig,
        disconnected: ScheduleConfig,
        single_saved: ScheduleConfig,
    ) -> Self {
        Self {
            connected,
            disconnected,
            single_saved,
            external: None,
            mode: None,
            index: 0,
        }
    }

    pub fn mode(&self) -> Option<ScheduleMode> {
        self.mode
    }

    /// Switches schedules; `None` means no schedule applies (transitioning).
    pub fn set_mode(&mut self, mode: Option<ScheduleMode>) {
        self.mode = mode;
    }

    pub fn set_external(&mut self, external: Option<ScheduleConfig>) {
        self.external = external;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn advance(&mut self) {
        self.index = self.index.saturating_add(1);
    }

    fn active(&self) -> Option<&ScheduleConfig> {
        let mode = self.mode?;
        if let Some(external) = &self.external {
            return Some(external);
        }
        Some(match mode {
            ScheduleMode::Connected => &self.connected,
            ScheduleMode::Disconnected => &self.disconnected,
            ScheduleMode::SingleSavedNetwork => &self.single_saved,
        })
    }

    /// Entry at `index`, clamped to the last one. Without an active
    /// schedule the first default entry is returned.
    pub fn entry_at(&self, index: usize) -> ScheduleEntry {
        let Some(active) = self.active() else {
            return ScheduleEntry {
                interval_ms: u64::from(DEFAULT_SCAN_SCHEDULE_SEC[0]) * 1000,
                scan_type: DEFAULT_SCAN_TYPE,
            };
        };
        let interval_sec = clamped(&active.intervals_sec, index)
            .copied()
            .unwrap_or(DEFAULT_SCAN_SCHEDULE_SEC[0]);
        let scan_type = clamped(&active.scan_types, index)
            .copied()
            .unwrap_or(DEFAULT_SCAN_TYPE);
        ScheduleEntry {
            interval_ms: u64::from(interval_sec) * 1000,
            scan_type,
        }
    }

    pub fn current(&self) -> ScheduleEntry {
        self.entry_at(self.index)
    }

    /// Interval of the first entry; no two periodic scans start closer
    /// together than this.
    pub fn min_interval_ms(&self) -> u64 {
        self.entry_at(0).interval_ms
    }
}

fn clamped<T>(items: &[T], index: usize) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    items.get(index.min(items.len() - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> ScanSchedule {
        ScanSchedule::new(
            ScheduleConfig {
                intervals_sec: vec![20, 40, 80],
                scan_types: vec![ScanType::HighAccuracy, ScanType::LowLatency],
            },
            ScheduleConfig {
                intervals_sec: vec![10, 20],
                scan_types: vec![ScanType::LowPower],
            },
            ScheduleConfig {
                intervals_sec: vec![60],
                scan_types: vec![ScanType::LowLatency],
            },
        )
    }

    #[test]
    fn index_clamps_at_last_entry() {
        let mut s = schedule();
        s.set_mode(Some(ScheduleMode::Connected));
        for _ in 0..10 {
            s.advance();
        }
        assert_eq!(s.current().interval_ms, 80_000);
        assert_eq!(s.current().scan_type, ScanType::LowLatency);
        s.reset();
        assert_eq!(s.current().interval_ms, 20_000);
    }

    #[test]
    fn mode_selects_schedule() {
        let mut s = schedule();
        s.set_mode(Some(ScheduleMode::Disconnected));
        assert_eq!(s.min_interval_ms(), 10_000);
        s.set_mode(Some(ScheduleMode::SingleSavedNetwork));
        assert_eq!(s.min_interval_ms(), 60_000);
        s.set_mode(None);
        assert_eq!(s.min_interval_ms(), 20_000);
    }

    #[test]
    fn external_schedule_overrides_modes() {
        let mut s = schedule();
        s.set_mode(Some(ScheduleMode::Connected));
        s.set_external(Some(ScheduleConfig {
            intervals_sec: vec![5],
            scan_types: vec![ScanType::LowPower],
        }));
        assert_eq!(s.current().interval_ms, 5_000);
        assert_eq!(s.current().scan_type, ScanType::LowPower);
    }
}
