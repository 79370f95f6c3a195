//! Candidate confirmation while the device is moving fast.
//!
//! A candidate seen once during high movement may be gone a moment later.
//! The filter only lets through candidates that were also seen, with a
//! similar RSSI, in the previous full scan at least `delay` earlier, and
//! otherwise asks for a confirming partial scan.

use std::collections::HashMap;

use crate::types::{Candidate, CandidateKey};

#[derive(Debug, Clone)]
struct CachedScan {
    at_ms: u64,
    rssi: Option<HashMap<CandidateKey, i32>>,
    frequencies: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MovementVerdict {
    Proceed(Vec<Candidate>),
    /// Do not connect now. When set, schedule a partial scan after the
    /// given delay.
    Hold { partial_scan_in_ms: Option<u64> },
}

#[derive(Debug, Clone)]
pub struct HighMovementFilter {
    delay_ms: u64,
    rssi_delta: i32,
    cached: Option<CachedScan>,
}

impl HighMovementFilter {
    pub fn new(delay_ms: u64, rssi_delta: i32) -> Self {
        Self {
            delay_ms,
            rssi_delta,
            cached: None,
        }
    }

    fn remember(&mut self, candidates: Option<&[Candidate]>, now_ms: u64) {
        self.cached = Some(CachedScan {
            at_ms: now_ms,
            rssi: candidates.map(|list| {
                list.iter()
                    .map(|c| (c.key.clone(), c.scan_rssi))
                    .collect::<HashMap<_, _>>()
            }),
            frequencies: candidates
                .map(|list| {
                    let mut freqs: Vec<u32> = Vec::new();
                    for c in list {
                        if !freqs.contains(&c.frequency_mhz) {
                            freqs.push(c.frequency_mhz);
                        }
                    }
                    freqs
                })
                .unwrap_or_default(),
        });
    }

    /// `full_view` is true for full-band and PNO scans; partial scans never
    /// replace the cached view.
    pub fn filter(
        &mut self,
        candidates: Vec<Candidate>,
        full_view: bool,
        now_ms: u64,
    ) -> MovementVerdict {
        if candidates.is_empty() {
            if full_view {
                self.remember(None, now_ms);
            }
            return MovementVerdict::Hold {
                partial_scan_in_ms: None,
            };
        }

        if let Some(CachedScan {
            at_ms,
            rssi: Some(rssi),
            ..
        }) = &self.cached
        {
            if now_ms.saturating_sub(*at_ms) < self.delay_ms {
                return MovementVerdict::Hold {
                    partial_scan_in_ms: None,
                };
            }
            let confirmed: Vec<Candidate> = candidates
                .iter()
                .filter(|c| {
                    rssi.get(&c.key)
                        .map(|old| (old - c.scan_rssi).abs() < self.rssi_delta)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            if !confirmed.is_empty() {
                if full_view {
                    self.remember(Some(&candidates), now_ms);
                }
                return MovementVerdict::Proceed(confirmed);
            }
        }

        if full_view {
            self.remember(Some(&candidates), now_ms);
            return MovementVerdict::Hold {
                partial_scan_in_ms: Some(self.delay_ms),
            };
        }
        MovementVerdict::Hold {
            partial_scan_in_ms: None,
        }
    }

    /// Channels of the cached candidates, scanned by the delayed partial
    /// scan.
    pub fn cached_frequencies(&self) -> Vec<u32> {
        self.cached
            .as_ref()
            .map(|c| c.frequencies.clone())
            .unwrap_or_default()
    }
}
