//! Candidate filtering for a second concurrent internet connection.

use std::collections::HashMap;

use crate::types::{Band, Candidate, ClientModeInfo};

/// Highest frequency of the lower 5 GHz sub-band.
pub const BAND_5_GHZ_LOW_HIGHEST_MHZ: u32 = 5320;
/// Lowest frequency of the upper 5 GHz sub-band.
pub const BAND_5_GHZ_HIGH_LOWEST_MHZ: u32 = 5500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiInternetState {
    None,
    ConnectionRequested,
    Connected,
}

/// Two 5 GHz frequencies may be combined only when one sits in the lower
/// sub-band and the other in the upper one. Outside 5 GHz the bands must
/// simply differ.
pub fn is_valid_dual_5ghz(freq_a: u32, freq_b: u32) -> bool {
    let band_a = Band::from_frequency(freq_a);
    let band_b = Band::from_frequency(freq_b);
    if band_a != Band::Ghz5 || band_b != Band::Ghz5 {
        return band_a != band_b;
    }
    (freq_a <= BAND_5_GHZ_LOW_HIGHEST_MHZ && freq_b >= BAND_5_GHZ_HIGH_LOWEST_MHZ)
        || (freq_b <= BAND_5_GHZ_LOW_HIGHEST_MHZ && freq_a >= BAND_5_GHZ_HIGH_LOWEST_MHZ)
}

/// True when a secondary on `secondary` may run next to a primary on
/// `primary`.
pub fn frequency_allowed(dual_5ghz: bool, primary: u32, secondary: u32) -> bool {
    if dual_5ghz {
        is_valid_dual_5ghz(primary, secondary)
    } else {
        Band::from_frequency(primary) != Band::from_frequency(secondary)
    }
}

/// Candidates usable for the secondary interface given the primary's
/// association. With multi-AP allowed any network qualifies; otherwise only
/// other BSSIDs of the primary's own network do.
pub fn secondary_candidates(
    candidates: &[Candidate],
    primary: &ClientModeInfo,
    multi_ap: bool,
    dual_5ghz: bool,
) -> Vec<Candidate> {
    let primary_freq = primary.frequency_mhz.unwrap_or(0);
    let mlo = !primary.affiliated_bssids.is_empty();
    let affiliated = |c: &Candidate| {
        primary
            .affiliated_bssids
            .iter()
            .any(|b| b.eq_ignore_ascii_case(&c.key.bssid))
    };
    candidates
        .iter()
        .filter(|c| {
            if multi_ap {
                if mlo {
                    !affiliated(c)
                } else {
                    frequency_allowed(dual_5ghz, primary_freq, c.frequency_mhz)
                }
            } else {
                let Some(connected) = primary.connected.as_ref() else {
                    return false;
                };
                frequency_allowed(dual_5ghz, primary_freq, c.frequency_mhz)
                    && !affiliated(c)
                    && c.key.ssid == connected.ssid
                    && c.key.network_id == connected.network_id
                    && connected.effective_security() == Some(c.key.security)
            }
        })
        .cloned()
        .collect()
}

/// Narrows to the externally pinned BSSID per band. With no pins the input
/// is returned unchanged.
pub fn apply_specified_bssids(
    candidates: Vec<Candidate>,
    specified: &HashMap<Band, String>,
) -> Vec<Candidate> {
    if specified.is_empty() {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|c| {
            specified
                .get(&Band::from_frequency(c.frequency_mhz))
                .map(|b| b.eq_ignore_ascii_case(&c.key.bssid))
                .unwrap_or(false)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateKey, CmmRole};
    use stalink_supplicant::{SecurityType, Ssid, WifiConfig};

    fn candidate(net: i32, ssid: &str, bssid: &str, freq: u32) -> Candidate {
        Candidate {
            key: CandidateKey {
                ssid: Ssid::from(ssid),
                bssid: bssid.to_string(),
                network_id: net,
                security: SecurityType::Psk,
            },
            scan_rssi: -55,
            frequency_mhz: freq,
            oem_paid: false,
            oem_private: false,
            passpoint: false,
        }
    }

    fn primary(freq: u32) -> ClientModeInfo {
        let mut info = ClientModeInfo::new("wlan0", CmmRole::Primary);
        info.connected = Some(WifiConfig::new(1, "home", SecurityType::Psk));
        info.connected_bssid = Some("00:00:00:00:00:01".into());
        info.frequency_mhz = Some(freq);
        info
    }

    #[test]
    fn dual_5ghz_needs_low_and_high_sub_bands() {
        assert!(is_valid_dual_5ghz(5180, 5745));
        assert!(is_valid_dual_5ghz(5745, 5320));
        assert!(!is_valid_dual_5ghz(5180, 5240));
        assert!(!is_valid_dual_5ghz(5500, 5745));
        assert!(is_valid_dual_5ghz(2437, 5180));
        assert!(!is_valid_dual_5ghz(2412, 2462));
    }

    #[test]
    fn without_dual_5ghz_bands_must_differ() {
        assert!(!frequency_allowed(false, 5180, 5745));
        assert!(frequency_allowed(false, 2437, 5745));
    }

    #[test]
    fn dbs_mode_keeps_same_network_other_band() {
        let cands = vec![
            candidate(1, "home", "00:00:00:00:00:02", 5180),
            candidate(1, "home", "00:00:00:00:00:03", 2462),
            candidate(2, "other", "00:00:00:00:00:04", 5180),
        ];
        let out = secondary_candidates(&cands, &primary(2437), false, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key.bssid, "00:00:00:00:00:02");
    }

    #[test]
    fn multi_ap_mode_accepts_other_networks() {
        let cands = vec![
            candidate(2, "other", "00:00:00:00:00:04", 5180),
            candidate(3, "third", "00:00:00:00:00:05", 2412),
        ];
        let out = secondary_candidates(&cands, &primary(2437), true, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key.network_id, 2);
    }

    #[test]
    fn specified_bssids_filter_per_band() {
        let cands = vec![
            candidate(2, "a", "00:00:00:00:00:04", 5180),
            candidate(3, "b", "00:00:00:00:00:05", 5200),
        ];
        let mut pins = HashMap::new();
        pins.insert(Band::Ghz5, "00:00:00:00:00:05".to_string());
        let out = apply_specified_bssids(cands, &pins);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key.network_id, 3);
    }
}
