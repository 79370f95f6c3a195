//! Parsing of SIM authentication answers handed over by the telephony side.
//!
//! Formats are colon-prefixed hex fields:
//! - GSM: `:kc:sres` repeated, one pair per challenge
//! - UMTS auth: `:ik:ck:res`
//! - UMTS resync: `:auts`

use crate::channel::SimAuthResponse;
use crate::error::{Result, SupplicantError};

const KC_LEN: usize = 8;
const SRES_LEN: usize = 4;
const IK_LEN: usize = 16;
const CK_LEN: usize = 16;
const MAX_RES_LEN: usize = 16;
const AUTS_LEN: usize = 14;

pub fn parse_hex_bytes(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    if value.len() % 2 != 0 {
        return Err(SupplicantError::invalid(format!("odd hex length in '{value}'")));
    }
    (0..value.len())
        .step_by(2)
        .map(|i| {
            value
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| SupplicantError::invalid(format!("invalid hex in '{value}'")))
        })
        .collect()
}

fn fields(params: &str) -> Result<Vec<Vec<u8>>> {
    let Some(rest) = params.strip_prefix(':') else {
        return Err(SupplicantError::invalid("SIM params must start with ':'"));
    };
    rest.split(':').map(parse_hex_bytes).collect()
}

fn expect_len(field: &[u8], len: usize, name: &str) -> Result<()> {
    if field.len() != len {
        return Err(SupplicantError::invalid(format!(
            "{name} must be {len} bytes, got {}",
            field.len()
        )));
    }
    Ok(())
}

pub fn parse_gsm_auth(params: &str) -> Result<SimAuthResponse> {
    let fields = fields(params)?;
    if fields.is_empty() || fields.len() % 2 != 0 || fields.len() > 6 {
        return Err(SupplicantError::invalid(format!(
            "GSM auth expects 1-3 kc:sres pairs, got {} fields",
            fields.len()
        )));
    }
    let mut kc_sres = Vec::with_capacity(fields.len() / 2);
    for pair in fields.chunks(2) {
        expect_len(&pair[0], KC_LEN, "kc")?;
        expect_len(&pair[1], SRES_LEN, "sres")?;
        kc_sres.push((pair[0].clone(), pair[1].clone()));
    }
    Ok(SimAuthResponse::Gsm { kc_sres })
}

pub fn parse_umts_auth(params: &str) -> Result<SimAuthResponse> {
    let mut fields = fields(params)?;
    if fields.len() != 3 {
        return Err(SupplicantError::invalid("UMTS auth expects ik:ck:res"));
    }
    let res = fields.pop().unwrap_or_default();
    let ck = fields.pop().unwrap_or_default();
    let ik = fields.pop().unwrap_or_default();
    expect_len(&ik, IK_LEN, "ik")?;
    expect_len(&ck, CK_LEN, "ck")?;
    if res.is_empty() || res.len() > MAX_RES_LEN {
        return Err(SupplicantError::invalid("res must be 1-16 bytes"));
    }
    Ok(SimAuthResponse::UmtsAuth { ik, ck, res })
}

pub fn parse_umts_auts(params: &str) -> Result<SimAuthResponse> {
    let mut fields = fields(params)?;
    if fields.len() != 1 {
        return Err(SupplicantError::invalid("UMTS AUTS expects a single field"));
    }
    let auts = fields.pop().unwrap_or_default();
    expect_len(&auts, AUTS_LEN, "auts")?;
    Ok(SimAuthResponse::UmtsAuts { auts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gsm_pairs_are_length_checked() {
        let ok = parse_gsm_auth(":0102030405060708:0a0b0c0d:1112131415161718:1a1b1c1d").unwrap();
        match ok {
            SimAuthResponse::Gsm { kc_sres } => {
                assert_eq!(kc_sres.len(), 2);
                assert_eq!(kc_sres[1].1, vec![0x1a, 0x1b, 0x1c, 0x1d]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_gsm_auth(":01020304:0a0b0c0d").is_err());
        assert!(parse_gsm_auth("0102030405060708:0a0b0c0d").is_err());
        assert!(parse_gsm_auth(":0102030405060708").is_err());
    }

    #[test]
    fn umts_fields() {
        let ik = "00".repeat(16);
        let ck = "11".repeat(16);
        let parsed = parse_umts_auth(&format!(":{ik}:{ck}:abcd")).unwrap();
        assert_eq!(
            parsed,
            SimAuthResponse::UmtsAuth {
                ik: vec![0; 16],
                ck: vec![0x11; 16],
                res: vec![0xab, 0xcd],
            }
        );
        assert!(parse_umts_auth(&format!(":{ik}:{ck}")).is_err());
        assert!(parse_umts_auts(&format!(":{}", "22".repeat(14))).is_ok());
        assert!(parse_umts_auts(":2222").is_err());
    }

    #[test]
    fn hex_rejects_garbage() {
        assert!(parse_hex_bytes("zz").is_err());
        assert!(parse_hex_bytes("abc").is_err());
        assert_eq!(parse_hex_bytes("").unwrap(), Vec::<u8>::new());
    }
}
