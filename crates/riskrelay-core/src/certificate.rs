//! Risk certificate wire codec
//!
//! Fixed little-endian layout, 9-byte header plus 2 bytes per day:
//!
//! ```text
//! offset 0..3   magic bytes "MCA"
//! offset 3      u8  version (1)
//! offset 4..8   u32 anchor date (Unix seconds, UTC midnight of the most
//!               recent day covered)
//! offset 8      u8  day count (29 for version 1)
//! offset 9+2i   u16 outgoing risk for day (anchor - i)
//! ```
//!
//! Peers must agree on this layout bit-for-bit, so the day count and kernel
//! windowing are fixed domain constants rather than configuration.

use chrono::{DateTime, Days, NaiveDate};

use crate::error::{RiskError, RiskResult};
use crate::types::AnalysisDay;

/// Magic bytes at the start of every certificate.
pub const MAGIC: [u8; 3] = *b"MCA";

/// The only wire format version this codec produces and accepts.
pub const FORMAT_VERSION: u8 = 1;

/// Days covered by a version-1 certificate.
pub const DAY_COUNT: usize = 29;

const HEADER_LEN: usize = 9;

/// Encoded length of a version-1 certificate.
pub const ENCODED_LEN: usize = HEADER_LEN + 2 * DAY_COUNT;

/// A 29-day outgoing-risk series anchored at its most recent day.
/// Immutable once constructed; risk values are already quantized to u16.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskCertificate {
    anchor_date: NaiveDate,
    /// `risks[i]` covers day `anchor_date - i`.
    risks: Vec<u16>,
}

impl RiskCertificate {
    /// Build a certificate from explicit per-day values, newest first.
    pub fn new(anchor_date: NaiveDate, risks: Vec<u16>) -> RiskResult<Self> {
        if risks.len() != DAY_COUNT {
            return Err(RiskError::Format(format!(
                "certificate must cover {} days, got {}",
                DAY_COUNT,
                risks.len()
            )));
        }
        anchor_secs(anchor_date)?;
        Ok(Self { anchor_date, risks })
    }

    /// Build a certificate from an analysis series ordered newest first,
    /// quantizing each outgoing risk to the u16 wire range.
    pub fn from_series(series: &[AnalysisDay]) -> RiskResult<Self> {
        if series.len() < DAY_COUNT {
            return Err(RiskError::Format(format!(
                "series too short for a certificate: {} < {}",
                series.len(),
                DAY_COUNT
            )));
        }
        let risks = series[..DAY_COUNT]
            .iter()
            .map(|day| quantize(day.outgoing_risk))
            .collect();
        Self::new(series[0].date, risks)
    }

    /// The most recent day covered.
    pub fn anchor_date(&self) -> NaiveDate {
        self.anchor_date
    }

    /// Quantized risk values, newest first.
    pub fn risks(&self) -> &[u16] {
        &self.risks
    }

    /// Outgoing risk for `date`, matching by calendar day only.
    pub fn risk_on(&self, date: NaiveDate) -> Option<f64> {
        let offset = (self.anchor_date - date).num_days();
        if offset < 0 || offset as usize >= self.risks.len() {
            return None;
        }
        Some(f64::from(self.risks[offset as usize]))
    }

    /// Covered days with their risk values, newest first.
    pub fn days(&self) -> impl Iterator<Item = (NaiveDate, u16)> + '_ {
        self.risks
            .iter()
            .enumerate()
            .map(move |(i, &risk)| (self.anchor_date - Days::new(i as u64), risk))
    }

    /// Encode to the fixed wire layout, exactly [`ENCODED_LEN`] bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENCODED_LEN);
        bytes.extend_from_slice(&MAGIC);
        bytes.push(FORMAT_VERSION);
        // Range-checked at construction, so the cast cannot wrap.
        bytes.extend_from_slice(&(day_to_unix(self.anchor_date) as u32).to_le_bytes());
        bytes.push(DAY_COUNT as u8);
        for &risk in &self.risks {
            bytes.extend_from_slice(&risk.to_le_bytes());
        }
        bytes
    }

    /// Decode from the wire layout, rejecting bad magic, unknown versions
    /// and inconsistent lengths.
    pub fn decode(bytes: &[u8]) -> RiskResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RiskError::Format(format!(
                "certificate too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[..3] != MAGIC {
            return Err(RiskError::Format("magic bytes mismatch".to_string()));
        }
        let version = bytes[3];
        if version != FORMAT_VERSION {
            return Err(RiskError::Format(format!(
                "can only read version {}, got {}",
                FORMAT_VERSION, version
            )));
        }
        let day_count = bytes[8] as usize;
        if day_count != DAY_COUNT {
            return Err(RiskError::Format(format!(
                "version 1 certificates cover {} days, header declares {}",
                DAY_COUNT, day_count
            )));
        }
        let expected = HEADER_LEN + 2 * day_count;
        if bytes.len() != expected {
            return Err(RiskError::Format(format!(
                "length {} inconsistent with declared day count (expected {})",
                bytes.len(),
                expected
            )));
        }

        let secs = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let anchor_date = unix_to_day(i64::from(secs))?;

        let risks = bytes[HEADER_LEN..]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self { anchor_date, risks })
    }
}

/// Clamp and round a risk value into the u16 wire range. Negative inputs
/// never occur in a valid series but still clamp to zero.
fn quantize(risk: f64) -> u16 {
    risk.round().clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Anchor timestamp in the u32 wire range. Dates before 1970 or after 2106
/// cannot be encoded.
fn anchor_secs(date: NaiveDate) -> RiskResult<u32> {
    u32::try_from(day_to_unix(date)).map_err(|_| {
        RiskError::Format(format!("anchor date {} not representable on the wire", date))
    })
}

fn day_to_unix(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
        .timestamp()
}

fn unix_to_day(secs: i64) -> RiskResult<NaiveDate> {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| RiskError::Format(format!("anchor timestamp {} out of range", secs)))
}
