//! Decodes the Tempest positional observation payload into named readings.
//!
//! The provider returns a JSON object whose `obs` key holds an array of
//! observation arrays. Each inner array carries fields by fixed position;
//! only the indices in [`field`] are consumed here. Optional fields may be
//! JSON null.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Field positions in one Tempest station observation array.
pub mod field {
    pub const EPOCH: usize = 0;
    pub const WIND_AVG: usize = 3;
    pub const WIND_GUST: usize = 4;
    pub const WIND_DIR: usize = 5;
    pub const PRESSURE: usize = 6;
    pub const AIR_TEMP: usize = 8;
    pub const HUMIDITY: usize = 9;
    pub const UV: usize = 11;
    pub const RADIATION: usize = 12;
    pub const RAIN_DAY: usize = 13;
    pub const LIGHTNING_DIST: usize = 17;

    /// One past the highest index the decoder reads.
    pub const MIN_LEN: usize = 18;
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not a JSON object with an `obs` array")]
    MalformedPayload,

    #[error("observation is not an array")]
    NotAnArray,

    #[error("observation has {found} fields, expected at least {expected}")]
    TooShort { found: usize, expected: usize },

    #[error("field {index} is not numeric: {value}")]
    NotNumeric { index: usize, value: Value },
}

/// One station observation in the provider's metric units.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub epoch: i64,
    pub air_temp_c: Option<f64>,
    pub wind_avg_mps: Option<f64>,
    pub wind_gust_mps: Option<f64>,
    pub wind_dir_deg: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub rain_day_mm: Option<f64>,
    pub uv_index: Option<f64>,
    pub radiation_wpm2: Option<f64>,
    pub lightning_avg_km: Option<f64>,
}

impl Reading {
    /// Maps one positional observation array to a named reading. The
    /// timestamp is mandatory and integral; every other field may be null.
    pub fn from_obs(obs: &Value) -> Result<Self, DecodeError> {
        let fields = obs.as_array().ok_or(DecodeError::NotAnArray)?;

        if fields.len() < field::MIN_LEN {
            return Err(DecodeError::TooShort {
                found: fields.len(),
                expected: field::MIN_LEN,
            });
        }

        let epoch = fields[field::EPOCH]
            .as_i64()
            .ok_or_else(|| DecodeError::NotNumeric {
                index: field::EPOCH,
                value: fields[field::EPOCH].clone(),
            })?;

        Ok(Reading {
            epoch,
            air_temp_c: optional(fields, field::AIR_TEMP)?,
            wind_avg_mps: optional(fields, field::WIND_AVG)?,
            wind_gust_mps: optional(fields, field::WIND_GUST)?,
            wind_dir_deg: optional(fields, field::WIND_DIR)?,
            pressure_hpa: optional(fields, field::PRESSURE)?,
            humidity_pct: optional(fields, field::HUMIDITY)?,
            rain_day_mm: optional(fields, field::RAIN_DAY)?,
            uv_index: optional(fields, field::UV)?,
            radiation_wpm2: optional(fields, field::RADIATION)?,
            lightning_avg_km: optional(fields, field::LIGHTNING_DIST)?,
        })
    }
}

fn optional(fields: &[Value], index: usize) -> Result<Option<f64>, DecodeError> {
    match &fields[index] {
        Value::Null => Ok(None),
        value => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| DecodeError::NotNumeric {
                index,
                value: value.clone(),
            }),
    }
}

/// Decodes a whole window payload into readings plus a count of skipped
/// malformed observations. A malformed top level fails the window; a
/// malformed individual observation is logged and skipped. The provider
/// reports an empty window as `"obs": null`, which decodes to no readings.
pub fn decode_payload(payload: &Value) -> Result<(Vec<Reading>, usize), DecodeError> {
    let observations = match payload.get("obs") {
        Some(Value::Array(observations)) => observations,
        Some(Value::Null) => return Ok((Vec::new(), 0)),
        _ => return Err(DecodeError::MalformedPayload),
    };

    let mut readings = Vec::with_capacity(observations.len());
    let mut skipped = 0;

    for obs in observations {
        match Reading::from_obs(obs) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                warn!("skipping malformed observation: {e}");
                skipped += 1;
            }
        }
    }

    Ok((readings, skipped))
}

// -- Tests -------------------------------------------------------------------
