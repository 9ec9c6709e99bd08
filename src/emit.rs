//! Converts readings to US-customary archive rows and appends them to the
//! output CSV.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};

use crate::reading::Reading;
use crate::units;

/// Archive column order. Downstream WeeWX import expects exactly this
/// header.
pub const COLUMNS: [&str; 11] = [
    "dateTime",
    "outTemp",
    "windSpeed",
    "windGust",
    "windDir",
    "barometer",
    "outHumidity",
    "rain",
    "UV",
    "radiation",
    "lightning_distance",
];

/// One archive row in US-customary units: °F, mph, inHg, inches, miles.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRow {
    pub date_time: i64,
    pub out_temp: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub wind_dir: Option<f64>,
    pub barometer: Option<f64>,
    pub out_humidity: Option<f64>,
    pub rain: Option<f64>,
    pub uv: Option<f64>,
    pub radiation: Option<f64>,
    pub lightning_distance: Option<f64>,
}

impl From<&Reading> for ArchiveRow {
    /// The single point where unit conversion is applied. Fields the
    /// provider already reports in archive units pass through.
    fn from(reading: &Reading) -> Self {
        ArchiveRow {
            date_time: reading.epoch,
            out_temp: units::convert_opt(reading.air_temp_c, units::celsius_to_fahrenheit),
            wind_speed: units::convert_opt(reading.wind_avg_mps, units::mps_to_mph),
            wind_gust: units::convert_opt(reading.wind_gust_mps, units::mps_to_mph),
            wind_dir: reading.wind_dir_deg,
            barometer: units::convert_opt(reading.pressure_hpa, units::hpa_to_inhg),
            out_humidity: reading.humidity_pct,
            rain: units::convert_opt(reading.rain_day_mm, units::mm_to_inch),
            uv: reading.uv_index,
            radiation: reading.radiation_wpm2,
            lightning_distance: units::convert_opt(reading.lightning_avg_km, units::km_to_mile),
        }
    }
}

/// Append-only CSV sink for archive rows. Rows are buffered per window and
/// pushed to disk by [`RowEmitter::flush`], so a crash loses at most the
/// in-flight window.
pub struct RowEmitter {
    writer: csv::Writer<std::fs::File>,
}

impl RowEmitter {
    /// Opens (or creates) the output file for appending. The header is
    /// written only when the file is new or empty, so an interrupted run
    /// can resume into the same file.
    pub fn create(path: &Path) -> Result<Self> {
        let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file `{}`", path.display()))?;

        let mut writer = csv::Writer::from_writer(file);
        if needs_header {
            writer
                .write_record(COLUMNS)
                .context("Failed to write CSV header")?;
        }

        Ok(Self { writer })
    }

    pub fn append(&mut self, row: &ArchiveRow) -> Result<()> {
        self.writer
            .write_record([
                row.date_time.to_string(),
                number_field(row.out_temp),
                number_field(row.wind_speed),
                number_field(row.wind_gust),
                number_field(row.wind_dir),
                number_field(row.barometer),
                number_field(row.out_humidity),
                number_field(row.rain),
                number_field(row.uv),
                number_field(row.radiation),
                number_field(row.lightning_distance),
            ])
            .context("Failed to append row to output file")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush output file")
    }
}

// A missing reading is an empty cell, not a zero.
fn number_field(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// -- Tests -------------------------------------------------------------------
