//! District incidence lookup
//!
//! The incidence cache is a directory of JSON snapshots, one file per
//! publication date (`YYYY-MM-DD.json`), each mapping district ids to the
//! district name and per-age-group 7-day incidence values. The cache is
//! refreshed by an external bulk download; this module only reads it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{Days, NaiveDate};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{RiskError, RiskResult};

/// Age group key covering all ages.
pub const AGE_GROUP_ALL: &str = "all";

#[derive(Debug, Deserialize)]
struct DistrictRecord {
    name: String,
    incidence: HashMap<String, f64>,
}

#[derive(Debug, Default)]
struct District {
    name: String,
    /// Publication date -> age group -> 7-day incidence per 100k.
    by_date: BTreeMap<NaiveDate, HashMap<String, f64>>,
}

/// Inputs the point calculator derives a person's base risk from.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidenceSnapshot {
    /// 7-day incidence per 100k population.
    pub cases_past_week: f64,
    /// Percent change versus one week earlier.
    pub cases_increasing_percentage: f64,
    /// Share of positive tests, in percent.
    pub positive_case_percentage: f64,
}

/// In-memory incidence table for all districts.
#[derive(Debug, Default)]
pub struct IncidenceTable {
    districts: HashMap<String, District>,
}

impl IncidenceTable {
    /// Load every `YYYY-MM-DD.json` snapshot under `dir`. A missing cache
    /// directory yields an empty table; per-district risk then resolves to
    /// nothing and the affected days are flagged instead of failing hard.
    pub fn load(dir: impl AsRef<Path>) -> RiskResult<Self> {
        let dir = dir.as_ref();
        let mut table = Self::default();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => {
                warn!("no incidence cache at {}", dir.display());
                return Ok(table);
            }
        };

        for entry in entries {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(date) = stem.parse::<NaiveDate>() else {
                continue;
            };
            table.load_snapshot(&path, date)?;
        }

        debug!(districts = table.districts.len(), "incidence cache loaded");
        Ok(table)
    }

    fn load_snapshot(&mut self, path: &Path, date: NaiveDate) -> RiskResult<()> {
        let data = std::fs::read_to_string(path)?;
        let records: HashMap<String, DistrictRecord> = serde_json::from_str(&data)
            .map_err(|e| RiskError::Serialization(format!("{}: {}", path.display(), e)))?;

        for (id, record) in records {
            let district = self.districts.entry(id).or_default();
            if district.name.is_empty() {
                district.name = record.name;
            }
            district.by_date.insert(date, record.incidence);
        }
        Ok(())
    }

    /// Human-readable district name, if the district is known.
    pub fn district_name(&self, district_id: &str) -> Option<&str> {
        self.districts.get(district_id).map(|d| d.name.as_str())
    }

    /// All known district ids.
    pub fn district_ids(&self) -> impl Iterator<Item = &str> {
        self.districts.keys().map(String::as_str)
    }

    /// Incidence for a district on `date`. When the exact date has no data
    /// the nearest earlier snapshot is used and the fallback is logged.
    /// Returns `None` if the district has no usable data at all.
    pub fn incidence(&self, district_id: &str, date: NaiveDate, age_group: &str) -> Option<f64> {
        let district = self.districts.get(district_id)?;

        let groups = match district.by_date.get(&date) {
            Some(groups) => groups,
            None => {
                let (fallback, groups) = district.by_date.range(..=date).next_back()?;
                warn!(
                    district = district_id,
                    requested = %date,
                    used = %fallback,
                    "no incidence for requested date, using earlier snapshot"
                );
                groups
            }
        };
        groups.get(age_group).copied()
    }

    /// Calculator inputs for a district and date: current 7-day incidence,
    /// its change against the week before, and the test-positivity rate.
    pub fn snapshot(&self, district_id: &str, date: NaiveDate) -> Option<IncidenceSnapshot> {
        let cases_now = self.incidence(district_id, date, AGE_GROUP_ALL)?;
        let week_earlier = date.checked_sub_days(Days::new(7))?;
        let cases_before = self
            .incidence(district_id, week_earlier, AGE_GROUP_ALL)
            .unwrap_or(cases_now);

        Some(IncidenceSnapshot {
            cases_past_week: cases_now,
            cases_increasing_percentage: cases_now / (cases_before + 1.0) * 100.0 - 100.0,
            // No live test-positivity feed yet; this is the most recent
            // published nationwide value.
            positive_case_percentage: 7.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_snapshot(dir: &Path, date: &str, body: &str) {
        let mut f = std::fs::File::create(dir.join(format!("{date}.json"))).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    fn sample_table() -> (tempfile::TempDir, IncidenceTable) {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(
            dir.path(),
            "2021-05-01",
            r#"{"03241": {"name": "Region Hannover", "incidence": {"all": 80.0, "A15-A34": 110.0}}}"#,
        );
        write_snapshot(
            dir.path(),
            "2021-05-08",
            r#"{"03241": {"name": "Region Hannover", "incidence": {"all": 120.0}}}"#,
        );
        let table = IncidenceTable::load(dir.path()).unwrap();
        (dir, table)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_exact_date_lookup() {
        let (_dir, table) = sample_table();
        assert_eq!(
            table.incidence("03241", date(2021, 5, 8), AGE_GROUP_ALL),
            Some(120.0)
        );
        assert_eq!(
            table.incidence("03241", date(2021, 5, 1), "A15-A34"),
            Some(110.0)
        );
    }

    #[test]
    fn test_fallback_to_nearest_earlier_date() {
        let (_dir, table) = sample_table();
        // 2021-05-05 has no snapshot; 2021-05-01 is the nearest earlier one.
        assert_eq!(
            table.incidence("03241", date(2021, 5, 5), AGE_GROUP_ALL),
            Some(80.0)
        );
        // Dates after the newest snapshot fall back to it.
        assert_eq!(
            table.incidence("03241", date(2021, 6, 1), AGE_GROUP_ALL),
            Some(120.0)
        );
    }

    #[test]
    fn test_no_earlier_data_is_none() {
        let (_dir, table) = sample_table();
        assert_eq!(
            table.incidence("03241", date(2021, 4, 1), AGE_GROUP_ALL),
            None
        );
        assert_eq!(
            table.incidence("99999", date(2021, 5, 8), AGE_GROUP_ALL),
            None
        );
    }

    #[test]
    fn test_missing_cache_dir_yields_empty_table() {
        let table = IncidenceTable::load("/nonexistent/incidence").unwrap();
        assert_eq!(table.incidence("03241", date(2021, 5, 8), AGE_GROUP_ALL), None);
    }

    #[test]
    fn test_snapshot_increase_percentage() {
        let (_dir, table) = sample_table();
        let snapshot = table.snapshot("03241", date(2021, 5, 8)).unwrap();
        assert_eq!(snapshot.cases_past_week, 120.0);
        // 120 / (80 + 1) * 100 - 100
        assert!((snapshot.cases_increasing_percentage - 48.148148).abs() < 1e-4);
    }
}
