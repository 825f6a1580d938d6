//! Minute-of-day trends: defect rate and sensor-group averages.
//!
//! Buckets are keyed `HH:MM` and deliberately drop the date, so a batch
//! spanning several days folds onto one intraday profile.

use crate::config::AggregationConfig;
use crate::types::prediction::Label;
use crate::types::record::{RawTable, RawValue};
use crate::types::report::{RatePoint, SensorPoint};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;
use tracing::debug;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S%.f",
    "%Y.%m.%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Parse the wall-clock time of day from a timestamp-like cell.
///
/// Offsets are kept as written (no conversion to UTC). Date-only values
/// map to midnight. Numbers are not interpreted as epochs.
pub fn parse_time_of_day(value: &RawValue) -> Option<NaiveTime> {
    let text = value.as_text()?.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.time());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(dt.time());
    }
    if DATE_FORMATS
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(text, fmt).is_ok())
    {
        return Some(NaiveTime::MIN);
    }
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
}

/// `HH:MM` bucket key for a cell, if it parses
pub fn minute_bucket(value: &RawValue) -> Option<String> {
    parse_time_of_day(value).map(|t| t.format("%H:%M").to_string())
}

/// Time-bucketed outputs for one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeBuckets {
    pub time_series: Vec<RatePoint>,
    pub head_sensors: Vec<SensorPoint>,
    pub screw_sensors: Vec<SensorPoint>,
}

/// Groups labeled rows into minute buckets.
pub struct TimeBucketAggregator {
    timestamp_candidates: Vec<String>,
    head_sensors: Vec<String>,
    screw_sensors: Vec<String>,
}

impl TimeBucketAggregator {
    pub fn new(
        timestamp_candidates: Vec<String>,
        head_sensors: Vec<String>,
        screw_sensors: Vec<String>,
    ) -> Self {
        Self {
            timestamp_candidates,
            head_sensors,
            screw_sensors,
        }
    }

    pub fn from_config(config: &AggregationConfig) -> Self {
        Self::new(
            config.timestamp_candidates.clone(),
            config.head_sensors.clone(),
            config.screw_sensors.clone(),
        )
    }

    /// First candidate present in the table
    pub fn detect_timestamp_column<'a>(&'a self, table: &RawTable) -> Option<&'a str> {
        self.timestamp_candidates
            .iter()
            .find(|c| table.has_column(c))
            .map(String::as_str)
    }

    /// `labels` holds one entry per table row.
    pub fn aggregate(&self, table: &RawTable, labels: &[Label]) -> TimeBuckets {
        let ts_column = match self.detect_timestamp_column(table) {
            Some(column) => column,
            None => {
                debug!("No timestamp column found; skipping time buckets");
                return TimeBuckets::default();
            }
        };

        let minutes: Vec<Option<String>> = table
            .column(ts_column)
            .map(|cells| cells.map(minute_bucket).collect())
            .unwrap_or_default();

        let unparsed = minutes.iter().filter(|m| m.is_none()).count();
        debug!(
            column = ts_column,
            rows = minutes.len(),
            unparsed = unparsed,
            "Bucketing rows by minute"
        );

        TimeBuckets {
            time_series: defect_rate_series(&minutes, labels),
            head_sensors: sensor_group_series(table, &minutes, &self.head_sensors),
            screw_sensors: sensor_group_series(table, &minutes, &self.screw_sensors),
        }
    }
}

impl Default for TimeBucketAggregator {
    fn default() -> Self {
        Self::from_config(&AggregationConfig::default())
    }
}

fn defect_rate_series(minutes: &[Option<String>], labels: &[Label]) -> Vec<RatePoint> {
    let mut buckets: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (minute, label) in minutes.iter().zip(labels) {
        if let Some(minute) = minute {
            let entry = buckets.entry(minute.as_str()).or_insert((0.0, 0));
            entry.0 += label.class_id() as f64;
            entry.1 += 1;
        }
    }

    buckets
        .into_iter()
        .map(|(time, (sum, count))| RatePoint {
            time: time.to_string(),
            rate: sum / count as f64,
        })
        .collect()
}

/// Per-minute mean of each sensor column present in the table. Absent
/// columns are omitted rather than zero-filled.
fn sensor_group_series(
    table: &RawTable,
    minutes: &[Option<String>],
    sensors: &[String],
) -> Vec<SensorPoint> {
    let present: Vec<(&str, usize)> = sensors
        .iter()
        .filter_map(|name| table.column_index(name).map(|idx| (name.as_str(), idx)))
        .collect();

    let mut buckets: BTreeMap<&str, Vec<(f64, usize)>> = BTreeMap::new();
    for (row, minute) in table.rows().iter().zip(minutes) {
        let Some(minute) = minute else {
            continue;
        };
        let sums = buckets
            .entry(minute.as_str())
            .or_insert_with(|| vec![(0.0, 0); present.len()]);
        for (slot, &(_, idx)) in sums.iter_mut().zip(&present) {
            if let Some(value) = row[idx].as_number() {
                slot.0 += value;
                slot.1 += 1;
            }
        }
    }

    buckets
        .into_iter()
        .map(|(time, sums)| SensorPoint {
            time: time.to_string(),
            averages: present
                .iter()
                .zip(sums)
                .filter(|(_, (_, count))| *count > 0)
                .map(|(&(name, _), (sum, count))| (name.to_string(), sum / count as f64))
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<&str>>) -> RawTable {
        let mut t = RawTable::new(columns.iter().map(|s| s.to_string()).collect());
        for row in rows {
            t.push_row(
                row.into_iter()
                    .map(|c| if c.is_empty() { RawValue::Null } else { RawValue::from(c) })
                    .collect(),
            )
            .unwrap();
        }
        t
    }

    fn labels(ids: &[u8]) -> Vec<Label> {
        ids.iter().map(|&id| Label::from_class_id(id).unwrap()).collect()
    }

    #[test]
    fn test_parse_time_of_day_formats() {
        let cases = [
            ("2024-03-01 08:15:42", "08:15"),
            ("2024-03-01T23:59:00.123", "23:59"),
            ("2024/03/01 07:05", "07:05"),
            ("2024.03.01 12:30:00", "12:30"),
            ("2024-03-01T08:15:00+09:00", "08:15"),
            ("2024-03-01", "00:00"),
            ("14:07:09", "14:07"),
            ("6:45", "06:45"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                minute_bucket(&RawValue::from(input)).as_deref(),
                Some(expected),
                "input {}",
                input
            );
        }

        assert_eq!(minute_bucket(&RawValue::from("yesterday")), None);
        assert_eq!(minute_bucket(&RawValue::Number(1.7e9)), None);
        assert_eq!(minute_bucket(&RawValue::Null), None);
    }

    #[test]
    fn test_detects_first_candidate() {
        let agg = TimeBucketAggregator::default();
        let t = table(&["date", "time", "x"], vec![]);
        assert_eq!(agg.detect_timestamp_column(&t), Some("time"));

        let t = table(&["생산일시"], vec![]);
        assert_eq!(agg.detect_timestamp_column(&t), Some("생산일시"));
    }

    #[test]
    fn test_defect_rate_per_minute() {
        let t = table(
            &["timestamp", "passorfail"],
            vec![
                vec!["2024-03-01 08:01:10", "1"],
                vec!["2024-03-01 08:00:05", "0"],
                vec!["2024-03-01 08:01:50", "0"],
                vec!["garbage", "1"],
                vec!["2024-03-02 08:00:30", "1"],
            ],
        );

        let buckets = TimeBucketAggregator::default().aggregate(&t, &labels(&[1, 0, 0, 1, 1]));

        assert_eq!(
            buckets.time_series,
            vec![
                RatePoint { time: "08:00".into(), rate: 0.5 },
                RatePoint { time: "08:01".into(), rate: 0.5 },
            ]
        );
    }

    #[test]
    fn test_sensor_groups_average_present_columns() {
        let t = table(
            &["time", "EX1.H2_PV", "EX1.H4_PV", "EX1.Z1_PV"],
            vec![
                vec!["09:00:01", "230", "210", "180"],
                vec!["09:00:40", "232", "", "182"],
                vec!["09:01:00", "bad", "", "181"],
            ],
        );

        let buckets = TimeBucketAggregator::default().aggregate(&t, &labels(&[0, 0, 0]));

        assert_eq!(buckets.head_sensors.len(), 2);
        let first = &buckets.head_sensors[0];
        assert_eq!(first.time, "09:00");
        assert_eq!(first.average("EX1.H2_PV"), Some(231.0));
        assert_eq!(first.average("EX1.H4_PV"), Some(210.0));
        assert_eq!(first.average("EX1.H3_PV"), None);

        // no numeric head values at 09:01, bucket kept with time only
        let second = &buckets.head_sensors[1];
        assert_eq!(second.time, "09:01");
        assert!(second.averages.is_empty());

        assert_eq!(buckets.screw_sensors[0].average("EX1.Z1_PV"), Some(181.0));
        assert_eq!(buckets.screw_sensors[1].average("EX1.Z1_PV"), Some(181.0));
    }

    #[test]
    fn test_no_timestamp_column_yields_empty_outputs() {
        let t = table(&["EX1.H2_PV"], vec![vec!["230"]]);
        let buckets = TimeBucketAggregator::default().aggregate(&t, &labels(&[1]));

        assert_eq!(buckets, TimeBuckets::default());
    }

    #[test]
    fn test_buckets_sorted_and_unique() {
        let stamps = ["23:59", "00:00", "12:00", "00:00", "09:30", "23:59"];
        let rows = stamps.iter().map(|s| vec![*s]).collect();
        let t = table(&["time"], rows);

        let buckets = TimeBucketAggregator::default().aggregate(&t, &labels(&[0, 1, 0, 0, 1, 1]));
        let keys: Vec<&str> = buckets.time_series.iter().map(|p| p.time.as_str()).collect();

        assert_eq!(keys, vec!["00:00", "09:30", "12:00", "23:59"]);
    }
}
