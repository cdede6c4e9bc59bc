//! Columnar weather blocks and their normalized time-series form.
//!
//! A provider block stores its time axis implicitly (start, end, interval)
//! and each variable as a flat value array. [`normalize`] rebuilds the
//! explicit time axis and picks the variables a caller asked for.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::NormalizeError;
use crate::variable::{Aggregation, VariableSelector};

/// One variable column of a raw block.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVariable {
    pub variable: String,
    pub altitude: Option<u32>,
    pub aggregation: Option<Aggregation>,
    pub ensemble_member: Option<u32>,
    pub values: Vec<f64>,
}

/// Provider wire shape for one resolution tier.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumnarBlock {
    /// Epoch seconds, inclusive.
    pub time: i64,
    /// Epoch seconds, exclusive.
    pub time_end: i64,
    /// Seconds per sample.
    pub interval: i64,
    pub utc_offset_seconds: i64,
    pub variables: Vec<RawVariable>,
}

impl RawColumnarBlock {
    /// Number of samples on the time axis; a partial trailing interval is dropped.
    pub fn sample_count(&self) -> Result<usize, NormalizeError> {
        if self.time >= self.time_end {
            return Ok(0);
        }
        if self.interval <= 0 {
            return Err(NormalizeError::InvalidInterval(self.interval));
        }

        let span = self
            .time_end
            .checked_sub(self.time)
            .ok_or(NormalizeError::TimestampOutOfRange(self.time_end))?;
        if span % self.interval != 0 {
            tracing::debug!(
                span,
                interval = self.interval,
                "time span is not a multiple of the interval; dropping the partial sample"
            );
        }
        usize::try_from(span / self.interval).map_err(|_| NormalizeError::TimestampOutOfRange(self.time_end))
    }
}

/// Time axis plus variables keyed by name (or `name_member<N>`).
///
/// Every variable vector has exactly `time.len()` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    pub time: Vec<DateTime<Utc>>,
    pub variables: BTreeMap<String, Vec<f64>>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.variables.get(key).map(Vec::as_slice)
    }

    /// Value at `index`; missing keys, out-of-range indices and NaN give `None`.
    pub fn value_at(&self, key: &str, index: usize) -> Option<f64> {
        self.get(key)?.get(index).copied().filter(|v| !v.is_nan())
    }

    /// First value of `key`, for single-instant tiers.
    pub fn scalar(&self, key: &str) -> Option<f64> {
        self.value_at(key, 0)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Ensemble members of `key`, ordered by member index.
    pub fn members(&self, key: &str) -> Vec<(u32, &[f64])> {
        let prefix = format!("{key}_member");
        let mut members: Vec<(u32, &[f64])> = self
            .variables
            .iter()
            .filter_map(|(k, values)| {
                let member = k.strip_prefix(&prefix)?.parse().ok()?;
                Some((member, values.as_slice()))
            })
            .collect();
        members.sort_by_key(|(member, _)| *member);
        members
    }
}

/// Rebuild the time axis of `block` and collect the variables `selectors` ask for.
///
/// `time[i] = time + i * interval + utc_offset_seconds`. Selectors with no
/// matching tuple leave no key behind.
pub fn normalize(
    block: &RawColumnarBlock,
    selectors: &[VariableSelector],
) -> Result<TimeSeries, NormalizeError> {
    let count = block.sample_count()?;
    if count == 0 {
        return Ok(TimeSeries::default());
    }

    // Timestamps grow with `i`, so bounding both ends bounds every sample.
    let last = count as i64 - 1;
    sample_time(block, 0)?;
    sample_time(block, last)?;

    let time = (0..=last)
        .map(|i| sample_time(block, i))
        .collect::<Result<Vec<_>, _>>()?;

    let mut variables = BTreeMap::new();

    for selector in selectors {
        let matching = block
            .variables
            .iter()
            .filter(|v| selector.matches(&v.variable, v.altitude, v.aggregation));

        for raw in matching {
            let key = selector.output_key(raw.ensemble_member);

            if variables.contains_key(&key) {
                tracing::debug!(%key, "several columns match; keeping the first");
                continue;
            }
            if raw.values.len() != count {
                return Err(NormalizeError::LengthMismatch {
                    key,
                    expected: count,
                    actual: raw.values.len(),
                });
            }
            variables.insert(key, raw.values.clone());
        }
    }

    Ok(TimeSeries { time, variables })
}

/// `time + i * interval + utc_offset_seconds`, or `TimestampOutOfRange` when it
/// overflows or falls outside what `DateTime<Utc>` can hold.
fn sample_time(block: &RawColumnarBlock, i: i64) -> Result<DateTime<Utc>, NormalizeError> {
    let ts = i
        .checked_mul(block.interval)
        .and_then(|step| block.time.checked_add(step))
        .and_then(|t| t.checked_add(block.utc_offset_seconds))
        .ok_or(NormalizeError::TimestampOutOfRange(block.time))?;
    DateTime::from_timestamp(ts, 0).ok_or(NormalizeError::TimestampOutOfRange(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn column(variable: &str, altitude: Option<u32>, values: Vec<f64>) -> RawVariable {
        RawVariable {
            variable: variable.to_string(),
            altitude,
            aggregation: None,
            ensemble_member: None,
            values,
        }
    }

    fn block(time: i64, time_end: i64, interval: i64, variables: Vec<RawVariable>) -> RawColumnarBlock {
        RawColumnarBlock {
            time,
            time_end,
            interval,
            utc_offset_seconds: 0,
            variables,
        }
    }

    #[test]
    fn two_hourly_samples_scenario() {
        let raw = block(0, 7200, 3600, vec![column("temperature", Some(2), vec![10.0, 12.5])]);
        let series = normalize(&raw, &[VariableSelector::from_api_name("temperature_2m")]).unwrap();

        assert_eq!(
            series.time,
            vec![
                Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(1970, 1, 1, 1, 0, 0).unwrap(),
            ]
        );
        assert_eq!(series.get("temperature_2m"), Some(&[10.0, 12.5][..]));
        assert_eq!(series.variables.len(), 1);
    }

    #[test]
    fn time_axis_follows_start_interval_and_offset() {
        for (time, time_end, interval, offset) in [
            (1_700_000_000, 1_700_086_400, 3600, 3600),
            (1_700_000_000, 1_700_604_800, 86_400, -18_000),
            (0, 900, 900, 0),
            (100, 1000, 7, 19_800),
        ] {
            let raw = RawColumnarBlock {
                time,
                time_end,
                interval,
                utc_offset_seconds: offset,
                variables: vec![],
            };
            let series = normalize(&raw, &[]).unwrap();

            let expected = ((time_end - time) / interval) as usize;
            assert_eq!(series.len(), expected);
            for (i, t) in series.time.iter().enumerate() {
                assert_eq!(t.timestamp(), time + i as i64 * interval + offset);
            }
        }
    }

    #[test]
    fn partial_trailing_interval_is_floored() {
        let raw = block(0, 7199, 3600, vec![column("rain", None, vec![0.4])]);
        let series = normalize(&raw, &[VariableSelector::from_api_name("rain")]).unwrap();

        assert_eq!(series.len(), 1);
        assert_eq!(series.get("rain"), Some(&[0.4][..]));
    }

    #[test]
    fn empty_span_yields_empty_series_without_variables() {
        let raw = block(3600, 3600, 3600, vec![column("rain", None, vec![1.0])]);
        let series = normalize(&raw, &[VariableSelector::from_api_name("rain")]).unwrap();

        assert!(series.is_empty());
        assert!(series.variables.is_empty());

        let reversed = block(7200, 0, 3600, vec![]);
        assert!(normalize(&reversed, &[]).unwrap().is_empty());
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        let raw = block(0, 3600, 0, vec![]);
        assert_eq!(normalize(&raw, &[]), Err(NormalizeError::InvalidInterval(0)));
    }

    #[test]
    fn missing_variable_leaves_no_key() {
        let raw = block(0, 3600, 3600, vec![column("temperature", Some(2), vec![4.0])]);
        let selectors = VariableSelector::from_api_names(&["temperature_2m", "snowfall", "wind_speed_10m"]);
        let series = normalize(&raw, &selectors).unwrap();

        assert!(series.get("temperature_2m").is_some());
        assert!(!series.variables.contains_key("snowfall"));
        assert!(!series.variables.contains_key("wind_speed_10m"));
        assert_eq!(series.value_at("snowfall", 0), None);
    }

    #[test]
    fn ensemble_members_get_distinct_keys() {
        let members = (0..3)
            .map(|m| RawVariable {
                variable: "temperature".into(),
                altitude: Some(2),
                aggregation: None,
                ensemble_member: Some(m),
                values: vec![m as f64, m as f64 + 0.5],
            })
            .collect();
        let raw = block(0, 7200, 3600, members);
        let series = normalize(&raw, &[VariableSelector::from_api_name("temperature_2m")]).unwrap();

        assert_eq!(series.variables.len(), 3);
        for m in 0..3u32 {
            let key = format!("temperature_2m_member{m}");
            assert_eq!(series.get(&key), Some(&[m as f64, m as f64 + 0.5][..]));
        }

        let ordered: Vec<u32> = series.members("temperature_2m").iter().map(|(m, _)| *m).collect();
        assert_eq!(ordered, vec![0, 1, 2]);
    }

    #[test]
    fn daily_aggregations_are_told_apart() {
        let agg = |aggregation, v: f64| RawVariable {
            variable: "temperature".into(),
            altitude: Some(2),
            aggregation: Some(aggregation),
            ensemble_member: None,
            values: vec![v],
        };
        let raw = block(0, 86_400, 86_400, vec![agg(Aggregation::Maximum, 21.0), agg(Aggregation::Minimum, 9.0)]);
        let selectors = VariableSelector::from_api_names(&["temperature_2m_min", "temperature_2m_max"]);
        let series = normalize(&raw, &selectors).unwrap();

        assert_eq!(series.scalar("temperature_2m_min"), Some(9.0));
        assert_eq!(series.scalar("temperature_2m_max"), Some(21.0));
    }

    #[test]
    fn length_mismatch_is_reported() {
        let raw = block(0, 7200, 3600, vec![column("rain", None, vec![1.0, 2.0, 3.0])]);
        let err = normalize(&raw, &[VariableSelector::from_api_name("rain")]).unwrap_err();

        assert_eq!(
            err,
            NormalizeError::LengthMismatch {
                key: "rain".into(),
                expected: 2,
                actual: 3,
            }
        );
    }

    #[test]
    fn later_duplicate_is_skipped_before_its_length_is_checked() {
        let raw = block(
            0,
            7200,
            3600,
            vec![column("rain", None, vec![1.0, 2.0]), column("rain", None, vec![9.0])],
        );
        let series = normalize(&raw, &[VariableSelector::from_api_name("rain")]).unwrap();

        assert_eq!(series.get("rain"), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn overflowing_timestamps_are_out_of_range() {
        let near_max = RawColumnarBlock {
            time: i64::MAX - 10,
            time_end: i64::MAX,
            interval: 5,
            utc_offset_seconds: 3600,
            variables: vec![],
        };
        assert!(matches!(normalize(&near_max, &[]), Err(NormalizeError::TimestampOutOfRange(_))));

        let whole_range = block(i64::MIN, i64::MAX, 1, vec![]);
        assert!(matches!(normalize(&whole_range, &[]), Err(NormalizeError::TimestampOutOfRange(_))));
    }

    #[test]
    fn last_sample_past_chrono_range_fails_before_building_the_axis() {
        // Two samples; the second is beyond what DateTime<Utc> can hold.
        let raw = block(0, i64::MAX - 1, i64::MAX / 2, vec![]);
        assert_eq!(raw.sample_count(), Ok(2));
        assert!(matches!(normalize(&raw, &[]), Err(NormalizeError::TimestampOutOfRange(_))));
    }

    #[test]
    fn normalizing_twice_gives_identical_output() {
        let raw = block(
            1_700_000_000,
            1_700_010_800,
            3600,
            vec![
                column("temperature", Some(2), vec![1.0, 2.0, 3.0]),
                column("weather_code", None, vec![0.0, 3.0, 61.0]),
            ],
        );
        let selectors = VariableSelector::from_api_names(&["temperature_2m", "weather_code"]);

        assert_eq!(normalize(&raw, &selectors), normalize(&raw, &selectors));
    }

    #[test]
    fn nan_reads_back_as_none() {
        let raw = block(0, 7200, 3600, vec![column("rain", None, vec![f64::NAN, 0.2])]);
        let series = normalize(&raw, &[VariableSelector::from_api_name("rain")]).unwrap();

        assert_eq!(series.value_at("rain", 0), None);
        assert_eq!(series.value_at("rain", 1), Some(0.2));
        assert_eq!(series.value_at("rain", 2), None);
    }
}
