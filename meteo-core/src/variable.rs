//! Open-Meteo variable naming.
//!
//! The API names columns like `temperature_2m_max` or
//! `wind_speed_10m_member03`. These are split into a base variable, an
//! altitude in metres, an aggregation and an ensemble member so that
//! selection can match on each part independently.

use serde::{Deserialize, Serialize};

/// Daily/ensemble aggregation suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Minimum,
    Maximum,
    Mean,
    Sum,
    Median,
    P10,
    P25,
    P75,
    P90,
    Dominant,
    Spread,
}

impl Aggregation {
    pub fn suffix(&self) -> &'static str {
        match self {
            Aggregation::Minimum => "min",
            Aggregation::Maximum => "max",
            Aggregation::Mean => "mean",
            Aggregation::Sum => "sum",
            Aggregation::Median => "median",
            Aggregation::P10 => "p10",
            Aggregation::P25 => "p25",
            Aggregation::P75 => "p75",
            Aggregation::P90 => "p90",
            Aggregation::Dominant => "dominant",
            Aggregation::Spread => "spread",
        }
    }

    pub const fn all() -> &'static [Aggregation] {
        &[
            Aggregation::Minimum,
            Aggregation::Maximum,
            Aggregation::Mean,
            Aggregation::Sum,
            Aggregation::Median,
            Aggregation::P10,
            Aggregation::P25,
            Aggregation::P75,
            Aggregation::P90,
            Aggregation::Dominant,
            Aggregation::Spread,
        ]
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::all().iter().copied().find(|a| a.suffix() == suffix)
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A column name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableName {
    pub variable: String,
    pub altitude: Option<u32>,
    pub aggregation: Option<Aggregation>,
    pub ensemble_member: Option<u32>,
}

impl VariableName {
    /// Split an API column name.
    ///
    /// `temperature_2m_max` → (`temperature`, 2, max, -),
    /// `precipitation_hours` → (`precipitation_hours`, -, -, -),
    /// `wind_speed_10m_member07` → (`wind_speed`, 10, -, 7).
    pub fn parse(name: &str) -> Self {
        let mut rest = name;

        let mut ensemble_member = None;
        if let Some((head, tail)) = rest.rsplit_once("_member") {
            if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
                ensemble_member = tail.parse().ok();
                rest = head;
            }
        }

        let mut aggregation = None;
        if let Some((head, tail)) = rest.rsplit_once('_') {
            if let Some(agg) = Aggregation::from_suffix(tail) {
                aggregation = Some(agg);
                rest = head;
            }
        }

        let mut altitude = None;
        if let Some((head, tail)) = rest.rsplit_once('_') {
            if let Some(metres) = tail.strip_suffix('m').and_then(parse_digits) {
                altitude = Some(metres);
                rest = head;
            }
        }

        Self {
            variable: rest.to_string(),
            altitude,
            aggregation,
            ensemble_member,
        }
    }
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Predicate over raw variable tuples plus the key matches are stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSelector {
    pub key: String,
    pub variable: String,
    pub altitude: Option<u32>,
    pub aggregation: Option<Aggregation>,
}

impl VariableSelector {
    /// Selector on `variable` with no altitude or aggregation constraint.
    pub fn new(key: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            variable: variable.into(),
            altitude: None,
            aggregation: None,
        }
    }

    pub fn at_altitude(mut self, metres: u32) -> Self {
        self.altitude = Some(metres);
        self
    }

    pub fn aggregated(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Selector for a requested API variable name, keyed by that name.
    pub fn from_api_name(name: &str) -> Self {
        let parsed = VariableName::parse(name);
        Self {
            key: name.to_string(),
            variable: parsed.variable,
            altitude: parsed.altitude,
            aggregation: parsed.aggregation,
        }
    }

    pub fn from_api_names<S: AsRef<str>>(names: &[S]) -> Vec<Self> {
        names.iter().map(|n| Self::from_api_name(n.as_ref())).collect()
    }

    /// Unconstrained fields match anything; constrained ones need equality.
    pub fn matches(&self, variable: &str, altitude: Option<u32>, aggregation: Option<Aggregation>) -> bool {
        self.variable == variable
            && self.altitude.is_none_or(|want| altitude == Some(want))
            && self.aggregation.is_none_or(|want| aggregation == Some(want))
    }

    /// Output key for a tuple, with the ensemble member appended when present.
    pub fn output_key(&self, member: Option<u32>) -> String {
        match member {
            Some(n) => format!("{}_member{n}", self.key),
            None => self.key.clone(),
        }
    }
}
