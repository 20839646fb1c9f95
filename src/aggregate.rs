use crate::error::{ExtractError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Summary applied to the cell values intersecting an area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Mean,
    Min,
    Max,
    Median,
    Sum,
    Sd,
    Count,
}

impl AggregateFn {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFn::Mean => "mean",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Median => "median",
            AggregateFn::Sum => "sum",
            AggregateFn::Sd => "sd",
            AggregateFn::Count => "count",
        }
    }

    /// Apply to `values`, skipping NaN cells.
    ///
    /// Returns NaN when no valid value remains, `count` included.
    pub fn apply(&self, values: &[f64]) -> f64 {
        let mut valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if valid.is_empty() {
            return f64::NAN;
        }

        let n = valid.len() as f64;
        match self {
            AggregateFn::Mean => valid.iter().sum::<f64>() / n,
            AggregateFn::Min => valid.iter().copied().fold(f64::INFINITY, f64::min),
            AggregateFn::Max => valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggregateFn::Sum => valid.iter().sum(),
            AggregateFn::Count => n,
            AggregateFn::Median => {
                valid.sort_by(|a, b| a.total_cmp(b));
                let mid = valid.len() / 2;
                if valid.len() % 2 == 0 {
                    (valid[mid - 1] + valid[mid]) / 2.0
                } else {
                    valid[mid]
                }
            }
            AggregateFn::Sd => {
                // Sample standard deviation; undefined for a single value
                if valid.len() < 2 {
                    return f64::NAN;
                }
                let mean = valid.iter().sum::<f64>() / n;
                let ss: f64 = valid.iter().map(|v| (v - mean) * (v - mean)).sum();
                (ss / (n - 1.0)).sqrt()
            }
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateFn {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "avg" => Ok(AggregateFn::Mean),
            "min" => Ok(AggregateFn::Min),
            "max" => Ok(AggregateFn::Max),
            "median" => Ok(AggregateFn::Median),
            "sum" => Ok(AggregateFn::Sum),
            "sd" | "std" => Ok(AggregateFn::Sd),
            "count" | "n" => Ok(AggregateFn::Count),
            other => Err(ExtractError::UnknownAggregate(other.to_string())),
        }
    }
}

impl Serialize for AggregateFn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Parse a comma-separated list such as `mean,max`, keeping order and dropping repeats
pub fn parse_aggregates(list: &str) -> Result<Vec<AggregateFn>> {
    let mut fns = Vec::new();
    for part in list.split(',').filter(|p| !p.trim().is_empty()) {
        let f: AggregateFn = part.parse()?;
        if !fns.contains(&f) {
            fns.push(f);
        }
    }
    Ok(fns)
}
