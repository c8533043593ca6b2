//! Cross-run statistics over `run_count x step_count` history matrices
//!
//! Rows are runs and columns are steps. Per-step values aggregate a column;
//! the overall value aggregates every cell of the matrix at once (pooled),
//! not the per-step results.
//!
//! Variance is the population variance (divides by N).

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use subsim_core::SimError;

/// Axis over which an aggregate is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Domain {
    /// Across runs, once per step index
    #[default]
    Step,
}

impl FromStr for Domain {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "step" => Ok(Domain::Step),
            other => Err(SimError::UnsupportedDomain(other.to_string())),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Step => write!(f, "step"),
        }
    }
}

/// Supported reductions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Mean,
    Variance,
    StdDev,
    Min,
    Max,
    Sum,
    Median,
}

impl Aggregate {
    /// Reduce a slice; NaN for an empty slice
    pub fn apply(self, values: &[f64]) -> f64 {
        match self {
            Aggregate::Median => median(values),
            _ => {
                let mut summary = Summary::default();
                values.iter().for_each(|&v| summary.push(v));
                summary.read(self)
            }
        }
    }
}

/// Per-step values plus one pooled value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticalResult {
    pub values: Vec<f64>,
    pub overall: f64,
}

/// Streaming accumulator (Welford mean/variance, min, max, sum)
#[derive(Debug, Clone, Copy)]
struct Summary {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    sum: f64,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }
}

impl Summary {
    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
    }

    fn read(&self, aggregate: Aggregate) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        match aggregate {
            Aggregate::Mean => self.mean,
            Aggregate::Variance => self.variance(),
            Aggregate::StdDev => self.variance().sqrt(),
            Aggregate::Min => self.min,
            Aggregate::Max => self.max,
            Aggregate::Sum => self.sum,
            // Median needs the full sample, see `median`
            Aggregate::Median => f64::NAN,
        }
    }

    fn variance(&self) -> f64 {
        (self.m2 / self.count as f64).max(0.0)
    }
}

/// 50th percentile; even counts average the two middle values
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Aggregate a rectangular history matrix along `domain`
pub fn aggregate(
    matrix: &[Vec<f64>],
    step_count: usize,
    aggregate: Aggregate,
    domain: Domain,
) -> StatisticalResult {
    match domain {
        Domain::Step => aggregate_by_step(matrix, step_count, aggregate),
    }
}

fn aggregate_by_step(
    matrix: &[Vec<f64>],
    step_count: usize,
    aggregate: Aggregate,
) -> StatisticalResult {
    if aggregate == Aggregate::Median {
        let values = (0..step_count)
            .map(|step| {
                let column: Vec<f64> = matrix.iter().map(|row| row[step]).collect();
                median(&column)
            })
            .collect();
        let cells: Vec<f64> = matrix.iter().flatten().copied().collect();
        return StatisticalResult {
            values,
            overall: median(&cells),
        };
    }

    let mut per_step = vec![Summary::default(); step_count];
    let mut overall = Summary::default();
    for row in matrix {
        for (summary, &value) in per_step.iter_mut().zip(row) {
            summary.push(value);
            overall.push(value);
        }
    }

    StatisticalResult {
        values: per_step.iter().map(|s| s.read(aggregate)).collect(),
        overall: overall.read(aggregate),
    }
}
