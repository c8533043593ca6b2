use serde::Serialize;
use subsim_core::{SimError, SimResult};

/// Per-step histograms sharing one set of bin edges
///
/// `counts[step][bin]`; `bin_edges` has `n_bins + 1` entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub counts: Vec<Vec<f64>>,
    pub bin_edges: Vec<f64>,
}

impl Histogram {
    /// Bin a `run_count x step_count` matrix, one row of counts per step
    ///
    /// Without an explicit range the bounds are scanned over every finite
    /// value; a degenerate scan (all values equal) is widened by 0.5 on each
    /// side. Values equal to the upper bound land in the last bin, values
    /// outside an explicit range and non-finite values are dropped. With
    /// `density`, each row is scaled by `1 / (total * bin_width)`; rows with
    /// no counts stay zero.
    ///
    /// Bounds may span more than `f64::MAX`; a bin width that is not a
    /// positive finite number is rejected.
    pub fn build(
        matrix: &[Vec<f64>],
        step_count: usize,
        n_bins: usize,
        density: bool,
        range: Option<(f64, f64)>,
    ) -> SimResult<Self> {
        if n_bins == 0 {
            return Err(SimError::InvalidArgument(
                "n_bins must be positive".to_string(),
            ));
        }
        let (min, max) = match range {
            Some(range) => validate_range(range)?,
            None => scan_range(matrix),
        };

        // Work in half-scale so `max - min` cannot overflow
        let half_min = min * 0.5;
        let half_width = (max * 0.5 - half_min) / n_bins as f64;
        let width = half_width * 2.0;
        if !width.is_finite() || width <= 0.0 {
            return Err(SimError::InvalidArgument(format!(
                "range ({}, {}) over {} bins has no representable bin width",
                min, max, n_bins
            )));
        }

        let mut bin_edges: Vec<f64> = (0..n_bins)
            .map(|i| (half_min + i as f64 * half_width) * 2.0)
            .collect();
        bin_edges.push(max);

        let bin_of = |value: f64| -> Option<usize> {
            if !value.is_finite() || value < min || value > max {
                return None;
            }
            let idx = ((value * 0.5 - half_min) / half_width).floor() as usize;
            Some(idx.min(n_bins - 1))
        };

        let mut counts = vec![vec![0.0; n_bins]; step_count];
        for row in matrix {
            for (step, &value) in row.iter().enumerate().take(step_count) {
                if let Some(bin) = bin_of(value) {
                    counts[step][bin] += 1.0;
                }
            }
        }

        if density {
            for step_counts in &mut counts {
                let total: f64 = step_counts.iter().sum();
                if total > 0.0 {
                    step_counts.iter_mut().for_each(|c| *c = *c / total / width);
                }
            }
        }

        Ok(Self { counts, bin_edges })
    }

    pub fn n_bins(&self) -> usize {
        self.bin_edges.len().saturating_sub(1)
    }

    pub fn bin_width(&self) -> f64 {
        match (self.bin_edges.first(), self.bin_edges.last()) {
            (Some(lo), Some(hi)) if self.n_bins() > 0 => {
                (hi * 0.5 - lo * 0.5) / self.n_bins() as f64 * 2.0
            }
            _ => 0.0,
        }
    }
}

fn validate_range((min, max): (f64, f64)) -> SimResult<(f64, f64)> {
    if !min.is_finite() || !max.is_finite() || min >= max {
        return Err(SimError::InvalidArgument(format!(
            "histogram range ({}, {}) must be finite with min < max",
            min, max
        )));
    }
    Ok((min, max))
}

fn scan_range(matrix: &[Vec<f64>]) -> (f64, f64) {
    let (min, max) = matrix
        .iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if min > max {
        // No finite values at all
        (0.0, 1.0)
    } else if min == max {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    }
}
