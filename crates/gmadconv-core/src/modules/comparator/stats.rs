use crate::numerics::{finite_or_zero, stable_sum};
use serde::Serialize;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    stable_sum(values) / values.len() as f64
}

/// Population standard deviation (divides by `n`).
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let centre = mean(values);
    let squares: Vec<f64> = values
        .iter()
        .map(|value| (value - centre) * (value - centre))
        .collect();
    (stable_sum(&squares) / values.len() as f64).sqrt()
}

/// `(reference - candidate) / reference`, with zero for undefined ratios.
pub fn fractional_difference(reference: f64, candidate: f64) -> f64 {
    finite_or_zero((reference - candidate) / reference)
}

pub fn residuals(reference: &[f64], candidate: &[f64]) -> Vec<f64> {
    reference
        .iter()
        .zip(candidate)
        .map(|(lhs, rhs)| lhs - rhs)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualSummary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub mean_abs: f64,
    pub max_abs: f64,
}

impl ResidualSummary {
    pub fn from_values(values: &[f64]) -> Self {
        let absolute: Vec<f64> = values.iter().map(|value| value.abs()).collect();
        Self {
            count: values.len(),
            mean: mean(values),
            std: population_std(values),
            mean_abs: mean(&absolute),
            max_abs: absolute.iter().copied().fold(0.0, f64::max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResidualBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    /// Standard error of the bin mean, zero for empty bins.
    pub error: f64,
}

impl ResidualBin {
    pub fn centre(&self) -> f64 {
        0.5 * (self.lower + self.upper)
    }
}

/// Bins `residuals` by `coordinates` into `bin_count` equal-width bins over
/// the coordinate range. The last bin includes its upper edge.
pub fn bin_residuals(coordinates: &[f64], residuals: &[f64], bin_count: usize) -> Vec<ResidualBin> {
    if bin_count == 0 || coordinates.is_empty() {
        return Vec::new();
    }

    let lower = coordinates.iter().copied().fold(f64::INFINITY, f64::min);
    let upper = coordinates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // Degenerate ranges widen to +-0.5 around the single value.
    let (lower, upper) = if upper > lower {
        (lower, upper)
    } else {
        (lower - 0.5, upper + 0.5)
    };
    let width = (upper - lower) / bin_count as f64;

    let mut members: Vec<Vec<f64>> = vec![Vec::new(); bin_count];
    for (coordinate, residual) in coordinates.iter().zip(residuals) {
        let slot = (((coordinate - lower) / width) as usize).min(bin_count - 1);
        members[slot].push(*residual);
    }

    members
        .iter()
        .enumerate()
        .map(|(index, values)| {
            let std = population_std(values);
            ResidualBin {
                lower: lower + width * index as f64,
                upper: lower + width * (index + 1) as f64,
                count: values.len(),
                mean: mean(values),
                std,
                error: finite_or_zero(std / (values.len() as f64).sqrt()),
            }
        })
        .collect()
}
