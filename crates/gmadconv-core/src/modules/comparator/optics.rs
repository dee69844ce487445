use super::stats::{ResidualSummary, mean};
use crate::common::constants::DEFAULT_MAX_FRACTIONAL_DEVIATION;
use crate::modules::tfs::{Table, TableError};
use crate::numerics::finite_or_zero;
use serde::{Deserialize, Serialize};

/// One optical function with its MAD-X and BDSIM column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OpticalFunction {
    pub label: &'static str,
    pub reference_column: &'static str,
    pub candidate_column: &'static str,
}

const fn function(
    label: &'static str,
    reference_column: &'static str,
    candidate_column: &'static str,
) -> OpticalFunction {
    OpticalFunction {
        label,
        reference_column,
        candidate_column,
    }
}

pub const OPTICAL_FUNCTIONS: [OpticalFunction; 14] = [
    function("beta_x", "BETX", "Beta_x"),
    function("beta_y", "BETY", "Beta_y"),
    function("alpha_x", "ALFX", "Alpha_x"),
    function("alpha_y", "ALFY", "Alpha_y"),
    function("disp_x", "DX", "Disp_x"),
    function("disp_y", "DY", "Disp_y"),
    function("disp_xp", "DPX", "Disp_xp"),
    function("disp_yp", "DPY", "Disp_yp"),
    function("sigma_x", "SIGMAX", "Sigma_x"),
    function("sigma_y", "SIGMAY", "Sigma_y"),
    function("sigma_xp", "SIGMAXP", "Sigma_xp"),
    function("sigma_yp", "SIGMAYP", "Sigma_yp"),
    function("mean_x", "X", "Mean_x"),
    function("mean_y", "Y", "Mean_y"),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonThreshold {
    pub max_fractional_deviation: f64,
}

impl Default for ComparisonThreshold {
    fn default() -> Self {
        Self {
            max_fractional_deviation: DEFAULT_MAX_FRACTIONAL_DEVIATION,
        }
    }
}

/// Which naming convention a table follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpticsSource {
    Madx,
    Bdsim,
}

impl OpticsSource {
    fn column(self, function: &OpticalFunction) -> &'static str {
        match self {
            Self::Madx => function.reference_column,
            Self::Bdsim => function.candidate_column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionComparison {
    pub label: String,
    pub reference_column: String,
    pub candidate_column: String,
    pub points: usize,
    /// Statistics of `reference - candidate` at the aligned points.
    pub residual: ResidualSummary,
    pub fractional_deviation: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpticsComparison {
    pub threshold: ComparisonThreshold,
    pub functions: Vec<FunctionComparison>,
    /// Labels of functions with a column missing on either side.
    pub skipped: Vec<String>,
}

impl OpticsComparison {
    pub fn passed(&self) -> bool {
        self.functions.iter().all(|function| function.passed)
    }

    pub fn function(&self, label: &str) -> Option<&FunctionComparison> {
        self.functions.iter().find(|function| function.label == label)
    }
}

/// Compares MAD-X optics (reference) against BDSIM optics (candidate).
pub fn compare_optics(
    reference: &Table,
    candidate: &Table,
    threshold: ComparisonThreshold,
) -> Result<OpticsComparison, TableError> {
    compare_tables(
        reference,
        OpticsSource::Madx,
        candidate,
        OpticsSource::Bdsim,
        threshold,
    )
}

/// Compares two BDSIM optics tables; `first` serves as the reference.
pub fn compare_candidate_optics(
    first: &Table,
    second: &Table,
    threshold: ComparisonThreshold,
) -> Result<OpticsComparison, TableError> {
    compare_tables(first, OpticsSource::Bdsim, second, OpticsSource::Bdsim, threshold)
}

pub fn compare_tables(
    reference: &Table,
    reference_source: OpticsSource,
    candidate: &Table,
    candidate_source: OpticsSource,
    threshold: ComparisonThreshold,
) -> Result<OpticsComparison, TableError> {
    let candidate_s = candidate.column("S")?;
    let alignment = candidate_s
        .iter()
        .map(|s| reference.nearest_s_index(*s))
        .collect::<Result<Vec<usize>, TableError>>()?;

    let mut functions = Vec::new();
    let mut skipped = Vec::new();

    for optical in &OPTICAL_FUNCTIONS {
        let reference_column = reference_source.column(optical);
        let candidate_column = candidate_source.column(optical);
        let (Ok(reference_values), Ok(candidate_values)) = (
            reference.column(reference_column),
            candidate.column(candidate_column),
        ) else {
            tracing::debug!(function = optical.label, "optical function missing; skipped");
            skipped.push(optical.label.to_string());
            continue;
        };

        let aligned: Vec<f64> = alignment
            .iter()
            .map(|index| reference_values[*index])
            .collect();
        let residuals: Vec<f64> = aligned
            .iter()
            .zip(candidate_values)
            .map(|(lhs, rhs)| lhs - rhs)
            .collect();

        let absolute_reference: Vec<f64> = aligned.iter().map(|value| value.abs()).collect();
        let residual = ResidualSummary::from_values(&residuals);
        let fractional_deviation = finite_or_zero(residual.mean_abs / mean(&absolute_reference));

        functions.push(FunctionComparison {
            label: optical.label.to_string(),
            reference_column: reference_column.to_string(),
            candidate_column: candidate_column.to_string(),
            points: residuals.len(),
            residual,
            fractional_deviation,
            passed: fractional_deviation <= threshold.max_fractional_deviation,
        });
    }

    Ok(OpticsComparison {
        threshold,
        functions,
        skipped,
    })
}

pub fn render_optics_summary(comparison: &OpticsComparison) -> String {
    let mut lines = Vec::new();
    let status = if comparison.passed() { "PASS" } else { "FAIL" };
    lines.push(format!("Optics status: {}", status));
    lines.push(format!(
        "Functions: {} compared ({} failed), {} skipped, threshold: max_fractional_deviation={:.4}",
        comparison.functions.len(),
        comparison
            .functions
            .iter()
            .filter(|function| !function.passed)
            .count(),
        comparison.skipped.len(),
        comparison.threshold.max_fractional_deviation
    ));

    for function in &comparison.functions {
        let function_status = if function.passed { "PASS" } else { "FAIL" };
        lines.push(format!(
            "  {} ({} vs {}): {} points={} fractional_deviation={:.4e} max_abs_residual={:.4e}",
            function.label,
            function.reference_column,
            function.candidate_column,
            function_status,
            function.points,
            function.fractional_deviation,
            function.residual.max_abs
        ));
    }

    if !comparison.skipped.is_empty() {
        lines.push(format!("  skipped: {}", comparison.skipped.join(", ")));
    }

    lines.join("\n")
}
