use super::stats::{
    ResidualBin, ResidualSummary, bin_residuals, fractional_difference, population_std, residuals,
};
use crate::common::constants::RESIDUAL_BIN_COUNT;
use crate::domain::{LatticeError, LatticeResult};
use crate::modules::serialization::format_scientific_f64;
use crate::modules::tfs::{Table, TableError};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Coordinate {
    X,
    Xp,
    Y,
    Yp,
}

impl Coordinate {
    pub const ALL: [Coordinate; 4] = [Self::X, Self::Xp, Self::Y, Self::Yp];
    const ALL_STDEV_ORDER: [Coordinate; 4] = [Self::X, Self::Y, Self::Xp, Self::Yp];

    pub fn label(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Xp => "xp",
            Self::Y => "y",
            Self::Yp => "yp",
        }
    }

    /// Column name in MAD-X/PTC tracking tables.
    pub fn reference_column(self) -> &'static str {
        match self {
            Self::X => "X",
            Self::Xp => "PX",
            Self::Y => "Y",
            Self::Yp => "PY",
        }
    }

    /// Column name in BDSIM sampler output.
    pub fn candidate_column(self) -> &'static str {
        self.label()
    }
}

/// Transverse phase-space coordinates of one particle set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhaseSpace {
    pub x: Vec<f64>,
    pub xp: Vec<f64>,
    pub y: Vec<f64>,
    pub yp: Vec<f64>,
}

impl PhaseSpace {
    pub fn from_reference_table(table: &Table) -> Result<Self, TableError> {
        Self::from_table(table, Coordinate::reference_column)
    }

    pub fn from_candidate_table(table: &Table) -> Result<Self, TableError> {
        Self::from_table(table, Coordinate::candidate_column)
    }

    fn from_table(table: &Table, column: fn(Coordinate) -> &'static str) -> Result<Self, TableError> {
        Ok(Self {
            x: table.column(column(Coordinate::X))?.to_vec(),
            xp: table.column(column(Coordinate::Xp))?.to_vec(),
            y: table.column(column(Coordinate::Y))?.to_vec(),
            yp: table.column(column(Coordinate::Yp))?.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn coordinate(&self, coordinate: Coordinate) -> &[f64] {
        match coordinate {
            Coordinate::X => &self.x,
            Coordinate::Xp => &self.xp,
            Coordinate::Y => &self.y,
            Coordinate::Yp => &self.yp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateComparison {
    pub coordinate: Coordinate,
    /// Statistics of `reference - candidate` per particle.
    pub residual: ResidualSummary,
    pub reference_std: f64,
    pub candidate_std: f64,
    pub fractional_std_error: f64,
    /// Residuals binned over the reference coordinate.
    pub bins: Vec<ResidualBin>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionComparison {
    pub particles: usize,
    pub coordinates: Vec<CoordinateComparison>,
}

impl DistributionComparison {
    pub fn coordinate(&self, coordinate: Coordinate) -> Option<&CoordinateComparison> {
        self.coordinates
            .iter()
            .find(|entry| entry.coordinate == coordinate)
    }

    /// Standard deviation summary in the `<stem>_stdev.txt` layout.
    pub fn render_stdev_table(&self, stem: &str) -> String {
        let pick = |coordinate: Coordinate| {
            self.coordinate(coordinate)
                .map(|entry| {
                    (
                        entry.candidate_std,
                        entry.reference_std,
                        entry.fractional_std_error,
                    )
                })
                .unwrap_or((0.0, 0.0, 0.0))
        };

        let mut stds = Vec::with_capacity(8);
        let mut errors = Vec::with_capacity(4);
        for coordinate in Coordinate::ALL_STDEV_ORDER {
            let (candidate, reference, error) = pick(coordinate);
            stds.push(format_scientific_f64(candidate, 4));
            stds.push(format_scientific_f64(reference, 4));
            errors.push(format_scientific_f64(error, 4));
        }

        let mut out = format!(
            "{} Standard Deviations (particles = {}): \n",
            stem, self.particles
        );
        out.push_str(
            "BDSIM_X \t MX-PTC_X \t BDSIM_Y \t MX-PTC_Y \t BDSIM_XP \t MX-PTC_XP \t BDSIM_YP \t MX-PTC_YP \t FRCERR_X \t FRCERR_Y \t FRCERR_XP \t FRCERR_YP \n",
        );
        stds.extend(errors);
        out.push_str(&stds.join("\t"));
        out.push('\n');
        out
    }
}

pub fn compare_distributions(
    reference: &PhaseSpace,
    candidate: &PhaseSpace,
) -> LatticeResult<DistributionComparison> {
    if reference.len() != candidate.len() {
        return Err(LatticeError::computation(
            "COMPARE.PARTICLE_COUNT",
            format!(
                "reference has {} particles but candidate has {}",
                reference.len(),
                candidate.len()
            ),
        ));
    }

    let coordinates = Coordinate::ALL
        .iter()
        .map(|&coordinate| {
            let lhs = reference.coordinate(coordinate);
            let rhs = candidate.coordinate(coordinate);
            let diff = residuals(lhs, rhs);
            let reference_std = population_std(lhs);
            let candidate_std = population_std(rhs);
            CoordinateComparison {
                coordinate,
                residual: ResidualSummary::from_values(&diff),
                reference_std,
                candidate_std,
                fractional_std_error: fractional_difference(reference_std, candidate_std),
                bins: bin_residuals(lhs, &diff, RESIDUAL_BIN_COUNT),
            }
        })
        .collect();

    Ok(DistributionComparison {
        particles: reference.len(),
        coordinates,
    })
}

#[cfg(test)]
mod tests {
    use super::{Coordinate, PhaseSpace, compare_distributions};
    use crate::domain::LatticeErrorCategory;
    use crate::modules::tfs::parse_table;

    fn phase_space(scale: f64) -> PhaseSpace {
        PhaseSpace {
            x: vec![-1.0 * scale, 1.0 * scale],
            xp: vec![-2.0 * scale, 2.0 * scale],
            y: vec![-3.0 * scale, 3.0 * scale],
            yp: vec![0.0, 0.0],
        }
    }

    #[test]
    fn reference_and_candidate_tables_use_their_own_column_names() {
        let reference = parse_table("* NUMBER X PX Y PY\n$ %d %le %le %le %le\n1 1 2 3 4\n")
            .expect("reference table");
        let candidate = parse_table("# x xp y yp z\n1 2 3 4 0\n").expect("candidate table");

        let reference = PhaseSpace::from_reference_table(&reference).expect("reference columns");
        let candidate = PhaseSpace::from_candidate_table(&candidate).expect("candidate columns");
        assert_eq!(reference, candidate);
    }

    #[test]
    fn identical_sets_have_zero_residuals() {
        let comparison =
            compare_distributions(&phase_space(1.0), &phase_space(1.0)).expect("compare");
        assert_eq!(comparison.particles, 2);
        for entry in &comparison.coordinates {
            assert_eq!(entry.residual.max_abs, 0.0);
            assert_eq!(entry.fractional_std_error, 0.0);
            assert_eq!(entry.bins.len(), 15);
        }
    }

    #[test]
    fn fractional_std_error_is_relative_to_reference() {
        let comparison =
            compare_distributions(&phase_space(2.0), &phase_space(1.0)).expect("compare");
        let x = comparison.coordinate(Coordinate::X).expect("x entry");
        assert_eq!(x.reference_std, 2.0);
        assert_eq!(x.candidate_std, 1.0);
        assert_eq!(x.fractional_std_error, 0.5);

        // Zero reference spread gives zero, not NaN.
        let yp = comparison.coordinate(Coordinate::Yp).expect("yp entry");
        assert_eq!(yp.fractional_std_error, 0.0);
    }

    #[test]
    fn particle_count_mismatch_is_a_computation_error() {
        let mut candidate = phase_space(1.0);
        candidate.x.pop();
        candidate.xp.pop();
        candidate.y.pop();
        candidate.yp.pop();

        let error = compare_distributions(&phase_space(1.0), &candidate)
            .expect_err("mismatch should fail");
        assert_eq!(error.code(), "COMPARE.PARTICLE_COUNT");
        assert_eq!(error.category(), LatticeErrorCategory::ComputationError);
    }

    #[test]
    fn stdev_table_keeps_column_layout() {
        let comparison =
            compare_distributions(&phase_space(2.0), &phase_space(1.0)).expect("compare");
        let table = comparison.render_stdev_table("fodo");
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "fodo Standard Deviations (particles = 2): ");
        assert!(lines[1].starts_with("BDSIM_X \t MX-PTC_X \t BDSIM_Y"));
        let values: Vec<&str> = lines[2].split('\t').collect();
        assert_eq!(values.len(), 12);
        assert_eq!(values[0], "1.0000e+00");
        assert_eq!(values[1], "2.0000e+00");
        assert_eq!(values[8], "5.0000e-01");
    }
}
