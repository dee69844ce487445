//! Collimator override tables and the tab-separated collimator side log.

use crate::domain::{LatticeError, LatticeResult, PropertyValue};
use crate::modules::serialization::{append_text_artifact, format_shortest_f64};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Externally supplied settings for one named collimator.
///
/// Absent sizes fall back to the beam pipe radius, an absent angle to zero
/// and an absent material to copper.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollimatorOverride {
    #[serde(default, alias = "XSIZE")]
    pub xsize: Option<f64>,
    #[serde(default, alias = "YSIZE")]
    pub ysize: Option<f64>,
    #[serde(default, alias = "ANGLE")]
    pub angle: Option<f64>,
    #[serde(default, alias = "bdsim_material")]
    pub material: Option<String>,
}

/// Contents of an overrides JSON file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideTables {
    #[serde(default)]
    pub collimators: BTreeMap<String, CollimatorOverride>,
    /// Circular aperture radius in metres, keyed by element name.
    #[serde(default)]
    pub apertures: BTreeMap<String, f64>,
    /// Extra GMAD parameters written verbatim onto the named component.
    #[serde(default)]
    pub parameters: BTreeMap<String, BTreeMap<String, PropertyValue>>,
}

#[derive(Debug, thiserror::Error)]
pub enum OverridesError {
    #[error("failed to read overrides '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse overrides '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("aperture for '{name}' must be finite and positive, got {radius}")]
    InvalidAperture { name: String, radius: f64 },
}

impl From<OverridesError> for LatticeError {
    fn from(error: OverridesError) -> Self {
        let message = error.to_string();
        match error {
            OverridesError::Read { .. } => LatticeError::io_system("IO.OVERRIDES_READ", message),
            OverridesError::Parse { .. } | OverridesError::InvalidAperture { .. } => {
                LatticeError::input_validation("INPUT.OVERRIDES", message)
            }
        }
    }
}

impl OverrideTables {
    pub fn from_json_str(json: &str) -> Result<Self, OverridesError> {
        Self::parse(json, Path::new("<inline-overrides>"))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, OverridesError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| OverridesError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(json: &str, path: &Path) -> Result<Self, OverridesError> {
        let tables: Self = serde_json::from_str(json).map_err(|source| OverridesError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some((name, radius)) = tables
            .apertures
            .iter()
            .find(|(_, radius)| !radius.is_finite() || **radius <= 0.0)
        {
            return Err(OverridesError::InvalidAperture {
                name: name.clone(),
                radius: *radius,
            });
        }
        Ok(tables)
    }
}

/// A collimator converted from its own properties, reported for review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollimatorLogEntry {
    pub name: String,
    pub angle: f64,
    pub length: f64,
    pub xsize: f64,
    pub ysize: f64,
    pub material: String,
}

impl CollimatorLogEntry {
    pub fn to_log_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            self.name,
            format_shortest_f64(self.angle),
            format_shortest_f64(self.length),
            format_shortest_f64(self.xsize),
            format_shortest_f64(self.ysize),
            self.material
        )
    }
}

/// Appends one line per entry; an empty slice leaves the file untouched.
pub fn append_collimator_log(path: &Path, entries: &[CollimatorLogEntry]) -> LatticeResult<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let content: String = entries.iter().map(CollimatorLogEntry::to_log_line).collect();
    append_text_artifact(path, &content).map_err(|source| {
        LatticeError::io_system(
            "IO.COLLIMATOR_LOG",
            format!(
                "failed to append collimator log '{}': {}",
                path.display(),
                source
            ),
        )
    })?;
    tracing::debug!(path = %path.display(), entries = entries.len(), "appended collimator log");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CollimatorLogEntry, CollimatorOverride, OverrideTables, append_collimator_log};
    use crate::domain::{LatticeError, PropertyValue};
    use std::fs;
    use tempfile::TempDir;

    fn entry(name: &str) -> CollimatorLogEntry {
        CollimatorLogEntry {
            name: name.to_string(),
            angle: 0.0,
            length: 0.5,
            xsize: 0.2,
            ysize: 0.2,
            material: "Copper".to_string(),
        }
    }

    #[test]
    fn override_tables_accept_lower_and_upper_case_keys() {
        let tables = OverrideTables::from_json_str(
            r#"{
                "collimators": {
                    "COL1": {"xsize": 0.01, "YSIZE": 0.002, "bdsim_material": "Titanium"}
                },
                "apertures": {"QF": 0.015}
            }"#,
        )
        .expect("overrides should parse");

        assert_eq!(
            tables.collimators["COL1"],
            CollimatorOverride {
                xsize: Some(0.01),
                ysize: Some(0.002),
                angle: None,
                material: Some("Titanium".to_string()),
            }
        );
        assert_eq!(tables.apertures["QF"], 0.015);
        assert!(tables.parameters.is_empty());
    }

    #[test]
    fn user_parameters_keep_numbers_and_text_apart() {
        let tables = OverrideTables::from_json_str(
            r#"{"parameters": {"QF": {"outerDiameter": 0.3, "magnetGeometryType": "polesfacet"}}}"#,
        )
        .expect("parameters should parse");

        let qf = &tables.parameters["QF"];
        assert_eq!(qf["outerDiameter"], PropertyValue::Number(0.3));
        assert_eq!(
            qf["magnetGeometryType"],
            PropertyValue::Text("polesfacet".to_string())
        );
    }

    #[test]
    fn invalid_override_files_map_to_input_errors() {
        let error: LatticeError = OverrideTables::from_json_str(r#"{"apertures": {"QF": -1.0}}"#)
            .expect_err("negative aperture should fail")
            .into();
        assert_eq!(error.code(), "INPUT.OVERRIDES");

        let error: LatticeError = OverrideTables::from_json_str(r#"{"colimators": {}}"#)
            .expect_err("unknown section should fail")
            .into();
        assert_eq!(error.code(), "INPUT.OVERRIDES");

        let temp = TempDir::new().expect("tempdir should be created");
        let error: LatticeError = OverrideTables::from_path(temp.path().join("missing.json"))
            .expect_err("missing file should fail")
            .into();
        assert_eq!(error.code(), "IO.OVERRIDES_READ");
    }

    #[test]
    fn log_lines_are_tab_separated_in_column_order() {
        assert_eq!(entry("COL2").to_log_line(), "COL2\t0\t0.5\t0.2\t0.2\tCopper\n");
    }

    #[test]
    fn log_numbers_match_the_lattice_number_format() {
        let narrow = CollimatorLogEntry {
            angle: -1.0e-7,
            xsize: 2.5e-5,
            ..entry("COL3")
        };
        assert_eq!(narrow.to_log_line(), "COL3\t-1e-7\t0.5\t2.5e-5\t0.2\tCopper\n");
    }

    #[test]
    fn log_appends_and_skips_empty_batches() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("collimators.dat");

        append_collimator_log(&path, &[]).expect("empty append is a no-op");
        assert!(!path.exists());

        append_collimator_log(&path, &[entry("A")]).expect("append should succeed");
        append_collimator_log(&path, &[entry("B")]).expect("append should succeed");
        let content = fs::read_to_string(&path).expect("log should be readable");
        assert_eq!(content.lines().count(), 2);
        assert!(content.starts_with("A\t"));
    }
}
