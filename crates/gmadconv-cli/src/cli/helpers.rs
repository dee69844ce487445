use super::CliError;
use anyhow::Context;
use gmadconv_core::domain::LatticeError;
use gmadconv_core::modules::collimator::OverrideTables;
use gmadconv_core::modules::gmad::SamplerSelection;
use gmadconv_core::modules::mapper::{MapperConfig, MultipoleMode};
use gmadconv_core::modules::serialization::write_text_artifact;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Magnet polarity for twiss-table conversion.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum FlipMode {
    /// Flip when the table describes an electron beam
    #[default]
    Auto,
    Yes,
    No,
}

impl FlipMode {
    pub(super) fn flip_magnets(self) -> Option<bool> {
        match self {
            Self::Auto => None,
            Self::Yes => Some(true),
            Self::No => Some(false),
        }
    }
}

/// Mapper switches shared by `convert`, `convert-tfs` and `test`.
#[derive(clap::Args, Debug, Clone)]
pub(super) struct MapperFlags {
    /// JSON file with collimator and aperture overrides
    #[arg(long)]
    pub(super) overrides: Option<PathBuf>,

    /// Emit sextupoles, octupoles and multipoles instead of drifts/markers
    #[arg(long)]
    pub(super) native_multipoles: bool,

    /// Keep zero-length markers and diagnostics as markers
    #[arg(long)]
    pub(super) keep_zero_length: bool,

    /// Default collimator half-aperture in metres
    #[arg(long, default_value_t = 0.2)]
    pub(super) beam_pipe_radius: f64,
}

pub(super) fn mapper_config(flags: &MapperFlags) -> Result<MapperConfig, CliError> {
    if !flags.beam_pipe_radius.is_finite() || flags.beam_pipe_radius <= 0.0 {
        return Err(CliError::Usage(format!(
            "invalid beam pipe radius '{}'; expected a positive number of metres",
            flags.beam_pipe_radius
        )));
    }

    let mut config = MapperConfig {
        skip_zero_length: !flags.keep_zero_length,
        beam_pipe_radius: flags.beam_pipe_radius,
        multipole_mode: if flags.native_multipoles {
            MultipoleMode::Native
        } else {
            MultipoleMode::Downgrade
        },
        ..MapperConfig::default()
    };

    if let Some(path) = &flags.overrides {
        let tables = OverrideTables::from_path(path).map_err(LatticeError::from)?;
        tracing::info!(
            path = %path.display(),
            collimators = tables.collimators.len(),
            apertures = tables.apertures.len(),
            parameters = tables.parameters.len(),
            "loaded overrides"
        );
        config.collimator_overrides = tables.collimators;
        config.aperture_overrides = tables.apertures;
        config.user_parameters = tables.parameters;
    }

    Ok(config)
}

/// `all`, `none`, or a comma-separated list of element names.
pub(super) fn parse_sampler_selection(raw: &str) -> SamplerSelection {
    match raw.trim().to_ascii_lowercase().as_str() {
        "all" => SamplerSelection::All,
        "none" | "" => SamplerSelection::None,
        _ => SamplerSelection::Named(
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        ),
    }
}

pub(super) fn default_lattice_output(input: &Path) -> PathBuf {
    input.with_extension("gmad")
}

pub(super) fn write_json_report<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize report '{}'", path.display()))?;
    write_text_artifact(path, &json)
        .with_context(|| format!("failed to write report '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        FlipMode, MapperFlags, default_lattice_output, mapper_config, parse_sampler_selection,
    };
    use gmadconv_core::modules::gmad::SamplerSelection;
    use gmadconv_core::modules::mapper::MultipoleMode;
    use std::path::Path;

    fn flags() -> MapperFlags {
        MapperFlags {
            overrides: None,
            native_multipoles: false,
            keep_zero_length: false,
            beam_pipe_radius: 0.2,
        }
    }

    #[test]
    fn sampler_selection_accepts_keywords_and_lists() {
        assert_eq!(parse_sampler_selection("ALL"), SamplerSelection::All);
        assert_eq!(parse_sampler_selection("none"), SamplerSelection::None);
        assert_eq!(
            parse_sampler_selection("IP, QF1 ,"),
            SamplerSelection::Named(vec!["IP".to_string(), "QF1".to_string()])
        );
    }

    #[test]
    fn flags_map_onto_mapper_config() {
        let mut flags = flags();
        flags.native_multipoles = true;
        flags.keep_zero_length = true;
        let config = mapper_config(&flags).expect("valid flags");
        assert!(!config.skip_zero_length);
        assert_eq!(config.multipole_mode, MultipoleMode::Native);
    }

    #[test]
    fn flip_mode_auto_defers_to_the_table() {
        assert_eq!(FlipMode::default().flip_magnets(), None);
        assert_eq!(FlipMode::Yes.flip_magnets(), Some(true));
        assert_eq!(FlipMode::No.flip_magnets(), Some(false));
    }

    #[test]
    fn non_positive_radius_is_a_usage_error() {
        let mut flags = flags();
        flags.beam_pipe_radius = 0.0;
        assert!(mapper_config(&flags).is_err());
    }

    #[test]
    fn output_defaults_beside_the_input() {
        assert_eq!(
            default_lattice_output(Path::new("lattices/bds.saveline")),
            Path::new("lattices/bds.gmad")
        );
    }
}
