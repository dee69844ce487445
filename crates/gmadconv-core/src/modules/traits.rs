use crate::domain::{LatticeResult, PropertyValue};
use crate::modules::gmad::{Beam, Component, SamplerSelection};
use crate::modules::harness::{CommandSpec, CommandOutcome};
use std::path::Path;

/// Sink for converted lattice components.
pub trait LatticeBuilder {
    fn add_component(&mut self, component: Component);
    fn add_beam(&mut self, beam: Beam);
    fn add_sampler(&mut self, selection: SamplerSelection);
    fn set_option(&mut self, name: &str, value: PropertyValue);
    fn write_lattice(&self, path: &Path) -> LatticeResult<()>;
}

/// Runs one external simulation step to completion.
pub trait SimulationRunner {
    fn run(&self, command: &CommandSpec) -> LatticeResult<CommandOutcome>;
}

#[cfg(test)]
mod tests {
    use super::{LatticeBuilder, SimulationRunner};
    use crate::domain::{LatticeError, LatticeErrorCategory, LatticeResult, PropertyValue};
    use crate::modules::gmad::{Beam, Component, SamplerSelection};
    use crate::modules::harness::{CommandOutcome, CommandSpec};
    use std::path::Path;

    #[derive(Default)]
    struct CountingBuilder {
        components: usize,
        options: usize,
    }

    impl LatticeBuilder for CountingBuilder {
        fn add_component(&mut self, _component: Component) {
            self.components += 1;
        }

        fn add_beam(&mut self, _beam: Beam) {}

        fn add_sampler(&mut self, _selection: SamplerSelection) {}

        fn set_option(&mut self, _name: &str, _value: PropertyValue) {
            self.options += 1;
        }

        fn write_lattice(&self, _path: &Path) -> LatticeResult<()> {
            Err(LatticeError::io_system("IO.GMAD_WRITE", "read-only builder"))
        }
    }

    struct FailingRunner;

    impl SimulationRunner for FailingRunner {
        fn run(&self, command: &CommandSpec) -> LatticeResult<CommandOutcome> {
            Err(LatticeError::computation(
                "RUN.EXTERNAL_PROCESS",
                format!("'{}' is unavailable", command.program),
            ))
        }
    }

    #[test]
    fn builder_trait_accepts_custom_sinks() {
        let mut builder = CountingBuilder::default();
        builder.add_component(Component::drift("D1", 1.0));
        builder.set_option("ngenerate", PropertyValue::Number(10.0));

        assert_eq!(builder.components, 1);
        assert_eq!(builder.options, 1);
        let error = builder
            .write_lattice(Path::new("unused.gmad"))
            .expect_err("sink refuses writes");
        assert_eq!(error.category(), LatticeErrorCategory::IoSystemError);
    }

    #[test]
    fn runner_trait_uses_shared_error_types() {
        let command = CommandSpec::new("madx");
        let error = FailingRunner.run(&command).expect_err("runner should fail");
        assert_eq!(error.exit_code(), 4);
        assert_eq!(error.code(), "RUN.EXTERNAL_PROCESS");
    }
}
