use camino::Utf8PathBuf;
use clap::{Parser, ValueHint};
use tracing::{debug, info};
use v64_emulator::Machine;

use super::run::report_assembly_errors;

#[derive(Parser, Debug)]
pub struct PrintOpt {
    /// Input file
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    input: Utf8PathBuf,
}

impl PrintOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        info!(path = %self.input, "Reading program");
        let source = std::fs::read_to_string(&self.input)?;
        let name = self.input.file_stem().unwrap_or("program").to_string();

        debug!(%name, "Assembling program");
        let mut machine = Machine::default();
        if let Err(errors) = machine.assemble(&name, &source) {
            report_assembly_errors(&source, errors);
        }

        if let Some(program) = machine.program(&name) {
            println!("{program}");
        }

        Ok(())
    }
}
