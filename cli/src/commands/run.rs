use std::process::exit;

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, ValueHint};
use tracing::{debug, info};
use v64_emulator::assembler::AssemblyError;
use v64_emulator::Machine;

use crate::interactive::run_interactive;

#[derive(Parser, Debug)]
pub struct RunOpt {
    /// Input file
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    input: Utf8PathBuf,

    /// Run the program in interactive mode
    #[clap(short, long, action = ArgAction::SetTrue)]
    interactive: bool,
}

pub(crate) fn report_assembly_errors(source: &str, errors: Vec<AssemblyError>) -> ! {
    for error in errors {
        let report = miette::Report::new(error).with_source_code(source.to_string());
        eprintln!("{report:?}");
    }
    exit(1);
}

impl RunOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        info!(path = %self.input, "Reading program");
        let source = std::fs::read_to_string(&self.input)?;
        let name = self.input.file_stem().unwrap_or("program").to_string();

        debug!(%name, "Assembling program");
        let mut machine = Machine::default();
        if let Err(errors) = machine.assemble(&name, &source) {
            report_assembly_errors(&source, errors);
        }

        if self.interactive {
            machine.load(&name)?;
            run_interactive(&mut machine);
        } else {
            machine.run(&name)?;
            info!("End of program");
            println!("{}", machine.processor().registers);
        }

        Ok(())
    }
}
