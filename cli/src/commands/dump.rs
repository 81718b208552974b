use camino::Utf8PathBuf;
use clap::{Parser, ValueHint};
use tracing::{debug, info};
use v64_emulator::constants as C;
use v64_emulator::Machine;

use super::run::report_assembly_errors;

#[derive(Parser, Debug)]
pub struct DumpOpt {
    /// Input file
    #[clap(value_parser, value_hint = ValueHint::FilePath)]
    input: Utf8PathBuf,
}

impl DumpOpt {
    pub fn exec(self) -> anyhow::Result<()> {
        info!(path = %self.input, "Reading program");
        let source = std::fs::read_to_string(&self.input)?;
        let name = self.input.file_stem().unwrap_or("program").to_string();

        debug!(%name, "Assembling program");
        let mut machine = Machine::default();
        if let Err(errors) = machine.assemble(&name, &source) {
            report_assembly_errors(&source, errors);
        }

        let Some(program) = machine.program(&name) else {
            return Ok(());
        };

        let table = program.jump_table();
        println!("entry: {}", table.entry());
        for cause in 0..8 {
            if let Some(handler) = table.handler(cause) {
                println!("isr_{cause}: {handler}");
            }
        }

        println!("data segment, {} bytes:", program.data().len());
        for (row, chunk) in program.data().chunks(16).enumerate() {
            let address = C::DATA_START as usize + row * 16;
            let bytes: Vec<String> = chunk.iter().map(|byte| format!("{byte:02x}")).collect();
            println!("{address:>5}: {}", bytes.join(" "));
        }

        Ok(())
    }
}
