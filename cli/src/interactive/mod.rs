//! TTY interactive stepping interface.
//!
//! Built on two crates: rustyline handles the line editing, clap parses the
//! interactive commands. Using Parser for a REPL needs a few odd options but
//! works well.

use clap::Parser;
use rustyline::history::DefaultHistory;
use rustyline::{Behavior, CompletionType, Config, EditMode, Editor};
use tracing::{info, warn};
use v64_emulator::runtime::Step;
use v64_emulator::Machine;

mod helper;
use self::helper::ReplHelper;

static HELP: &str = r"
Run 'help [command]' for command-specific help.
An empty line re-runs the last valid command.";

#[derive(Parser, Clone, Debug)]
#[clap(
    help_template = "{about}\n\nCOMMANDS:\n{subcommands}\n{after-help}",
    after_help = HELP,
    disable_version_flag = true,
    infer_subcommands = true,
    no_binary_name = true,
    allow_negative_numbers = true,
)]
/// Interactive mode commands
enum Command {
    /// Execute the next instructions
    #[command(alias = "s")]
    Step {
        /// Number of steps to execute
        #[clap(value_parser, default_value = "1")]
        number: u64,
    },

    /// Run until the program halts
    Continue,

    /// Show the integer unit registers
    Registers,

    /// Show the coprocessor registers
    Float,

    /// Show a block of memory words
    Memory {
        /// First address to show
        #[clap(value_parser)]
        address: u64,

        /// Number of words to show
        #[clap(value_parser, default_value = "1")]
        number: usize,
    },

    /// Show a block of memory words as doubles
    Doubles {
        /// First address to show
        #[clap(value_parser)]
        address: u64,

        /// Number of words to show
        #[clap(value_parser, default_value = "1")]
        number: usize,
    },

    /// Read an I/O port
    Read {
        /// Port number (0-7 word ports, 9 buffer, 10 interrupt port)
        #[clap(value_parser)]
        port: u32,
    },

    /// Write a word to an I/O port
    Write {
        /// Port number (0-7 word ports, 9 buffer, 10 interrupt port)
        #[clap(value_parser)]
        port: u32,

        /// Word to write
        #[clap(value_parser)]
        word: u64,
    },

    /// Show the next few instructions
    List {
        /// Number of instructions to show
        #[clap(value_parser, default_value = "10")]
        number: u64,
    },

    /// Exit the emulator
    Exit,
}

fn show_state(machine: &Machine) {
    let processor = machine.processor();
    info!(
        ip = processor.ip,
        dp = processor.dp,
        flags = ?processor.flags,
        "machine state"
    );
}

fn list_instructions(machine: &Machine, number: u64) {
    let processor = machine.processor();
    for offset in 0..number {
        let position = processor.ip + offset;
        let Ok(index) = usize::try_from(position) else {
            break;
        };
        let Some(instruction) = processor.instructions().get(index) else {
            break;
        };
        let gutter = if offset == 0 { ">" } else { " " };
        info!("{gutter} {position:>4}    {instruction}");
    }
}

#[allow(clippy::too_many_lines)]
pub(crate) fn run_interactive(machine: &mut Machine) {
    info!("Running in interactive mode. Type \"help\" to list available commands.");
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .behavior(Behavior::PreferTerm)
        .auto_add_history(true)
        .build();

    let helper: ReplHelper<Command> = ReplHelper::new();
    let mut editor: Editor<ReplHelper<Command>, DefaultHistory> =
        Editor::with_config(config).expect("terminal input must initialize");
    editor.set_helper(Some(helper));

    let mut last_command: Option<Command> = None;
    let mut halted = false;

    'read: loop {
        // A macro to unwrap an error, log it and continue the loop
        macro_rules! warn_and_continue {
            ($e:expr) => {
                match $e {
                    Ok(o) => o,
                    Err(e) => {
                        tracing::warn!(error = %e);
                        continue 'read;
                    }
                }
            };
        }

        let Ok(readline) = editor.readline(">> ") else {
            info!("EOF, exiting");
            return;
        };

        let command = if readline.is_empty() {
            if let Some(command) = &last_command {
                command.clone()
            } else {
                info!("Type \"help\" to get the list of available commands");
                continue 'read;
            }
        } else {
            let Ok(words) = shell_words::split(readline.as_str()) else {
                warn!("Invalid input");
                continue 'read;
            };

            let command = warn_and_continue!(Command::try_parse_from(words));
            last_command = Some(command.clone());
            command
        };

        match (command, halted) {
            (Command::Exit, _) => break,

            (Command::Step { number }, false) => {
                for _ in 0..number {
                    match machine.step() {
                        Ok(Step::Continue) => {}
                        Ok(Step::Halt) => {
                            info!("Halted");
                            halted = true;
                            continue 'read;
                        }
                        Err(e) => {
                            warn!(error = %e, "Halted");
                            halted = true;
                            continue 'read;
                        }
                    }
                }
                show_state(machine);
            }

            (Command::Continue, false) => loop {
                match machine.step() {
                    Ok(Step::Continue) => {}
                    Ok(Step::Halt) => {
                        info!("Halted");
                        halted = true;
                        continue 'read;
                    }
                    Err(e) => {
                        warn!(error = %e, "Halted");
                        halted = true;
                        continue 'read;
                    }
                }
            },

            (Command::Registers, _) => {
                println!("{}", machine.processor().registers);
                show_state(machine);
            }

            (Command::Float, _) => {
                for (index, value) in machine.processor().coprocessor().registers().iter().enumerate()
                {
                    info!("d{index}: {value}");
                }
            }

            (Command::Memory { address, number }, _) => {
                let words = warn_and_continue!(machine.read_memory(address, number));
                for (index, word) in words.into_iter().enumerate() {
                    let address = address + index as u64 * 8;
                    info!(address, value = word);
                }
            }

            (Command::Doubles { address, number }, _) => {
                let doubles = warn_and_continue!(machine.read_memory_doubles(address, number));
                for (index, value) in doubles.into_iter().enumerate() {
                    let address = address + index as u64 * 8;
                    info!(address, value);
                }
            }

            (Command::Read { port }, _) => {
                let word = warn_and_continue!(machine.read_port(port));
                info!(port, word, "port read");
            }

            (Command::Write { port, word }, false) => {
                warn_and_continue!(machine.write_port(port, word));
                info!(port, word, "port written");
            }

            (Command::List { number }, _) => {
                list_instructions(machine, number);
            }

            (_, true) => {
                // Machine is halted but the user asked to continue, just warn
                warn!("Machine is halted. Use \"exit\" to quit");
            }
        }
    }
}
