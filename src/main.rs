// File: src/main.rs
//
// Command-line driver for Slate. Compiles and runs scripts, prints
// disassembly, builds program images, and hosts the interactive debugger
// shell. Registers a small set of print externals so scripts run from the
// command line can produce output through the host bridge.

use clap::{Parser as ClapParser, Subcommand};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use slate::bytecode::{Literal, Type, Variable};
use slate::compiler;
use slate::debugger::Debugger;
use slate::image;
use slate::program::{ExternalFunction, Program};
use slate::vm::ByteCodeVm;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

#[derive(ClapParser)]
#[command(
    name = "slate",
    about = "Slate: a small, statically typed scripting language",
    version = env!("CARGO_PKG_VERSION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(arg_required_else_help = true)]
enum Commands {
    /// Compile and run a script (.sl source or .slb image)
    Run {
        /// Path to the script
        file: PathBuf,

        /// Dump the final VM state after the program halts
        #[arg(long)]
        state: bool,
    },

    /// Print the compiled bytecode listing
    Disasm {
        /// Path to the .sl file
        file: PathBuf,

        /// Emit the program as JSON instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// Compile a script into a program image
    Build {
        /// Path to the .sl file
        file: PathBuf,

        /// Output path (defaults to the input with an .slb extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Debug a script interactively
    Debug {
        /// Path to the script
        file: PathBuf,

        /// Breakpoints to set before execution starts
        #[arg(short = 'b', long = "breakpoint")]
        breakpoints: Vec<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, state } => {
            let program = load_program(&file);
            let mut vm = ByteCodeVm::new(&program);
            vm.execute();

            if state {
                vm.print();
            }
        }

        Commands::Disasm { file, json } => {
            let program = load_program(&file);

            if json {
                let rendered = serde_json::to_string_pretty(&program)
                    .expect("a compiled program serializes to JSON");
                println!("{}", rendered);
            } else {
                program.print(None);
            }
        }

        Commands::Build { file, output } => {
            let program = load_program(&file);
            let output = output.unwrap_or_else(|| file.with_extension("slb"));

            fs::write(&output, image::save(&program)).expect("failed to write the program image");
            println!("wrote {}", output.display());
        }

        Commands::Debug { file, breakpoints } => {
            let program = load_program(&file);
            run_debug_shell(&program, &breakpoints);
        }
    }
}

/// Compiles a .sl source file, or loads a .slb image and re-binds the host
/// externals by name. Compile errors are rendered and terminate the
/// process.
fn load_program(file: &Path) -> Program {
    if file.extension().map(|ext| ext == "slb").unwrap_or(false) {
        let bytes = fs::read(file).expect("failed to read the program image");
        return match image::load(&bytes, &host_external_functions()) {
            Ok(program) => program,
            Err(error) => {
                eprintln!("{} {}", "error:".red().bold(), error);
                exit(1);
            }
        };
    }

    let text = fs::read_to_string(file).expect("failed to read the source file");
    let result = compiler::compile(&text, host_external_functions());

    if let Some(error) = result.error {
        eprintln!("{}", error);
        exit(1);
    }

    result.program
}

/// The externals every CLI-run script gets: typed print procedures.
fn host_external_functions() -> Vec<ExternalFunction> {
    vec![
        ExternalFunction::new(
            Type::Void,
            "print",
            vec![Variable::new(Type::String, "message")],
            |args| {
                if let Some(Literal::String(value)) = args.first() {
                    println!("{}", value);
                }
                None
            },
        ),
        ExternalFunction::new(
            Type::Void,
            "print_int",
            vec![Variable::new(Type::Int, "value")],
            |args| {
                if let Some(Literal::Int(value)) = args.first() {
                    println!("{}", value);
                }
                None
            },
        ),
        ExternalFunction::new(
            Type::Void,
            "print_float",
            vec![Variable::new(Type::Float, "value")],
            |args| {
                if let Some(Literal::Float(value)) = args.first() {
                    println!("{}", value);
                }
                None
            },
        ),
        ExternalFunction::new(
            Type::Void,
            "print_bool",
            vec![Variable::new(Type::Bool, "value")],
            |args| {
                if let Some(Literal::Bool(value)) = args.first() {
                    println!("{}", value);
                }
                None
            },
        ),
    ]
}

/// Interactive debugger shell. One command per line; the VM state is
/// presented after every step and continue.
fn run_debug_shell(program: &Program, initial_breakpoints: &[usize]) {
    let mut vm = ByteCodeVm::new(program);
    let mut debugger = Debugger::new(&mut vm);

    for code_index in initial_breakpoints {
        debugger.breakpoint_add(*code_index);
    }

    let mut editor = DefaultEditor::new().expect("failed to initialize the line editor");

    println!("{}", "Slate debugger".bright_cyan());
    println!(
        "  {} step, {} continue, {} N, {} N, {} state, {} quit",
        "s".bright_yellow(),
        "c".bright_yellow(),
        "b".bright_yellow(),
        "d".bright_yellow(),
        "p".bright_yellow(),
        "q".bright_yellow()
    );
    debugger.present();

    loop {
        match editor.readline("(slate) ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                let parts: Vec<&str> = line.split_whitespace().collect();

                match parts.as_slice() {
                    ["step"] | ["s"] => debugger.breakpoint_step(),
                    ["continue"] | ["c"] => debugger.breakpoint_continue(),
                    ["print"] | ["p"] => debugger.present(),
                    ["break", index] | ["b", index] => match index.parse::<usize>() {
                        Ok(code_index) => debugger.breakpoint_add(code_index),
                        Err(_) => println!("breakpoints are code offsets"),
                    },
                    ["delete", index] | ["d", index] => match index.parse::<usize>() {
                        Ok(code_index) => debugger.breakpoint_remove(code_index),
                        Err(_) => println!("breakpoints are code offsets"),
                    },
                    ["quit"] | ["q"] => break,
                    [] => {}
                    _ => println!("commands: step (s), continue (c), break N (b), delete N (d), print (p), quit (q)"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C (q to quit)".bright_yellow());
            }
            Err(ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("{} {}", "error:".red().bold(), error);
                break;
            }
        }
    }
}
