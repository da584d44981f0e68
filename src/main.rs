// File: src/main.rs
//
// Entry point for the Monkey CLI: `run <file>` compiles and executes a
// script once, `repl` launches the interactive shell.

mod ast;
mod bytecode;
mod compiler;
mod errors;
mod lexer;
mod object;
mod parser;
mod repl;
mod symbol_table;
mod token;
mod vm;

use std::fs;
use std::path::PathBuf;

use clap::{Parser as ClapParser, Subcommand};

use crate::compiler::Compiler;
use crate::errors::{print_parse_errors, woops};
use crate::parser::Parser;
use crate::vm::Vm;

#[derive(ClapParser)]
#[command(
    name = "monkey",
    about = "Monkey: a bytecode compiler and stack-based virtual machine",
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
    /// Compile and run a .monkey script
    Run {
        /// Path to the .monkey file
        file: PathBuf,
    },

    /// Launch the interactive Monkey REPL
    Repl,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file } => run_file(&file),
        Commands::Repl => {
            let mut repl = repl::Repl::new().expect("failed to initialize REPL editor");
            if let Err(err) = repl.run() {
                eprintln!("{}", woops("running REPL", err));
                std::process::exit(1);
            }
        }
    }
}

fn run_file(file: &PathBuf) {
    let source = fs::read_to_string(file).unwrap_or_else(|err| {
        eprintln!("could not read {}: {}", file.display(), err);
        std::process::exit(1);
    });

    let (program, parse_errors) = Parser::parse_program(&source);
    if !parse_errors.is_empty() {
        print_parse_errors(&parse_errors);
        std::process::exit(1);
    }

    let mut compiler = Compiler::new();
    if let Err(err) = compiler.compile(&program) {
        eprintln!("{}", woops("Compilation failed", err));
        std::process::exit(1);
    }
    let bytecode = compiler.bytecode();

    let mut vm = Vm::new(bytecode);
    if let Err(err) = vm.run() {
        eprintln!("{}", woops("Executing bytecode failed", err));
        std::process::exit(1);
    }
}
