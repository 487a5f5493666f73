//! the main compiler binary. takes a source file and an optional output
//! format (the assembly listing by default), and prints the result to
//! standard output.
//!
//! run with `--help` for more info.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use minic::common::CompileError;
use minic::front::lex::Lexer;
use minic::front::parse;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file
    file: String,
    /// the output format
    #[arg(value_enum, short, long, default_value_t = Output::Asm)]
    out: Output,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Output {
    /// the list of tokens with their locations
    Tokens,
    /// the ast data structure
    Ast,
    /// the resulting assembly code
    Asm,
}

fn run(args: &Args, input: &str) -> Result<(), CompileError> {
    use Output::*;

    match args.out {
        Tokens => {
            let mut lexer = Lexer::new(input, &args.file);
            while !lexer.reached_end() {
                lexer.advance()?;
                if let Some(token) = lexer.current() {
                    println!("{}: {token}", token.location);
                }
            }
        }
        Ast => {
            println!("{:#?}", parse(input, &args.file)?);
        }
        Asm => {
            println!("{}", minic::compile(input, &args.file)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let input = match std::fs::read_to_string(&args.file) {
        Ok(input) => input,
        Err(error) => {
            eprintln!("error: cannot read {}: {error}", args.file);
            return ExitCode::FAILURE;
        }
    };

    match run(&args, &input) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
