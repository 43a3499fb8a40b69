//! fifthc command line driver.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use log::LevelFilter;

use fifthc::config::{DEFAULT_CODE_BASE, DEFAULT_DATA_BASE, DEFAULT_STACK_SIZE};
use fifthc::{compile_file, CompileOptions};

#[derive(Parser)]
#[command(name = "fifthc")]
#[command(version)]
#[command(about = "Compile a Fifth source file into a static x86-64 Linux executable", long_about = None)]
struct Cli {
    /// Input source file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output executable (default: input without extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report unknown words as warnings instead of failing
    #[arg(long)]
    best_effort: bool,

    /// Allow calls to words defined later in the file
    #[arg(long)]
    forward_refs: bool,

    /// Bytes reserved for the data stack
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_STACK_SIZE)]
    stack_size: u64,

    /// Load address of the code segment
    #[arg(long, value_name = "ADDR", value_parser = parse_address, default_value_t = DEFAULT_CODE_BASE)]
    code_base: u64,

    /// Load address of the data segment
    #[arg(long, value_name = "ADDR", value_parser = parse_address, default_value_t = DEFAULT_DATA_BASE)]
    data_base: u64,

    /// Print a disassembly of the generated code
    #[arg(long)]
    disasm: bool,

    /// Print compilation statistics
    #[arg(long)]
    stats: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Decimal or `0x` hexadecimal address.
fn parse_address(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid address `{text}`: {e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let options = CompileOptions {
        code_base: cli.code_base,
        data_base: cli.data_base,
        stack_size: cli.stack_size,
        best_effort: cli.best_effort,
        forward_refs: cli.forward_refs,
    };
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension(""));

    match compile_file(&cli.input, &output, &options) {
        Ok(program) => {
            if cli.disasm {
                print!("{}", program.disassembly());
            }
            if cli.stats {
                print!("{}", program.stats);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.pos() {
                Some(_) => eprintln!("{}:{}", cli.input.display(), e),
                None => eprintln!("error: {}", e),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x400000"), Ok(0x40_0000));
        assert_eq!(parse_address("4096"), Ok(4096));
        assert!(parse_address("0xzz").is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["fifthc", "prog.f"]);
        assert_eq!(cli.code_base, DEFAULT_CODE_BASE);
        assert_eq!(cli.stack_size, DEFAULT_STACK_SIZE);
        assert!(cli.output.is_none());
        assert_eq!(cli.input.with_extension(""), PathBuf::from("prog"));

        let cli = Cli::parse_from(["fifthc", "prog.f", "-o", "out", "-vv", "--best-effort"]);
        assert_eq!(cli.output, Some(PathBuf::from("out")));
        assert_eq!(cli.verbose, 2);
        assert!(cli.best_effort);
    }
}
