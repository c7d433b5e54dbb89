//! CLI entry point for the cpudump binary.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use cpuid_model::{builtin_catalog, summarize, DocumentResult};
use dump_parser::document::parse_document;

use regex as _;
use thiserror as _;
use tracing as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;

const USAGE_TEXT: &str = "\
Usage: cpudump <command> [options]

Commands:
  inspect <file>...  Parse dump files and print their feature summaries

Options:
  -h, --help         Show this help message

Examples:
  cpudump inspect GenuineIntel00906ED_CoffeeLake_CPUID.txt
  cpudump inspect dumps/*.txt
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Inspect(InspectArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct InspectArgs {
    inputs: Vec<PathBuf>,
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();

    match command_str.as_str() {
        "inspect" => parse_inspect_args(args)
            .map(Command::Inspect)
            .map(ParseResult::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_inspect_args(args: impl Iterator<Item = OsString>) -> Result<InspectArgs, String> {
    let mut inputs = Vec::new();

    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        inputs.push(PathBuf::from(arg));
    }

    if inputs.is_empty() {
        return Err("missing input path".to_string());
    }
    Ok(InspectArgs { inputs })
}

/// Parses and summarizes every input, continuing past per-file failures.
fn run_inspect(args: &InspectArgs) -> Result<(), i32> {
    let catalog = builtin_catalog();
    let mut failures = 0usize;

    for input in &args.inputs {
        let source_id = input.display().to_string();

        let text = match fs::read_to_string(input) {
            Ok(text) => text,
            Err(error) => {
                eprintln!("error: {source_id}: {error}");
                failures += 1;
                continue;
            }
        };

        let document = match parse_document(&source_id, &text) {
            Ok(document) => document,
            Err(error) => {
                eprintln!("error: {error}");
                failures += 1;
                continue;
            }
        };

        let Some(cpu) = document.base_cpu() else {
            // parse_document guarantees CPU 0; treat its absence as a failure
            // rather than panicking.
            eprintln!("error: {source_id}: no logical CPU 0");
            failures += 1;
            continue;
        };

        print_result(input, &summarize(cpu, &catalog));
    }

    if failures == 0 {
        Ok(())
    } else {
        Err(1)
    }
}

fn print_result(path: &Path, result: &DocumentResult) {
    println!("{}: {}", path.display(), result.display_name);
    println!("  vendor:  {}", result.vendor);
    println!("  family:  {}", result.family);
    println!("  uarch:   {}", result.microarchitecture);
    println!("  virtual: {}", if result.suspected_virtual { "yes" } else { "no" });
    println!("  features:");
    for feature in &result.features {
        println!("    {feature}");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(Command::Inspect(args))) => match run_inspect(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::PathBuf;

    #[test]
    fn parses_inspect_command() {
        let result = parse_args(
            [
                OsString::from("inspect"),
                OsString::from("a.txt"),
                OsString::from("b.txt"),
            ]
            .into_iter(),
        )
        .expect("valid inspect args should parse");

        let ParseResult::Command(Command::Inspect(args)) = result else {
            panic!("expected an inspect command");
        };
        assert_eq!(
            args,
            InspectArgs {
                inputs: vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")],
            }
        );
    }

    #[test]
    fn parses_help_flag() {
        let result = parse_args([OsString::from("--help")].into_iter())
            .expect("help should parse without error");
        assert!(matches!(result, ParseResult::Help));
    }

    #[test]
    fn rejects_unknown_command() {
        let error = parse_args([OsString::from("unknown")].into_iter())
            .expect_err("unknown command should fail parse");
        assert!(error.contains("unknown command"));
    }

    #[test]
    fn inspect_requires_an_input() {
        let error = parse_inspect_args(std::iter::empty()).expect_err("missing input should fail");
        assert!(error.contains("missing input"));
    }

    #[test]
    fn inspect_rejects_options() {
        let error = parse_inspect_args([OsString::from("--verbose")].into_iter())
            .expect_err("inspect should reject options");
        assert!(error.contains("unknown option"));
    }
}
