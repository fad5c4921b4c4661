//! # pw-dedup CLI Entry Point
//!
//! Binary entry point for the pw-dedup command-line tool.
//!
//! ## Usage
//!
//! ```bash
//! # Deduplicate two corpora into one file
//! pw-dedup unique.txt leaked-a.txt leaked-b.txt
//!
//! # Tune the block window and worker count
//! pw-dedup --block-pages 256 --jobs 8 unique.txt huge.txt
//!
//! # Show help
//! pw-dedup --help
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use eyre::{bail, Result, WrapErr};
use pw_dedup::config::os_page_size;
use pw_dedup::{dedup_files, DedupConfig};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config = DedupConfig::default();
    let mut positionals: Vec<PathBuf> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage(&mut std::io::stdout().lock());
                return Ok(ExitCode::SUCCESS);
            }
            "--version" | "-V" => {
                println!("pw-dedup {}", env!("CARGO_PKG_VERSION"));
                return Ok(ExitCode::SUCCESS);
            }
            "--temp-dir" => {
                config.temp_dir = PathBuf::from(take_value(&args, &mut i, "--temp-dir")?);
            }
            "--block-pages" => {
                let pages: usize = take_value(&args, &mut i, "--block-pages")?
                    .parse()
                    .wrap_err("--block-pages expects a positive integer")?;
                config.size_hint = pages * os_page_size();
            }
            "--jobs" | "-j" => {
                let jobs: usize = take_value(&args, &mut i, "--jobs")?
                    .parse()
                    .wrap_err("--jobs expects a positive integer")?;
                config.max_workers = jobs;
            }
            arg if arg.starts_with('-') => {
                bail!("Unknown option: {arg}");
            }
            path => {
                positionals.push(PathBuf::from(path));
            }
        }
        i += 1;
    }

    if positionals.len() < 2 {
        print_usage(&mut std::io::stderr().lock());
        return Ok(ExitCode::from(2));
    }

    let output = positionals.remove(0);
    dedup_files(&positionals, &output, &config)?;

    Ok(ExitCode::SUCCESS)
}

fn take_value<'a>(args: &'a [String], i: &mut usize, option: &str) -> Result<&'a str> {
    *i += 1;
    match args.get(*i) {
        Some(value) => Ok(value),
        None => bail!("{option} expects a value"),
    }
}

fn print_usage(out: &mut dyn std::io::Write) {
    let _ = writeln!(out, "pw-dedup - deduplicate newline-delimited records");
    let _ = writeln!(out);
    let _ = writeln!(out, "USAGE:");
    let _ = writeln!(out, "    pw-dedup [OPTIONS] <OUTPUT> <INPUT>...");
    let _ = writeln!(out);
    let _ = writeln!(out, "ARGS:");
    let _ = writeln!(out, "    <OUTPUT>    File to write the distinct records to");
    let _ = writeln!(out, "    <INPUT>     One or more newline-delimited input files");
    let _ = writeln!(out);
    let _ = writeln!(out, "OPTIONS:");
    let _ = writeln!(out, "    --temp-dir <DIR>     Slab directory (default ./.pw-dedup-temp)");
    let _ = writeln!(out, "    --block-pages <N>    Block window size in pages (default 512)");
    let _ = writeln!(out, "    -j, --jobs <N>       Cap on worker threads (default: CPU count)");
    let _ = writeln!(out, "    -h, --help           Print help information");
    let _ = writeln!(out, "    -V, --version        Print version information");
}
