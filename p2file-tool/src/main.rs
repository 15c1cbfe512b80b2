//! p2file-tool - CLI for writing and inspecting pagoda2 data containers
//!
//! # Commands
//!
//! - `write` - Build a container from a JSON export description
//! - `inspect` - Print the header and index of a container
//!
//! # Examples
//!
//! ```bash
//! p2file-tool write -i export.json -o app.bin
//! p2file-tool inspect -f app.bin --json
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `p2file_tool=info`).

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod container_ops;
mod source;

use container_ops::{inspect_container, write_container};

#[derive(Parser)]
#[command(name = "p2file-tool")]
#[command(version, about = "Write and inspect pagoda2 data containers")]
#[command(after_help = "Use 'p2file-tool <command> --help' for more information.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a container from a JSON export description
    Write {
        /// Path to the export description (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Path of the container file to create
        #[arg(short, long)]
        output: PathBuf,

        /// fsync the file before moving it into place
        #[arg(long, default_value = "false")]
        sync: bool,
    },

    /// Print the header and index of a container
    Inspect {
        /// Path to the container file
        #[arg(short, long)]
        file: PathBuf,

        /// Print as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("p2file_tool=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Write {
            input,
            output,
            sync,
        } => {
            write_container(input, output, sync)?;
        }
        Commands::Inspect { file, json } => {
            inspect_container(file, json)?;
        }
    }

    Ok(())
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
    fn test_parse_write() {
        let cli = Cli::try_parse_from([
            "p2file-tool",
            "write",
            "-i",
            "in.json",
            "-o",
            "out.bin",
            "--sync",
        ])
        .unwrap();
        match cli.command {
            Commands::Write { input, output, sync } => {
                assert_eq!(input, PathBuf::from("in.json"));
                assert_eq!(output, PathBuf::from("out.bin"));
                assert!(sync);
            }
            _ => panic!("expected write"),
        }
    }
}
