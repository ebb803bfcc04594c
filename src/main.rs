//! fluxwire - dump captured query responses
//!
//! Reads a chunked result stream from a file or stdin and prints its
//! results, series and rows.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::DumpOptions;
use fluxwire_client::{Cursor, DecoderConfig, Format, ReaderSource};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fluxwire")]
#[command(about = "Decode chunked time-series query responses")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every result, series and row of a response body
    Dump {
        /// Response body to read (stdin if omitted)
        file: Option<PathBuf>,

        /// Format name or MIME type of the body
        #[arg(short, long, default_value = "msgpack", env = "FLUXWIRE_FORMAT")]
        format: String,

        /// Rows to print per series; the rest are skipped
        #[arg(short = 'n', long)]
        max_rows: Option<u64>,

        /// Print only row counts per series
        #[arg(short, long)]
        summary: bool,
    },

    /// List supported formats
    Formats,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Dump {
            file,
            format,
            max_rows,
            summary,
        } => run_dump(file, &format, DumpOptions { max_rows, summary }),
        Commands::Formats => {
            for format in Format::ALL {
                println!("{}\t{}", format.name().cyan(), format.mime_type());
            }
            Ok(())
        }
    };

    if let Err(e) = outcome {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}

fn run_dump(
    file: Option<PathBuf>,
    format: &str,
    options: DumpOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader: Box<dyn Read> = match file {
        Some(path) => Box::new(File::open(&path).map_err(|e| {
            eprintln!("{}: {}", "Cannot open".red(), path.display());
            e
        })?),
        None => Box::new(io::stdin().lock()),
    };

    let config = DecoderConfig::from_env();
    let source = ReaderSource::with_capacity(config.read_buffer_size, reader);
    let mut cursor = Cursor::open_with_config(source, format, config)?;
    tracing::debug!(results = cursor.result_count(), "response header read");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let dumped = commands::dump(&mut cursor, &options, &mut out);
    let closed = cursor.close();
    let stats = dumped?;
    closed?;

    if options.summary {
        writeln!(
            out,
            "{}",
            format!(
                "{} results, {} series, {} rows, {} errors",
                stats.results,
                stats.series,
                stats.skipped + stats.rows,
                stats.errors
            )
            .dimmed()
        )?;
    }
    out.flush()?;
    Ok(())
}
