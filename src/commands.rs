//! Rendering of decoded responses.

use colored::Colorize;
use fluxwire_client::{ByteSource, Cursor, CursorError, Series};
use std::error::Error;
use std::io::Write;

/// Options for `fluxwire dump`.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Rows printed per series before the rest is discarded.
    pub max_rows: Option<u64>,
    /// Print only series names and row counts.
    pub summary: bool,
}

/// Counters collected while dumping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub results: u64,
    pub series: u64,
    pub rows: u64,
    pub skipped: u64,
    pub errors: u64,
}

/// Writes every result, series and row to `out`.
///
/// Server errors are printed in place and rendering continues with the
/// next sibling. Protocol and transport errors abort.
pub fn dump<S: ByteSource, W: Write>(
    cursor: &mut Cursor<S>,
    options: &DumpOptions,
    out: &mut W,
) -> Result<DumpStats, Box<dyn Error>> {
    let mut stats = DumpStats::default();

    loop {
        let mut result = match cursor.next_result() {
            Ok(Some(result)) => result,
            Ok(None) => break,
            Err(e) if !e.is_fatal() => {
                report(out, 0, &e, &mut stats)?;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        stats.results += 1;

        writeln!(out, "{} {}", "result".bold(), result.id())?;
        for message in result.messages() {
            writeln!(out, "  {}: {}", message.level.yellow(), message.text)?;
        }

        loop {
            let series = match result.next_series() {
                Ok(Some(series)) => series,
                Ok(None) => break,
                Err(e) if !e.is_fatal() => {
                    report(out, 2, &e, &mut stats)?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            stats.series += 1;

            if options.summary {
                summarize(series, out, &mut stats)?;
            } else {
                render(series, options, out, &mut stats)?;
            }
        }
    }

    Ok(stats)
}

fn series_title<W: Write>(series: &Series<'_>, out: &mut W) -> std::io::Result<()> {
    let name = if series.name().is_empty() {
        "(unnamed)"
    } else {
        series.name()
    };
    write!(out, "  {}", name.cyan())?;
    if !series.tags().is_empty() {
        write!(out, " {}", series.tags())?;
    }
    Ok(())
}

fn summarize<W: Write>(
    mut series: Series<'_>,
    out: &mut W,
    stats: &mut DumpStats,
) -> Result<(), Box<dyn Error>> {
    series.discard()?;
    let (count, _) = series.length();
    stats.skipped += count;

    series_title(&series, out)?;
    writeln!(out, ": {} rows", count)?;
    Ok(())
}

fn render<W: Write>(
    mut series: Series<'_>,
    options: &DumpOptions,
    out: &mut W,
    stats: &mut DumpStats,
) -> Result<(), Box<dyn Error>> {
    series_title(&series, out)?;
    writeln!(out)?;
    writeln!(out, "    {}", series.columns().join("\t").dimmed())?;

    let mut printed = 0u64;
    // Rows pulled off the stream, errored ones included
    let mut consumed = 0u64;
    loop {
        if options.max_rows.is_some_and(|max| printed >= max) {
            series.discard()?;
            let skipped = series.length().0.saturating_sub(consumed);
            stats.skipped += skipped;
            if skipped > 0 {
                writeln!(out, "    {}", format!("... {} more rows", skipped).dimmed())?;
            }
            break;
        }

        match series.next_row() {
            Ok(Some(row)) => {
                let line: Vec<String> = row.values().iter().map(|v| v.to_string()).collect();
                writeln!(out, "    {}", line.join("\t"))?;
                printed += 1;
                consumed += 1;
                stats.rows += 1;
            }
            Ok(None) => break,
            Err(e) if !e.is_fatal() => {
                consumed += 1;
                report(out, 4, &e, stats)?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn report<W: Write>(
    out: &mut W,
    indent: usize,
    err: &CursorError,
    stats: &mut DumpStats,
) -> std::io::Result<()> {
    stats.errors += 1;
    let level = err.level().map(|l| l.to_string()).unwrap_or_default();
    writeln!(
        out,
        "{:indent$}{} ({}): {}",
        "",
        "error".red(),
        level,
        err,
        indent = indent
    )
}
