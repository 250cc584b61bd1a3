//! Rendering of command results for `--output`.
//!
//! Lists become `tabled` tables, single records become key/value detail
//! blocks, `plain` is one identifier per line for shell pipelines, and the
//! structured formats serialize the records as they are.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use pixelpi_core::ApState;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color ────────────────────────────────────────────────────────────

/// `auto` colors only an interactive stdout, and honours `NO_COLOR`.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal(),
    }
}

/// AP state, colored by health when enabled.
pub fn paint_state(state: ApState, color: bool) -> String {
    if !color {
        return state.to_string();
    }
    match state {
        ApState::Active => state.green().to_string(),
        ApState::Failed => state.red().to_string(),
        ApState::Disabled => state.dimmed().to_string(),
        _ => state.yellow().to_string(),
    }
}

pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

// ── Rendering ────────────────────────────────────────────────────────

/// Render a collection: `to_row` feeds the table, `id_fn` the plain view.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(Table::new(rows).with(Style::rounded()).to_string())
        }
        OutputFormat::Plain => Ok(data.iter().map(id_fn).collect::<Vec<_>>().join("\n")),
        structured => render_structured(structured, data),
    }
}

/// Render one record. The table format shows `detail_fn`'s key/value block.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize + ?Sized,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Plain => Ok(id_fn(data)),
        structured => render_structured(structured, data),
    }
}

fn render_structured<T: Serialize + ?Sized>(format: &OutputFormat, data: &T) -> Result<String, CliError> {
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(data).map_err(|e| e.to_string()),
        OutputFormat::JsonCompact => serde_json::to_string(data).map_err(|e| e.to_string()),
        _ => serde_json::to_string_pretty(data).map_err(|e| e.to_string()),
    };
    rendered.map_err(CliError::Render)
}

// ── Printing ─────────────────────────────────────────────────────────

/// Write rendered output to stdout unless `--quiet`.
pub fn print_output(rendered: &str, quiet: bool) {
    if quiet || rendered.is_empty() {
        return;
    }
    // a closed pipe (`| head`) is not worth an error
    let _ = writeln!(io::stdout().lock(), "{rendered}");
}

/// Status line on stderr, suppressed by `--quiet`.
pub fn notice(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{message}");
    }
}
