//! Template rendering for CLI output using outstanding

use console::Style;
use keyfreqlib::{FreqRow, FreqTable, MatrixExport};
use outstanding::{render_with_output, Theme};
use serde::Serialize;

/// Include templates at compile time
pub const FREQ_TABLE_TEMPLATE: &str = include_str!("../templates/freq_table.jinja");
pub const MESSAGE_TEMPLATE: &str = include_str!("../templates/message.jinja");

/// Re-export OutputMode for callers
pub use outstanding::OutputMode;

/// Data context for the frequency table template (pre-formatted)
#[derive(Debug, Serialize)]
pub struct FreqTableContext {
    title: Option<String>,
    /// Header line, columns padded like the rows
    heading: String,
    /// Separator line (dashes)
    separator: String,
    rows: Vec<String>,
    footer: String,
}

impl FreqTableContext {
    pub fn from_table(table: &FreqTable) -> Self {
        let all_rows = table.rows.iter().chain(std::iter::once(&table.footer));

        let count_width = all_rows
            .clone()
            .map(|r| r.count.len())
            .chain(std::iter::once(table.headers[0].len()))
            .max()
            .unwrap_or(0);
        let percent_width = all_rows
            .map(|r| r.percent.len())
            .chain(std::iter::once(table.headers[1].len()))
            .max()
            .unwrap_or(0);
        let label_width = table
            .rows
            .iter()
            .map(|r| r.label.len())
            .chain(std::iter::once(table.headers[2].len()))
            .max()
            .unwrap_or(0);

        let heading = format!(
            "{:>cw$}  {:>pw$}  {}",
            table.headers[0],
            table.headers[1],
            table.headers[2],
            cw = count_width,
            pw = percent_width
        );

        FreqTableContext {
            title: table.title.clone(),
            heading,
            separator: "-".repeat(count_width + percent_width + 4 + label_width),
            rows: table
                .rows
                .iter()
                .map(|r| format_row(r, count_width, percent_width))
                .collect(),
            footer: format_row(&table.footer, count_width, percent_width),
        }
    }
}

/// Data context for the matrix export in table modes: the compact JSON line
#[derive(Debug, Serialize)]
pub struct MatrixContext {
    matrix: String,
}

impl MatrixContext {
    pub fn new(export: &MatrixExport) -> Result<Self, serde_json::Error> {
        Ok(MatrixContext {
            matrix: serde_json::to_string(export)?,
        })
    }
}

fn format_row(row: &FreqRow, count_width: usize, percent_width: usize) -> String {
    format!(
        "{:>cw$}  {:>pw$}  {}",
        row.count,
        row.percent,
        row.label,
        cw = count_width,
        pw = percent_width
    )
}

/// Create the theme with styles
pub fn create_theme() -> Theme {
    Theme::new().add("category", Style::new().bold())
}

/// Render a frequency table to string using outstanding
pub fn render_freq_table(
    table: &FreqTable,
    output_mode: OutputMode,
) -> Result<String, Box<dyn std::error::Error>> {
    let context = FreqTableContext::from_table(table);
    let rendered = render_with_output(FREQ_TABLE_TEMPLATE, &context, &create_theme(), output_mode)?;
    Ok(rendered)
}
