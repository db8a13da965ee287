use crate::error::{BenchError, Result};
use crate::stats::{Aggregate, Report, TimeStats};
use prettytable::{format, row, Cell, Row, Table};
use std::fs;
use std::path::Path;

/// Formats a byte count with thousands separators: 1234567 -> "1,234,567".
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn time_cells(stats: &TimeStats) -> Vec<Cell> {
    vec![
        Cell::new(&format!("{:.4}", stats.min)).style_spec("rFb"),
        Cell::new(&format!("{:.4}", stats.avg)).style_spec("rFg"),
        Cell::new(&format!("{:.4}", stats.max)).style_spec("rFr"),
        Cell::new(&format!("{:.4}", stats.stddev)).style_spec("rb"),
    ]
}

fn aggregate_row(label: &str, aggregate: &Aggregate, skip_decomp: bool, note: &str) -> Row {
    let mut cells = vec![
        Cell::new(label),
        Cell::new(&format!("{:.3}%", aggregate.comp_pct)).style_spec("r"),
        Cell::new(""),
        Cell::new(&format!("{:.4}", aggregate.comp_time)).style_spec("rFg"),
        Cell::new(""),
        Cell::new(""),
    ];
    if !skip_decomp {
        cells.push(Cell::new(""));
        cells.push(Cell::new(&format!("{:.4}", aggregate.decomp_time)).style_spec("rFg"));
        cells.push(Cell::new(""));
        cells.push(Cell::new(""));
    }
    cells.push(Cell::new(note));
    Row::new(cells)
}

/// Builds the result table: one row per level, then the averages and the
/// grand total.
pub fn build_table(report: &Report, skip_decomp: bool) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);

    let mut titles = vec![
        Cell::new("Level"),
        Cell::new("Comp"),
        Cell::new("Comp min"),
        Cell::new("avg"),
        Cell::new("max"),
        Cell::new("stddev"),
    ];
    if !skip_decomp {
        titles.extend([
            Cell::new("Decomp min"),
            Cell::new("avg"),
            Cell::new("max"),
            Cell::new("stddev"),
        ]);
    }
    titles.push(Cell::new("Compressed size"));
    table.set_titles(Row::new(titles));

    for level in &report.levels {
        let mut cells = vec![
            Cell::new(&level.level.label()),
            Cell::new(&format!("{:.3}%", level.comp_pct)).style_spec("r"),
        ];
        cells.extend(time_cells(&level.comp));
        if !skip_decomp {
            cells.extend(time_cells(&level.decomp));
        }
        let size = if level.integrity_failures > 0 {
            Cell::new(&format!("{} (FAILED)", group_thousands(level.comp_size))).style_spec("rFr")
        } else {
            Cell::new(&group_thousands(level.comp_size)).style_spec("r")
        };
        cells.push(size);
        table.add_row(Row::new(cells));
    }

    let totals = &report.totals;
    table.add_row(aggregate_row("avg1", &totals.all, skip_decomp, ""));
    if let Some(rest) = &totals.excluding_baseline {
        table.add_row(aggregate_row("avg2", rest, skip_decomp, "(lvl 0 excluded)"));
    }

    let decomp_total = if skip_decomp {
        String::new()
    } else {
        format!("{:.3}", totals.decomp_time_total)
    };
    let mut tot = row!["tot", "", "", r->format!("{:.3}", totals.comp_time_total), "", ""];
    if !skip_decomp {
        for cell in [Cell::new(""), Cell::new(&decomp_total).style_spec("r"), Cell::new(""), Cell::new("")] {
            tot.add_cell(cell);
        }
    }
    tot.add_cell(Cell::new(&group_thousands(totals.comp_size_total)).style_spec("r"));
    table.add_row(tot);

    table
}

/// Prints the session header and the result table.
pub fn print_report(report: &Report, levels: &str, skip_decomp: bool) {
    println!();
    println!(" Runs: {}", report.runs);
    println!(" Levels: {}", levels);
    println!(" Trimworst: {}", report.trim);
    println!();
    build_table(report, skip_decomp).printstd();
    println!();
}

/// Writes the report as pretty-printed JSON.
pub fn write_json<P: AsRef<Path>>(report: &Report, path: P) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).map_err(|e| BenchError::io(path, e))
}
