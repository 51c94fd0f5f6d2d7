use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::columns::Column;
use crate::format::{format_currency, format_margin};
use crate::metrics::{profit_and_margin, DerivedRow};

#[derive(Debug, Clone, PartialEq)]
pub struct StatusCount {
    pub status: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub rows: usize,
    pub skipped: usize,
    pub statuses: Vec<StatusCount>,
    pub subscriber_cost: f64,
    pub reseller_cost: f64,
    pub profit: f64,
    pub margin: f64,
}

pub fn summarize(rows: &[DerivedRow], skipped: usize) -> DashboardSummary {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for row in rows {
        let label = if row.current_status.is_empty() {
            "UNKNOWN".to_string()
        } else {
            row.current_status.clone()
        };
        *counts.entry(label).or_insert(0) += 1;
    }

    let mut statuses: Vec<StatusCount> = counts
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();
    statuses.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.status.cmp(&b.status)));

    let subscriber_cost: f64 = rows.iter().map(|row| row.subscriber_cost).sum();
    let reseller_cost: f64 = rows.iter().map(|row| row.reseller_cost).sum();
    let (profit, margin) = profit_and_margin(subscriber_cost, reseller_cost);

    DashboardSummary {
        rows: rows.len(),
        skipped,
        statuses,
        subscriber_cost,
        reseller_cost,
        profit,
        margin,
    }
}

fn summary_lines(summary: &DashboardSummary, currency: &str) -> Vec<String> {
    let mut lines = vec![format!("Subscribers: {}", summary.rows)];
    if summary.skipped > 0 {
        lines.push(format!("Skipped records: {}", summary.skipped));
    }
    if !summary.statuses.is_empty() {
        let breakdown: Vec<String> = summary
            .statuses
            .iter()
            .map(|entry| format!("{} {}", entry.status, entry.count))
            .collect();
        lines.push(format!("By status: {}", breakdown.join(", ")));
    }
    lines.push(format!(
        "Billed {} / reseller {} / profit {} ({} margin)",
        format_currency(summary.subscriber_cost, currency),
        format_currency(summary.reseller_cost, currency),
        format_currency(summary.profit, currency),
        format_margin(summary.margin)
    ));
    lines
}

fn cells(rows: &[DerivedRow], columns: &[Column], currency: &str) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| columns.iter().map(|column| column.render(row, currency)).collect())
        .collect()
}

/// Fixed-width text table for the terminal.
pub fn render_table(rows: &[DerivedRow], columns: &[Column], currency: &str) -> String {
    let headers: Vec<String> = columns.iter().map(|column| column.header(currency)).collect();
    let body = cells(rows, columns, currency);

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            body.iter()
                .map(|line| line[index].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_line = |values: &[String]| -> String {
        values
            .iter()
            .zip(columns)
            .zip(&widths)
            .map(|((value, column), &width)| {
                if column.is_numeric() {
                    format!("{value:>width$}")
                } else {
                    format!("{value:<width$}")
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_line(headers.as_slice()));
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    let _ = writeln!(output, "{}", rule.join("  "));
    for line in &body {
        let _ = writeln!(output, "{}", format_line(line.as_slice()));
    }
    output
}

pub fn render_summary(summary: &DashboardSummary, currency: &str) -> String {
    let mut output = String::new();
    for line in summary_lines(summary, currency) {
        let _ = writeln!(output, "{line}");
    }
    output
}

fn markdown_escape(cell: &str) -> String {
    cell.replace('|', "\\|")
}

pub fn build_report(
    account_id: i64,
    generated_at: DateTime<Utc>,
    rows: &[DerivedRow],
    summary: &DashboardSummary,
    columns: &[Column],
    currency: &str,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Subscriber Dashboard Report");
    let _ = writeln!(
        output,
        "Account {} (generated {})",
        account_id,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    for line in summary_lines(summary, currency) {
        let _ = writeln!(output, "- {line}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subscribers");

    if rows.is_empty() {
        let _ = writeln!(output, "No data.");
        return output;
    }

    let headers: Vec<String> = columns.iter().map(|column| column.header(currency)).collect();
    let _ = writeln!(output, "| {} |", headers.join(" | "));
    let rule: Vec<&str> = columns
        .iter()
        .map(|column| if column.is_numeric() { "---:" } else { "---" })
        .collect();
    let _ = writeln!(output, "| {} |", rule.join(" | "));
    for line in cells(rows, columns, currency) {
        let escaped: Vec<String> = line.iter().map(|cell| markdown_escape(cell)).collect();
        let _ = writeln!(output, "| {} |", escaped.join(" | "));
    }

    output
}

pub fn write_csv<W: std::io::Write>(
    writer: W,
    rows: &[DerivedRow],
    columns: &[Column],
    currency: &str,
) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(columns.iter().map(|column| column.header(currency)))?;
    for line in cells(rows, columns, currency) {
        csv_writer.write_record(&line)?;
    }
    csv_writer.flush()?;
    Ok(())
}
