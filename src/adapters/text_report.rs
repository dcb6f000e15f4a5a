//! Plain-text weekly report for chat notifiers.

use crate::domain::report::{ReportLine, WeeklyReport};
use crate::ports::report_port::ReportPort;

pub struct TextReportAdapter;

impl ReportPort for TextReportAdapter {
    fn render(&self, report: &WeeklyReport) -> String {
        let mut output = String::new();

        output.push_str("3S-Trader Weekly Report\n");
        output.push_str(&format!("{}\n\n", report.generated_at.format("%Y-%m-%d %H:%M")));

        output.push_str(&render_value_section(report));
        output.push_str(&render_trades("Sells", &report.sells));
        output.push_str(&render_trades("Buys", &report.buys));
        output.push_str(&render_failed(report));
        output.push_str(&render_holdings(&report.holdings));

        output
    }
}

fn render_value_section(report: &WeeklyReport) -> String {
    let mut output = String::from("[Portfolio Value]\n");
    output.push_str(&format!("Current: {}\n", format_amount(report.portfolio_value)));
    output.push_str(&format!(
        "Cumulative: {} ({:+.2}%)\n",
        format_signed_amount(report.cumulative_gain()),
        report.cumulative_return() * 100.0
    ));
    output.push_str(&format!("Cash: {}\n\n", format_amount(report.cash)));
    output
}

fn render_trades(title: &str, lines: &[ReportLine]) -> String {
    let mut output = format!("[{title}]\n");
    if lines.is_empty() {
        output.push_str("- None\n");
    }
    for line in lines {
        output.push_str(&format!("- {} = {}\n", format_line(line), format_amount(line.amount)));
    }
    output.push('\n');
    output
}

/// Omitted entirely when every order went through.
fn render_failed(report: &WeeklyReport) -> String {
    if report.failed_sells.is_empty() && report.failed_buys.is_empty() {
        return String::new();
    }
    let mut output = String::from("[Failed Orders]\n");
    for line in &report.failed_sells {
        output.push_str(&format!("- Sell {}\n", format_line(line)));
    }
    for line in &report.failed_buys {
        output.push_str(&format!("- Buy {}\n", format_line(line)));
    }
    output.push('\n');
    output
}

fn render_holdings(lines: &[ReportLine]) -> String {
    let mut output = String::from("[Holdings]\n");
    if lines.is_empty() {
        output.push_str("- Cash 100%\n");
    }
    for line in lines {
        match line.price {
            Some(_) => output.push_str(&format!("- {}\n", format_line(line))),
            None => output.push_str(&format!(
                "- {}({}): {} @ no quote\n",
                line.name,
                line.code,
                group_thousands(&line.shares.to_string())
            )),
        }
    }
    output
}

/// `name(code): shares @ price`; an unpriced order shows `market`.
pub fn format_line(line: &ReportLine) -> String {
    let price = line
        .price
        .map(format_amount)
        .unwrap_or_else(|| "market".to_string());
    format!(
        "{}({}): {} @ {}",
        line.name,
        line.code,
        group_thousands(&line.shares.to_string()),
        price
    )
}

/// Round to a whole unit and group thousands with commas.
pub fn format_amount(value: f64) -> String {
    let rounded = value.round();
    let digits = group_thousands(&format!("{:.0}", rounded.abs()));
    if rounded < 0.0 {
        format!("-{digits}")
    } else {
        digits
    }
}

fn format_signed_amount(value: f64) -> String {
    if value.round() < 0.0 {
        format_amount(value)
    } else {
        format!("+{}", format_amount(value))
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
