use crate::models::SummaryReport;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Output format options
#[derive(Debug, Clone, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print the validation summary in the specified format
pub fn print_summary(report: &SummaryReport, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print_plain(report),
        OutputFormat::Json => print_json(report),
    }
}

/// Print the summary in plain text format
fn print_plain(report: &SummaryReport) {
    println!("📊 SUMMARY");
    println!("-------------");

    if report.total_rows == 0 {
        println!("No rows processed.");
        return;
    }

    println!("{:<15} {:<8} {:<8}", "Outcome", "Count", "Percent");
    println!("{}", "-".repeat(33));
    for (label, count) in [
        ("Non-empty", report.non_empty_count),
        ("Empty", report.empty_count),
        ("Error", report.error_count),
    ] {
        println!(
            "{:<15} {:<8} {:<8}",
            label,
            count,
            format!("{:.2}%", report.percentage(count))
        );
    }
    println!("{:<15} {:<8}", "Total", report.total_rows);

    if !report.distinct_error_messages.is_empty() {
        println!();
        println!("📝 DISTINCT ERRORS");
        println!("------------------");
        for (i, message) in report.distinct_error_messages.iter().enumerate() {
            println!("{}. {}", i + 1, message);
        }
    }
}

/// Print the summary in JSON format
fn print_json(report: &SummaryReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing summary to JSON: {}", e),
    }
}
