use crate::models::{SummaryReport, ValidationOutcome};
use std::collections::HashSet;

/// Longest error message shown in the markdown table
const MAX_DISPLAY_CHARS: usize = 100;

impl SummaryReport {
    /// Fold outcomes into counts and first-seen distinct error messages
    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a ValidationOutcome>,
    {
        let mut report = SummaryReport {
            total_rows: 0,
            non_empty_count: 0,
            empty_count: 0,
            error_count: 0,
            distinct_error_messages: Vec::new(),
        };
        let mut seen = HashSet::new();

        for outcome in outcomes {
            report.total_rows += 1;
            match outcome {
                ValidationOutcome::NonEmpty { .. } => report.non_empty_count += 1,
                ValidationOutcome::Empty => report.empty_count += 1,
                ValidationOutcome::Error { message } => {
                    report.error_count += 1;
                    if seen.insert(message.as_str()) {
                        report.distinct_error_messages.push(message.clone());
                    }
                }
            }
        }

        report
    }

    /// Share of all rows, in percent
    pub fn percentage(&self, count: usize) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        count as f64 / self.total_rows as f64 * 100.0
    }

    /// Render the report as a markdown document
    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            "# SPARQL Endpoint Summary".to_string(),
            String::new(),
            format!("**Total rows processed:** {}", self.total_rows),
            String::new(),
        ];

        if self.total_rows > 0 {
            lines.push(self.count_line("Non-empty results", self.non_empty_count));
            lines.push(self.count_line("Empty results", self.empty_count));
            lines.push(self.count_line("Errors", self.error_count));
        } else {
            lines.push("No rows processed.".to_string());
        }

        if !self.distinct_error_messages.is_empty() {
            lines.push(String::new());
            lines.push("## Distinct Error Messages".to_string());
            lines.push(String::new());
            lines.push("| # | Error Message |".to_string());
            lines.push("|---|---------------|".to_string());
            for (i, message) in self.distinct_error_messages.iter().enumerate() {
                lines.push(format!("| {} | {} |", i + 1, table_cell(message)));
            }
        }

        lines.push(String::new());
        lines.join("\n")
    }

    fn count_line(&self, label: &str, count: usize) -> String {
        format!("- **{}:** {} ({:.2}%)", label, count, self.percentage(count))
    }
}

/// Truncate for display and escape pipes so the table stays intact
fn table_cell(message: &str) -> String {
    let shown = if message.chars().count() > MAX_DISPLAY_CHARS {
        let cut: String = message.chars().take(MAX_DISPLAY_CHARS).collect();
        format!("{}…", cut)
    } else {
        message.to_string()
    };
    shown.replace('|', "\\|")
}
