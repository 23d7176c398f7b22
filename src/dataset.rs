use crate::models::{GenerationResult, QuestionRecord, ValidatedRow, ValidationOutcome};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct GeneratedCsvRow<'a> {
    question: &'a str,
    generated_query: &'a str,
    generation_error: &'a str,
}

#[derive(Deserialize)]
struct GeneratedCsvRecord {
    question: String,
    generated_query: Option<String>,
    #[serde(default)]
    generation_error: Option<String>,
}

#[derive(Serialize)]
struct ValidatedCsvRow<'a> {
    question: &'a str,
    generated_query: &'a str,
    outcome: &'a str,
    rows: usize,
    values: String,
    error: &'a str,
}

/// CSV files of a directory, sorted by name
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Input folder not found: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list directory: {}", dir.display()))?
            .path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        bail!("No CSV files found in {}", dir.display());
    }
    Ok(files)
}

/// Dataset identifier of a file, its stem
pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read every row of `column` as a question, blank cells included
pub fn read_questions(path: &Path, column: &str) -> Result<Vec<QuestionRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV: {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {}", path.display()))?;
    let Some(index) = headers.iter().position(|h| h == column) else {
        bail!("{}: missing '{}' column", path.display(), column);
    };

    let source_dataset = dataset_name(path);
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("Failed to read CSV row: {}", path.display()))?;
        records.push(QuestionRecord {
            question: row.get(index).unwrap_or_default().to_string(),
            source_dataset: source_dataset.clone(),
        });
    }

    Ok(records)
}

/// Read a generated file back into generation results
///
/// Files without a `generation_error` column are accepted.
pub fn read_generated(path: &Path) -> Result<Vec<GenerationResult>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV: {}", path.display()))?;

    reader
        .deserialize::<GeneratedCsvRecord>()
        .map(|row| {
            let row = row.with_context(|| format!("Failed to read CSV row: {}", path.display()))?;
            Ok(GenerationResult {
                question: row.question,
                generated_query: row.generated_query,
                failure: row.generation_error,
            })
        })
        .collect()
}

/// Write generated queries, one row per result
pub fn write_generated(path: &Path, rows: &[GenerationResult]) -> Result<()> {
    let mut writer = create_writer(path, &["question", "generated_query", "generation_error"])?;
    for row in rows {
        writer
            .serialize(GeneratedCsvRow {
                question: &row.question,
                generated_query: row.query_text(),
                generation_error: row.failure.as_deref().unwrap_or_default(),
            })
            .with_context(|| format!("Failed to write CSV row: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write CSV: {}", path.display()))
}

/// Write validated rows with their outcome, bindings and error
pub fn write_validated(path: &Path, rows: &[ValidatedRow]) -> Result<()> {
    let mut writer = create_writer(
        path,
        &["question", "generated_query", "outcome", "rows", "values", "error"],
    )?;
    for row in rows {
        let outcome = &row.response.outcome;
        let result_rows = match outcome {
            ValidationOutcome::NonEmpty { rows } => *rows,
            _ => 0,
        };
        writer
            .serialize(ValidatedCsvRow {
                question: &row.question,
                generated_query: &row.generated_query,
                outcome: outcome.label(),
                rows: result_rows,
                values: row.response.values.join(";"),
                error: outcome.error_message().unwrap_or_default(),
            })
            .with_context(|| format!("Failed to write CSV row: {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write CSV: {}", path.display()))
}

/// Open a writer with the header already written, so empty tables keep it
fn create_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<std::fs::File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create CSV: {}", path.display()))?;
    writer
        .write_record(header)
        .with_context(|| format!("Failed to write CSV header: {}", path.display()))?;
    Ok(writer)
}
