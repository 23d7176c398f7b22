use crate::config::Config;
use crate::dataset;
use crate::generation::{QueryGenerator, generate_batch};
use crate::models::{GenerationResult, SummaryReport};
use crate::repair::repair_query;
use crate::validation::{QueryValidator, validate_batch};
use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing::{info, warn};

/// Main runner that orchestrates generation, repair and validation
pub struct Runner {
    config: Config,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run every stage: generate, repair when configured, validate
    pub async fn run(
        &self,
        generator: &dyn QueryGenerator,
        validator: &dyn QueryValidator,
    ) -> Result<SummaryReport> {
        self.generate_all(generator).await?;
        if self.config.paths.repaired_dir.is_some() {
            self.repair_all()?;
        }
        self.validate_all(validator).await
    }

    /// Generate queries for every input file, returning the number of rows written
    pub async fn generate_all(&self, generator: &dyn QueryGenerator) -> Result<usize> {
        let paths = &self.config.paths;
        let files = dataset::list_csv_files(&paths.input_dir)?;
        let total_files = files.len();
        let mut total_rows = 0;

        for (file_index, input) in files.iter().enumerate() {
            let name = file_name(input);
            info!("Generating queries for file {}/{}: {}", file_index + 1, total_files, name);

            let records = match dataset::read_questions(input, &self.config.generation.question_column) {
                Ok(records) => records,
                Err(e) => {
                    warn!("[SKIP] {}: {:#}", name, e);
                    continue;
                }
            };

            let results =
                generate_batch(generator, &records, self.config.generation.concurrency).await;
            let failures = results.iter().filter(|r| r.failure.is_some()).count();

            let output = paths.generated_dir.join(&name);
            dataset::write_generated(&output, &results)?;
            info!(
                "Wrote {} row(s) to {} ({} failed)",
                results.len(),
                output.display(),
                failures
            );
            total_rows += results.len();
        }

        Ok(total_rows)
    }

    /// Repair generated queries, returning the number of rows changed
    pub fn repair_all(&self) -> Result<usize> {
        let paths = &self.config.paths;
        let Some(repaired_dir) = &paths.repaired_dir else {
            bail!("No repaired_dir configured in [paths]");
        };
        let files = dataset::list_csv_files(&paths.generated_dir)?;
        let mut total_changed = 0;

        for input in &files {
            let name = file_name(input);
            let rows = match dataset::read_generated(input) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("[SKIP] {}: {:#}", name, e);
                    continue;
                }
            };

            let (repaired, changed) = repair_rows(rows);
            dataset::write_generated(&repaired_dir.join(&name), &repaired)?;
            info!("[OK] {}: updated {} row(s)", name, changed);
            total_changed += changed;
        }

        Ok(total_changed)
    }

    /// Validate every generated file and write the summary
    pub async fn validate_all(&self, validator: &dyn QueryValidator) -> Result<SummaryReport> {
        let paths = &self.config.paths;
        let files = dataset::list_csv_files(paths.validation_input())?;
        let total_files = files.len();
        let mut outcomes = Vec::new();

        for (file_index, input) in files.iter().enumerate() {
            let name = file_name(input);
            info!("Validating file {}/{}: {}", file_index + 1, total_files, name);

            let rows = match dataset::read_generated(input) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("[SKIP] {}: {:#}", name, e);
                    continue;
                }
            };

            let validated = validate_batch(validator, &rows, self.config.endpoint.concurrency).await;
            dataset::write_validated(&paths.validated_dir.join(&name), &validated)?;
            outcomes.extend(validated.into_iter().map(|row| row.response.outcome));
        }

        let report = SummaryReport::from_outcomes(&outcomes);
        self.store_summary(&report, &paths.summary_file)?;
        Ok(report)
    }

    /// Write the markdown summary
    fn store_summary(&self, report: &SummaryReport, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, report.to_markdown())
            .with_context(|| format!("Failed to write summary to: {}", path.display()))?;
        info!("Summary saved to {}", path.display());
        Ok(())
    }
}

fn repair_rows(rows: Vec<GenerationResult>) -> (Vec<GenerationResult>, usize) {
    let mut changed = 0;
    let repaired = rows
        .into_iter()
        .map(|mut row| {
            if let Some(query) = row.generated_query.take() {
                let fixed = repair_query(&query);
                if fixed != query {
                    changed += 1;
                }
                row.generated_query = Some(fixed);
            }
            row
        })
        .collect();
    (repaired, changed)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, GenerationConfig, PathsConfig};
    use crate::models::{QueryResponse, ValidationOutcome};
    use crate::validation::SparqlEndpoint;
    use async_trait::async_trait;
    use mockito::Matcher;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    fn create_test_config(root: &Path) -> Config {
        Config {
            generation: GenerationConfig {
                api_endpoint: "http://localhost:8080/v1".to_string(),
                env_var_api_key: None,
                model: "t5-small-qald9".to_string(),
                prompt_prefix: "translate english to sparql: ".to_string(),
                temperature: 0.0,
                max_tokens: 128,
                rate_limit_rps: 0.0,
                concurrency: 2,
                question_column: "question".to_string(),
            },
            endpoint: EndpointConfig {
                rate_limit_rps: 0.0,
                ..EndpointConfig::default()
            },
            paths: PathsConfig {
                input_dir: root.join("QASd"),
                generated_dir: root.join("SPARQL"),
                repaired_dir: None,
                validated_dir: root.join("DB-SPARQL"),
                summary_file: root.join("reports").join("summary.md"),
            },
        }
    }

    fn write_input(root: &Path, name: &str, content: &str) -> PathBuf {
        let dir = root.join("QASd");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Looks questions up in a fixed table, failing on unknown ones
    struct MockGenerator {
        queries: HashMap<String, String>,
    }

    impl MockGenerator {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                queries: pairs
                    .iter()
                    .map(|(q, s)| (q.to_string(), s.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl QueryGenerator for MockGenerator {
        async fn generate(&self, question: &str) -> Result<String> {
            match self.queries.get(question) {
                Some(query) => Ok(query.clone()),
                None => anyhow::bail!("Mock generate failure"),
            }
        }
    }

    /// Answers by query text
    struct MockValidator {
        responses: HashMap<String, QueryResponse>,
    }

    #[async_trait]
    impl QueryValidator for MockValidator {
        async fn validate(&self, query: &str) -> QueryResponse {
            self.responses
                .get(query)
                .cloned()
                .unwrap_or_else(|| QueryResponse::error("Empty or invalid query string"))
        }
    }

    fn setup() -> (TempDir, Config) {
        let temp_dir = tempdir().unwrap();
        let config = create_test_config(temp_dir.path());
        (temp_dir, config)
    }

    #[tokio::test]
    async fn test_generate_all_preserves_rows() {
        let (temp_dir, config) = setup();
        write_input(
            temp_dir.path(),
            "wikitq_test.csv",
            "question,table_id\nWho wrote Dune?,t1\nunknown question,t2\n,t3\nCapital of Peru?,t4\n",
        );
        let generator = MockGenerator::new(&[
            ("Who wrote Dune?", "SELECT ?obj WHERE { dbr:Dune dbo:author ?obj }"),
            ("Capital of Peru?", "SELECT ?obj WHERE { dbr:Peru dbo:capital ?obj }"),
        ]);

        let runner = Runner::new(config.clone());
        let rows = runner.generate_all(&generator).await.unwrap();

        assert_eq!(rows, 4);
        let output = dataset::read_generated(&config.paths.generated_dir.join("wikitq_test.csv")).unwrap();
        let questions: Vec<_> = output.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(questions, vec!["Who wrote Dune?", "unknown question", "", "Capital of Peru?"]);
        assert_eq!(output[0].query_text(), "SELECT ?obj WHERE { dbr:Dune dbo:author ?obj }");
        assert_eq!(output[1].generated_query, None);
        assert_eq!(output[2].generated_query, None);
        assert_eq!(output[3].query_text(), "SELECT ?obj WHERE { dbr:Peru dbo:capital ?obj }");
    }

    #[tokio::test]
    async fn test_generate_all_skips_files_without_question_column() {
        let (temp_dir, config) = setup();
        write_input(temp_dir.path(), "a_tabfact.csv", "statement,label\nfoo,1\n");
        write_input(temp_dir.path(), "b_fetaqa.csv", "question\nWho wrote Dune?\n");
        let generator = MockGenerator::new(&[("Who wrote Dune?", "SELECT ?x WHERE { ?x ?p ?o }")]);

        let runner = Runner::new(config.clone());
        let rows = runner.generate_all(&generator).await.unwrap();

        assert_eq!(rows, 1);
        assert!(!config.paths.generated_dir.join("a_tabfact.csv").exists());
        assert!(config.paths.generated_dir.join("b_fetaqa.csv").exists());
    }

    #[tokio::test]
    async fn test_generate_all_missing_input_dir() {
        let (_temp_dir, config) = setup();
        let generator = MockGenerator::new(&[]);

        let result = Runner::new(config).generate_all(&generator).await;
        assert!(result.unwrap_err().to_string().contains("Input folder not found"));
    }

    #[tokio::test]
    async fn test_two_question_scenario() {
        let (temp_dir, config) = setup();
        write_input(
            temp_dir.path(),
            "hitab_test.csv",
            "question\nWhich cities are in Peru?\nWho won in 1850?\n",
        );
        let generator = MockGenerator::new(&[
            ("Which cities are in Peru?", "SELECT ?obj WHERE { ?obj dbo:country dbr:Peru }"),
            ("Who won in 1850?", "SELECT ?obj WHERE { dbr:Race_1850 dbo:winner ?obj }"),
        ]);
        let validator = MockValidator {
            responses: HashMap::from([
                (
                    "SELECT ?obj WHERE { ?obj dbo:country dbr:Peru }".to_string(),
                    QueryResponse {
                        outcome: ValidationOutcome::NonEmpty { rows: 3 },
                        values: vec!["Lima".to_string(), "Cusco".to_string(), "Arequipa".to_string()],
                    },
                ),
                (
                    "SELECT ?obj WHERE { dbr:Race_1850 dbo:winner ?obj }".to_string(),
                    QueryResponse {
                        outcome: ValidationOutcome::Empty,
                        values: vec![],
                    },
                ),
            ]),
        };

        let runner = Runner::new(config.clone());
        let report = runner.run(&generator, &validator).await.unwrap();

        assert_eq!(report.total_rows, 2);
        assert_eq!(report.non_empty_count, 1);
        assert_eq!(report.empty_count, 1);
        assert_eq!(report.error_count, 0);
        assert!(report.distinct_error_messages.is_empty());

        let validated =
            std::fs::read_to_string(config.paths.validated_dir.join("hitab_test.csv")).unwrap();
        let lines: Vec<_> = validated.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",non_empty,3,Lima;Cusco;Arequipa,"));
        assert!(lines[2].ends_with(",empty,0,,"));

        let summary = std::fs::read_to_string(&config.paths.summary_file).unwrap();
        assert!(summary.contains("**Total rows processed:** 2"));
        assert!(summary.contains("- **Non-empty results:** 1 (50.00%)"));
    }

    #[tokio::test]
    async fn test_unbalanced_query_scenario_against_endpoint() {
        let (temp_dir, mut config) = setup();
        write_input(temp_dir.path(), "wikisql.csv", "question\nWho directed Alien?\n");

        let compiler_error = "Virtuoso 37000 Error SP030: SPARQL compiler, line 0: syntax error at '}' before end of text";
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/sparql")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(compiler_error)
            .create_async()
            .await;
        config.endpoint.url = format!("{}/sparql", server.url());

        let generator = MockGenerator::new(&[(
            "Who directed Alien?",
            "SELECT ?obj WHERE { (dbr:Alien dbo:director ?obj }",
        )]);
        let endpoint = SparqlEndpoint::new(config.endpoint.clone()).unwrap();

        let report = Runner::new(config).run(&generator, &endpoint).await.unwrap();

        assert_eq!(report.total_rows, 1);
        assert_eq!(report.non_empty_count, 0);
        assert_eq!(report.empty_count, 0);
        assert_eq!(report.error_count, 1);
        assert_eq!(
            report.distinct_error_messages,
            vec![format!("HTTP 400: {}", compiler_error)]
        );
    }

    #[tokio::test]
    async fn test_generation_failures_reach_summary() {
        let (temp_dir, config) = setup();
        write_input(temp_dir.path(), "qa.csv", "question,id\nunknown question,1\n,2\n");
        let generator = MockGenerator::new(&[]);
        let validator = MockValidator {
            responses: HashMap::new(),
        };

        let report = Runner::new(config.clone()).run(&generator, &validator).await.unwrap();

        assert_eq!(report.total_rows, 2);
        assert_eq!(report.error_count, 2);
        assert_eq!(
            report.distinct_error_messages,
            vec![
                "Generation failed: Mock generate failure",
                "Generation failed: Empty question"
            ]
        );
        let validated =
            std::fs::read_to_string(config.paths.validated_dir.join("qa.csv")).unwrap();
        assert!(validated.contains("Generation failed: Mock generate failure"));
    }

    #[tokio::test]
    async fn test_validate_all_reads_repaired_dir() {
        let (temp_dir, mut config) = setup();
        let repaired_dir = temp_dir.path().join("post-SPARQL");
        config.paths.repaired_dir = Some(repaired_dir.clone());
        dataset::write_generated(
            &repaired_dir.join("a.csv"),
            &[GenerationResult::generated("q", "ASK { ?s ?p ?o }".to_string())],
        )
        .unwrap();
        let validator = MockValidator {
            responses: HashMap::from([(
                "ASK { ?s ?p ?o }".to_string(),
                QueryResponse {
                    outcome: ValidationOutcome::NonEmpty { rows: 1 },
                    values: vec![],
                },
            )]),
        };

        let report = Runner::new(config).validate_all(&validator).await.unwrap();

        assert_eq!(report.total_rows, 1);
        assert_eq!(report.non_empty_count, 1);
    }

    #[tokio::test]
    async fn test_run_with_repair_stage() {
        let (temp_dir, mut config) = setup();
        config.paths.repaired_dir = Some(temp_dir.path().join("post-SPARQL"));
        write_input(temp_dir.path(), "qa.csv", "question\nWho founded Lima?\n");
        let generator = MockGenerator::new(&[(
            "Who founded Lima?",
            "SELECT ?obj WHERE [ wd:Lima wdt:founder ?obj ]",
        )]);
        let validator = MockValidator {
            responses: HashMap::from([(
                "SELECT ?obj WHERE { dbr:Lima dbo:founder ?obj }".to_string(),
                QueryResponse {
                    outcome: ValidationOutcome::NonEmpty { rows: 1 },
                    values: vec!["Francisco_Pizarro".to_string()],
                },
            )]),
        };

        let report = Runner::new(config.clone()).run(&generator, &validator).await.unwrap();

        assert_eq!(report.non_empty_count, 1);
        let generated = dataset::read_generated(&config.paths.generated_dir.join("qa.csv")).unwrap();
        assert_eq!(generated[0].query_text(), "SELECT ?obj WHERE [ wd:Lima wdt:founder ?obj ]");
    }

    #[test]
    fn test_repair_all_counts_changed_rows() {
        let (temp_dir, mut config) = setup();
        let repaired_dir = temp_dir.path().join("post-SPARQL");
        config.paths.repaired_dir = Some(repaired_dir.clone());
        dataset::write_generated(
            &config.paths.generated_dir.join("qa.csv"),
            &[
                GenerationResult::generated("q1", "SELECT ?obj WHERE { dbr:A dbo:b ?obj }".to_string()),
                GenerationResult::generated("q2", "SELECT ?obj WHERE { dbr:A dbo:b ?obj".to_string()),
                GenerationResult::failed("q3", "boom".to_string()),
            ],
        )
        .unwrap();

        let changed = Runner::new(config).repair_all().unwrap();

        assert_eq!(changed, 1);
        let repaired = dataset::read_generated(&repaired_dir.join("qa.csv")).unwrap();
        assert_eq!(repaired.len(), 3);
        assert_eq!(repaired[1].query_text(), "SELECT ?obj WHERE { dbr:A dbo:b ?obj }");
        assert_eq!(repaired[2].generated_query, None);
        assert_eq!(repaired[2].failure.as_deref(), Some("boom"));
    }

    #[test]
    fn test_repair_all_requires_repaired_dir() {
        let (_temp_dir, config) = setup();
        let result = Runner::new(config).repair_all();
        assert!(result.unwrap_err().to_string().contains("No repaired_dir"));
    }

    #[test]
    fn test_store_summary_serialization_failure() {
        let (_temp_dir, config) = setup();
        let runner = Runner::new(config);
        let report = SummaryReport::from_outcomes(&Vec::<ValidationOutcome>::new());

        let result = runner.store_summary(&report, Path::new("/dev/null/invalid_path_that_cannot_exist"));
        assert!(result.is_err());
    }
}
