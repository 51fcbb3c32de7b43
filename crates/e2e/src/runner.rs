//! Scenario runner that orchestrates requests, verification and visual checks

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SuiteConfig;
use crate::error::{E2eError, E2eResult};
use crate::http::{ResponseRecord, UploadClient};
use crate::playwright::{BrowserSurface, PlaywrightConfig};
use crate::scenario::{Expect, Scenario, Step};
use crate::verify::{ExpectedBody, Expectation, ResponseVerifier, SoftFailures};
use crate::visual::{VisualConfig, VisualDiff, VisualTester, VisualVerifier};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    /// Steps that ran to completion
    pub steps_completed: usize,
    pub soft_failures: Vec<String>,
    /// Hard failure that stopped the scenario
    pub error: Option<String>,
    pub timed_out: bool,
    pub resource_urls: Vec<String>,
    pub visual_diffs: Vec<VisualDiff>,
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub results: Vec<ScenarioResult>,
}

/// Everything a scenario accumulates, kept outside the timed future so a
/// timeout still reports what happened before it
#[derive(Default)]
struct ScenarioState {
    steps_completed: usize,
    soft: SoftFailures,
    resource_urls: Vec<String>,
    visual_diffs: Vec<VisualDiff>,
    snapshots_taken: usize,
}

/// Main E2E scenario runner
pub struct ScenarioRunner {
    config: SuiteConfig,

    verifier: ResponseVerifier,

    /// Absent when visual checks are disabled
    visual: Option<VisualVerifier>,

    /// Scenario catalogue directory
    scenarios_dir: PathBuf,

    /// Output directory for results
    output_dir: PathBuf,
}

impl ScenarioRunner {
    /// Create a runner; fails if visual checks are enabled but Playwright is missing
    pub fn with_config(config: RunnerConfig) -> E2eResult<Self> {
        let visual = if config.visual_enabled {
            let tester = VisualTester::new(&config.visual)?;
            let surface = BrowserSurface::new(
                PlaywrightConfig {
                    viewport: config.suite.viewport,
                    ..config.playwright
                },
                tester.actual_dir(),
            )?;
            Some(VisualVerifier::new(surface, tester, config.suite.max_diff_pixel_ratio))
        } else {
            None
        };

        Ok(Self {
            verifier: ResponseVerifier::new(&config.suite),
            config: config.suite,
            visual,
            scenarios_dir: config.scenarios_dir,
            output_dir: config.output_dir,
        })
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Run every scenario in the catalogue
    pub async fn run_all(&self) -> E2eResult<SuiteResult> {
        let scenarios = Scenario::load_all(&self.scenarios_dir)?;
        Ok(self.run_scenarios(&scenarios).await)
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<SuiteResult> {
        let scenarios = Scenario::load_all(&self.scenarios_dir)?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_scenarios(&filtered).await)
    }

    /// Run a specific scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<SuiteResult> {
        let scenarios = Scenario::load_all(&self.scenarios_dir)?;
        let scenario = scenarios
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::ScenarioParse(format!("Scenario not found: {}", name)))?;

        Ok(self.run_scenarios(std::slice::from_ref(&scenario)).await)
    }

    /// Run a list of scenarios one after another
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> SuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} scenario(s)...", scenarios.len());

        if let Some(visual) = &self.visual {
            if let Err(e) = visual.tester().clean_diffs() {
                warn!("Could not clear old diff images: {}", e);
            }
        }

        for scenario in scenarios {
            let result = self.run_scenario(scenario).await;
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("{} soft failure(s)", result.soft_failures.len()));
                error!("✗ {} - {}", result.name, reason);
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!("Scenario Results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            started_at,
            results,
        }
    }

    /// Run a single scenario inside its own request context and time ceiling
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        let ceiling = scenario
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.scenario_timeout);

        debug!("Running scenario: {} (ceiling {:?})", scenario.name, ceiling);

        let mut state = ScenarioState::default();
        let outcome = tokio::time::timeout(ceiling, self.execute(scenario, &mut state)).await;

        let (error, timed_out) = match outcome {
            Ok(Ok(())) => (None, false),
            Ok(Err(e)) => (Some(e.to_string()), false),
            Err(_) => {
                let e = E2eError::Timeout {
                    scenario: scenario.name.clone(),
                    secs: ceiling.as_secs(),
                };
                (Some(e.to_string()), true)
            }
        };

        let soft_failures = state.soft.into_messages();
        ScenarioResult {
            name: scenario.name.clone(),
            success: error.is_none() && soft_failures.is_empty(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps_completed: state.steps_completed,
            soft_failures,
            error,
            timed_out,
            resource_urls: state.resource_urls,
            visual_diffs: state.visual_diffs,
        }
    }

    async fn execute(&self, scenario: &Scenario, state: &mut ScenarioState) -> E2eResult<()> {
        let client = UploadClient::new()?;

        for step in &scenario.steps {
            debug!("{}: {}", scenario.name, step.label());
            self.execute_step(&client, scenario, step, state).await?;
            state.steps_completed += 1;
        }

        Ok(())
    }

    async fn execute_step(
        &self,
        client: &UploadClient,
        scenario: &Scenario,
        step: &Step,
        state: &mut ScenarioState,
    ) -> E2eResult<()> {
        let fixtures = &self.config.fixtures;
        let messages = &self.config.messages;

        match step {
            Step::UploadImage { endpoint, fixture, expect, visual } => {
                let path = fixtures.path(fixture)?;
                let expectation = self.verifier.expectation_for_image(
                    expect.status,
                    expect.body.as_deref(),
                    path,
                );
                let record = client.post_image(endpoint.url(&self.config), path).await?;
                let urls =
                    self.verifier.verify(&record, &expectation, &mut state.soft, &display(path))?;
                self.record_urls(scenario, urls, *visual, state).await;
            }
            Step::UploadArchive { endpoint, fixture, expect, visual } => {
                let path = fixtures.path(fixture)?;
                let expectation = self.verifier.expectation_for_archive(
                    expect.status,
                    expect.body.as_deref(),
                    path,
                )?;
                let record = client.post_archive(endpoint.url(&self.config), path).await?;
                let urls =
                    self.verifier.verify(&record, &expectation, &mut state.soft, &display(path))?;
                self.record_urls(scenario, urls, *visual, state).await;
            }
            Step::UploadArchives { endpoint, fixtures: names, expect } => {
                let paths = names
                    .iter()
                    .map(|name| fixtures.path(name))
                    .collect::<E2eResult<Vec<&Path>>>()?;
                let expectation = match &expect.body {
                    Some(body) => Expectation::literal(expect.status, body.clone()),
                    None => Expectation::status_only(expect.status),
                };
                let context = paths.iter().map(|p| display(p)).collect::<Vec<_>>().join(",");
                let record = client
                    .post_archives(endpoint.url(&self.config), paths.as_slice())
                    .await?;
                let urls = self.verifier.verify(&record, &expectation, &mut state.soft, &context)?;
                state.resource_urls.extend(urls);
            }
            Step::PutImage { endpoint, fixture, expect } => {
                let path = fixtures.path(fixture)?;
                let record = client.put_image(endpoint.url(&self.config), path).await?;
                let message = format!("{}{}", messages.put_status, display(path));
                self.check_method(&record, expect, &message, state)?;
            }
            Step::Get { endpoint, expect } => {
                let record = client.get(endpoint.url(&self.config)).await?;
                self.check_method(&record, expect, &messages.get_status, state)?;
            }
            Step::Delete { endpoint, expect } => {
                let record = client.delete(endpoint.url(&self.config)).await?;
                self.check_method(&record, expect, &messages.delete_status, state)?;
            }
        }

        Ok(())
    }

    /// Status (soft) and optional literal body (hard) for method checks
    fn check_method(
        &self,
        record: &ResponseRecord,
        expect: &Expect,
        message: &str,
        state: &mut ScenarioState,
    ) -> E2eResult<()> {
        self.verifier.verify_status(record, expect.status, &mut state.soft, message);
        if let Some(body) = &expect.body {
            self.verifier
                .check_body(record, &ExpectedBody::Literal(body.clone()), message)?;
        }
        Ok(())
    }

    async fn record_urls(
        &self,
        scenario: &Scenario,
        urls: Vec<String>,
        visual: bool,
        state: &mut ScenarioState,
    ) {
        if visual {
            match &self.visual {
                Some(verifier) => {
                    for url in &urls {
                        let name = format!("{}-{}", scenario.name, state.snapshots_taken);
                        state.snapshots_taken += 1;
                        if let Some(diff) = verifier.check(url, &name, &mut state.soft).await {
                            state.visual_diffs.push(diff);
                        }
                    }
                }
                None => debug!("Visual checks disabled; skipping {} URL(s)", urls.len()),
            }
        }
        state.resource_urls.extend(urls);
    }

    /// Update all visual baselines from current screenshots
    pub fn update_baselines(&self) -> E2eResult<usize> {
        match &self.visual {
            Some(verifier) => verifier.tester().update_all_baselines(),
            None => Ok(0),
        }
    }

    /// Write suite results to a JSON file
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub suite: SuiteConfig,
    pub playwright: PlaywrightConfig,
    pub visual: VisualConfig,
    pub visual_enabled: bool,
    pub scenarios_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl RunnerConfig {
    pub fn new(suite: SuiteConfig) -> Self {
        Self {
            suite,
            playwright: PlaywrightConfig::default(),
            visual: VisualConfig::default(),
            visual_enabled: true,
            scenarios_dir: PathBuf::from("scenarios"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(timeout: Duration) -> ScenarioRunner {
        let mut suite = SuiteConfig::new("http://127.0.0.1:9");
        suite.scenario_timeout = timeout;
        ScenarioRunner::with_config(RunnerConfig {
            visual_enabled: false,
            ..RunnerConfig::new(suite)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_fixture_is_a_hard_failure() {
        let scenario = Scenario::from_yaml(
            r#"
name: missing-fixture
steps:
  - action: upload_image
    endpoint: image
    fixture: IMG_VALID.JPG
    expect: { status: 200 }
"#,
        )
        .unwrap();

        let result = runner(Duration::from_secs(5)).run_scenario(&scenario).await;
        assert!(!result.success);
        assert!(!result.timed_out);
        assert_eq!(result.steps_completed, 0);
        assert!(result.error.unwrap().contains("IMG_VALID.JPG"));
    }

    #[test]
    fn test_runner_config_defaults() {
        let config = RunnerConfig::new(SuiteConfig::new("http://localhost:3000"));
        assert!(config.visual_enabled);
        assert_eq!(config.output_dir, PathBuf::from("test-results"));
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScenarioRunner::with_config(RunnerConfig {
            visual_enabled: false,
            output_dir: dir.path().join("out"),
            ..RunnerConfig::new(SuiteConfig::new("http://localhost:3000"))
        })
        .unwrap();

        let suite = SuiteResult {
            total: 0,
            passed: 0,
            failed: 0,
            duration_ms: 0,
            started_at: Utc::now(),
            results: vec![],
        };
        let path = runner.write_results(&suite).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["total"], 0);
    }
}
