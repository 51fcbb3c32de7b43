//! Declarative YAML scenario definitions

use std::collections::HashSet;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::config::SuiteConfig;
use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Overrides the suite-wide wall-clock ceiling
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

/// Which service route a step targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Image,
    Zip,
}

impl Endpoint {
    pub fn url<'a>(&self, config: &'a SuiteConfig) -> &'a str {
        match self {
            Endpoint::Image => &config.image_endpoint,
            Endpoint::Zip => &config.zip_endpoint,
        }
    }
}

/// Expected outcome of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expect {
    pub status: u16,

    /// Exact body for non-success statuses; success bodies are derived
    /// from the uploaded fixture
    #[serde(default)]
    pub body: Option<String>,
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// POST one file as an image upload
    UploadImage {
        endpoint: Endpoint,
        fixture: String,
        expect: Expect,
        /// Compare each returned URL against its reference snapshot
        #[serde(default)]
        visual: bool,
    },

    /// POST one ZIP archive
    UploadArchive {
        endpoint: Endpoint,
        fixture: String,
        expect: Expect,
        #[serde(default)]
        visual: bool,
    },

    /// POST several ZIP archives in one request
    UploadArchives {
        endpoint: Endpoint,
        fixtures: Vec<String>,
        expect: Expect,
    },

    /// PUT one file as an image upload
    PutImage {
        endpoint: Endpoint,
        fixture: String,
        expect: Expect,
    },

    Get {
        endpoint: Endpoint,
        expect: Expect,
    },

    Delete {
        endpoint: Endpoint,
        expect: Expect,
    },
}

impl Step {
    /// Short label used in logs and results
    pub fn label(&self) -> String {
        match self {
            Step::UploadImage { fixture, .. } => format!("upload_image:{}", fixture),
            Step::UploadArchive { fixture, .. } => format!("upload_archive:{}", fixture),
            Step::UploadArchives { fixtures, .. } => {
                format!("upload_archives:{}", fixtures.join(","))
            }
            Step::PutImage { fixture, .. } => format!("put_image:{}", fixture),
            Step::Get { endpoint, .. } => format!("get:{:?}", endpoint).to_lowercase(),
            Step::Delete { endpoint, .. } => format!("delete:{:?}", endpoint).to_lowercase(),
        }
    }

    /// Fixture names this step reads
    pub fn fixtures(&self) -> Vec<&str> {
        match self {
            Step::UploadImage { fixture, .. }
            | Step::UploadArchive { fixture, .. }
            | Step::PutImage { fixture, .. } => vec![fixture.as_str()],
            Step::UploadArchives { fixtures, .. } => fixtures.iter().map(String::as_str).collect(),
            Step::Get { .. } | Step::Delete { .. } => Vec::new(),
        }
    }
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        if scenario.steps.is_empty() {
            return Err(E2eError::ScenarioParse(format!(
                "scenario '{}' has no steps",
                scenario.name
            )));
        }
        Ok(scenario)
    }

    /// Parse a scenario file, which may hold several YAML documents
    pub fn from_file(path: &Path) -> E2eResult<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        let mut scenarios = Vec::new();

        for document in serde_yaml::Deserializer::from_str(&content) {
            let scenario = Self::deserialize(document).map_err(|e| {
                E2eError::ScenarioParse(format!("{}: {}", path.display(), e))
            })?;
            if scenario.steps.is_empty() {
                return Err(E2eError::ScenarioParse(format!(
                    "{}: scenario '{}' has no steps",
                    path.display(),
                    scenario.name
                )));
            }
            scenarios.push(scenario);
        }

        Ok(scenarios)
    }

    /// Load all scenarios from a directory, ordered by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.extend(Self::from_file(entry.path())?);
        }

        let mut seen = HashSet::new();
        for scenario in &scenarios {
            if !seen.insert(scenario.name.as_str()) {
                return Err(E2eError::ScenarioParse(format!(
                    "duplicate scenario name '{}'",
                    scenario.name
                )));
            }
        }

        Ok(scenarios)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}
