//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Response body mismatch for {context}: expected {expected}, got {actual}")]
    BodyMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Response body for {context} is missing '{field}'")]
    MissingField { context: String, field: String },

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Visual regression: {0}")]
    VisualRegression(String),

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("Timeout after {secs}s: {scenario}")]
    Timeout { scenario: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
