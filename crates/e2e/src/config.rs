//! Suite configuration resolved from the environment
//!
//! Everything a scenario needs from the outside world (service URLs, fixture
//! paths, thresholds) is resolved once into an immutable [`SuiteConfig`] and
//! handed to each component by reference.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Whether the service is expected to accept a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    Valid,
    Invalid,
}

/// What kind of content a fixture holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Archive,
    Video,
    Document,
    Spreadsheet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    /// Close to the service's upload ceiling
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureTag {
    pub validity: Validity,
    pub media: MediaKind,
    pub size: SizeClass,
}

/// A static input file with a known classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub path: PathBuf,
    pub tag: FixtureTag,
}

/// Named fixtures, keyed like `IMG_VALID.JPG` or `ZIP_INVALID.XLS`
#[derive(Debug, Clone, Default)]
pub struct FixtureSet {
    fixtures: BTreeMap<String, Fixture>,
}

impl FixtureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, fixture: Fixture) {
        self.fixtures.insert(name.into(), fixture);
    }

    pub fn get(&self, name: &str) -> Option<&Fixture> {
        self.fixtures.get(name)
    }

    /// Resolve a fixture name to its path, failing if it was never configured
    pub fn path(&self, name: &str) -> E2eResult<&Path> {
        self.get(name)
            .map(|f| f.path.as_path())
            .ok_or_else(|| E2eError::Config(format!("fixture '{}' is not configured", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fixtures.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum FixtureRoot {
    Images,
    Zips,
}

struct FixtureDef {
    name: &'static str,
    env: &'static str,
    root: FixtureRoot,
    tag: FixtureTag,
}

const fn def(
    name: &'static str,
    env: &'static str,
    root: FixtureRoot,
    validity: Validity,
    media: MediaKind,
    size: SizeClass,
) -> FixtureDef {
    FixtureDef {
        name,
        env,
        root,
        tag: FixtureTag { validity, media, size },
    }
}

const FIXTURES: &[FixtureDef] = &[
    def("IMG_VALID.JPG", "IMAGE_VALID_JPG", FixtureRoot::Images, Validity::Valid, MediaKind::Image, SizeClass::Small),
    def("IMG_VALID.JPG_MAX_SIZE", "IMAGE_VALID_MAX_SIZE_JPG", FixtureRoot::Images, Validity::Valid, MediaKind::Image, SizeClass::Max),
    def("IMG_VALID.GIF", "IMAGE_VALID_GIF", FixtureRoot::Images, Validity::Valid, MediaKind::Image, SizeClass::Small),
    def("IMG_VALID.GIF_MAX_SIZE", "IMAGE_VALID_MAX_SIZE_GIF", FixtureRoot::Images, Validity::Valid, MediaKind::Image, SizeClass::Max),
    def("IMG_INVALID.MP4_MAX_SIZE", "IMAGE_INVALID_MAX_SIZE_MP4", FixtureRoot::Images, Validity::Invalid, MediaKind::Video, SizeClass::Max),
    def("IMG_INVALID.PDF", "IMAGE_INVALID_PDF", FixtureRoot::Images, Validity::Invalid, MediaKind::Document, SizeClass::Small),
    def("IMG_INVALID.XLS", "IMAGE_INVALID_XLS", FixtureRoot::Images, Validity::Invalid, MediaKind::Spreadsheet, SizeClass::Small),
    def("IMG_INVALID.DOC", "IMAGE_INVALID_DOC", FixtureRoot::Images, Validity::Invalid, MediaKind::Document, SizeClass::Small),
    def("ZIP_VALID.JPG", "ZIP_VALID_JPG", FixtureRoot::Zips, Validity::Valid, MediaKind::Archive, SizeClass::Small),
    def("ZIP_VALID.JPG_MAX", "ZIP_VALID_JPG_MAX", FixtureRoot::Zips, Validity::Valid, MediaKind::Archive, SizeClass::Max),
    def("ZIP_VALID.GIF", "ZIP_VALID_GIF", FixtureRoot::Zips, Validity::Valid, MediaKind::Archive, SizeClass::Small),
    def("ZIP_VALID.JPG_PNG_GIF", "ZIP_VALID_JPG_PNG_GIF", FixtureRoot::Zips, Validity::Valid, MediaKind::Archive, SizeClass::Small),
    def("ZIP_INVALID.PNG", "ZIP_INVALID_PNG", FixtureRoot::Zips, Validity::Invalid, MediaKind::Image, SizeClass::Small),
    def("ZIP_INVALID.XLS", "ZIP_INVALID_XLS", FixtureRoot::Zips, Validity::Invalid, MediaKind::Archive, SizeClass::Small),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

/// Prefixes used when recording failed assertions
#[derive(Debug, Clone)]
pub struct AssertionMessages {
    pub post_status: String,
    pub post_body: String,
    pub get_status: String,
    pub put_status: String,
    pub delete_status: String,
}

impl Default for AssertionMessages {
    fn default() -> Self {
        Self {
            post_status: "Unexpected POST response status for ".to_string(),
            post_body: "Unexpected POST response body for ".to_string(),
            get_status: "Unexpected GET response status".to_string(),
            put_status: "Unexpected PUT response status for ".to_string(),
            delete_status: "Unexpected DELETE response status".to_string(),
        }
    }
}

/// Immutable configuration shared by every component of a suite run
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Service root, e.g. `https://service.example.com`
    pub base_url: String,

    /// Full URL of the single-image upload endpoint
    pub image_endpoint: String,

    /// Full URL of the archive upload endpoint
    pub zip_endpoint: String,

    pub fixtures: FixtureSet,

    /// Status code the service returns for accepted uploads
    pub status_ok: u16,

    /// Accepted ratio of differing pixels (0.0 - 1.0)
    pub max_diff_pixel_ratio: f64,

    pub viewport: Viewport,

    /// Wall-clock ceiling for a single scenario
    pub scenario_timeout: Duration,

    pub messages: AssertionMessages,
}

impl SuiteConfig {
    /// Build a config for a service at `base_url` using the conventional
    /// `/api/image` and `/api/zip` routes and no fixtures
    pub fn new(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            image_endpoint: join_url(&base_url, "/api/image"),
            zip_endpoint: join_url(&base_url, "/api/zip"),
            base_url,
            fixtures: FixtureSet::new(),
            status_ok: 200,
            max_diff_pixel_ratio: 0.01,
            viewport: Viewport::default(),
            scenario_timeout: Duration::from_secs(60),
            messages: AssertionMessages::default(),
        }
    }

    /// Load configuration from the process environment, reading `.env` first
    pub fn from_env() -> E2eResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> E2eResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| E2eError::Config(format!("{} is not set", key)))
        };

        let mut config = Self::new(&required("BASE_URL")?);
        config.image_endpoint = join_url(&config.base_url, &required("ENDPOINT_IMAGE")?);
        config.zip_endpoint = join_url(&config.base_url, &required("ENDPOINT_ZIP")?);

        if let Some(v) = lookup("RESPONSE_STATUS_OK") {
            config.status_ok = parse_var("RESPONSE_STATUS_OK", &v)?;
        }
        if let Some(v) = lookup("MAX_ALLOW_DIFF_PIXEL_RATIO") {
            let ratio: f64 = parse_var("MAX_ALLOW_DIFF_PIXEL_RATIO", &v)?;
            if !(0.0..=1.0).contains(&ratio) {
                return Err(E2eError::Config(format!(
                    "MAX_ALLOW_DIFF_PIXEL_RATIO must be within 0.0..=1.0, got {}",
                    ratio
                )));
            }
            config.max_diff_pixel_ratio = ratio;
        }
        if let Some(v) = lookup("SCENARIO_TIMEOUT_SECS") {
            config.scenario_timeout = Duration::from_secs(parse_var("SCENARIO_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("BROWSER_WIDTH") {
            config.viewport.width = parse_var("BROWSER_WIDTH", &v)?;
        }
        if let Some(v) = lookup("BROWSER_HEIGHT") {
            config.viewport.height = parse_var("BROWSER_HEIGHT", &v)?;
        }

        let messages = &mut config.messages;
        for (key, slot) in [
            ("ERROR_MESSAGE_POST_RESPONSE_STATUS", &mut messages.post_status),
            ("ERROR_MESSAGE_POST_RESPONSE_BODY", &mut messages.post_body),
            ("ERROR_MESSAGE_GET_RESPONSE_STATUS", &mut messages.get_status),
            ("ERROR_MESSAGE_PUT_RESPONSE_STATUS", &mut messages.put_status),
            ("ERROR_MESSAGE_DELETE_RESPONSE_STATUS", &mut messages.delete_status),
        ] {
            if let Some(v) = lookup(key) {
                *slot = v;
            }
        }

        let valid = lookup("VALID_FOLDER").unwrap_or_else(|| "valid".to_string());
        let invalid = lookup("INVALID_FOLDER").unwrap_or_else(|| "invalid".to_string());
        let images_root = lookup("INPUT_IMAGES_FOLDER").map(PathBuf::from);
        let zips_root = lookup("INPUT_ZIPS_FOLDER").map(PathBuf::from);

        for fixture in FIXTURES {
            let root = match fixture.root {
                FixtureRoot::Images => images_root.as_ref(),
                FixtureRoot::Zips => zips_root.as_ref(),
            };
            let (Some(root), Some(file)) = (root, lookup(fixture.env)) else {
                continue;
            };
            let folder = match fixture.tag.validity {
                Validity::Valid => &valid,
                Validity::Invalid => &invalid,
            };
            let path = root
                .join(folder.trim_matches('/'))
                .join(file.trim_start_matches('/'));
            config.fixtures.insert(fixture.name, Fixture { path, tag: fixture.tag });
        }

        debug!(
            "Resolved {} fixture(s) for {}",
            config.fixtures.len(),
            config.base_url
        );

        Ok(config)
    }

    /// URL prefix under which the service publishes stored images
    pub fn images_base(&self) -> String {
        format!("{}/images/", self.base_url)
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> E2eResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| E2eError::Config(format!("{} has an invalid value: '{}'", key, value)))
}
