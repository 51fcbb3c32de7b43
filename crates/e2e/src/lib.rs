//! Upload service E2E test framework
//!
//! This crate drives a remote image/archive upload service and checks its
//! HTTP behaviour:
//! - Issues GET/POST/PUT/DELETE requests with multipart file attachments
//! - Verifies status codes (soft) and response bodies (hard)
//! - Derives expected success bodies from the uploaded file or ZIP contents
//! - Renders returned image URLs with Playwright and compares them against
//!   reference snapshots
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scenario Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── UploadClient::new() per scenario                     │
//! │    ├── execute steps sequentially under a time ceiling      │
//! │    ├── ResponseVerifier::verify(record, expectation)        │
//! │    │     └── inspect::archive_entries -> matcher patterns   │
//! │    └── VisualVerifier::check(url) -> VisualDiff             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML)                                            │
//! │    ├── name, description, tags, timeout_secs                │
//! │    └── steps: [Step]                                        │
//! │          ├── upload_image { endpoint, fixture, expect }     │
//! │          ├── upload_archive { endpoint, fixture, expect }   │
//! │          ├── upload_archives { endpoint, fixtures, expect } │
//! │          ├── put_image { endpoint, fixture, expect }        │
//! │          └── get / delete { endpoint, expect }              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod inspect;
pub mod matcher;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod verify;
pub mod visual;

pub use config::SuiteConfig;
pub use error::{E2eError, E2eResult};
pub use runner::ScenarioRunner;
pub use scenario::{Scenario, Step};
