//! Response verification: soft status checks, hard body checks, URL extraction

use std::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SuiteConfig;
use crate::error::{E2eError, E2eResult};
use crate::http::ResponseRecord;
use crate::inspect;
use crate::matcher;

/// What the response body must look like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedBody {
    /// Exact body text
    Literal(String),
    /// `{"image": "<url>.<extension>"}`
    ImageUrl { extension: String },
    /// `{"images": [...]}` with one URL per extension, in order
    ArchiveUrls { extensions: Vec<String> },
    /// Status-only check
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub status: u16,
    pub body: ExpectedBody,
}

impl Expectation {
    pub fn status_only(status: u16) -> Self {
        Self { status, body: ExpectedBody::Unchecked }
    }

    pub fn literal(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: ExpectedBody::Literal(body.into()) }
    }
}

/// Soft assertion failures recorded during one scenario
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftFailures {
    messages: Vec<String>,
}

impl SoftFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("Soft assertion failed: {}", message);
        self.messages.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

/// Checks responses against expectations derived from the suite config
pub struct ResponseVerifier {
    status_ok: u16,
    images_base: String,
    status_message: String,
    body_message: String,
}

impl ResponseVerifier {
    pub fn new(config: &SuiteConfig) -> Self {
        Self {
            status_ok: config.status_ok,
            images_base: config.images_base(),
            status_message: config.messages.post_status.clone(),
            body_message: config.messages.post_body.clone(),
        }
    }

    fn fallback_body(literal: Option<&str>) -> ExpectedBody {
        match literal {
            Some(body) => ExpectedBody::Literal(body.to_string()),
            None => ExpectedBody::Unchecked,
        }
    }

    /// Expectation for a single-image upload of `path`
    pub fn expectation_for_image(
        &self,
        status: u16,
        literal: Option<&str>,
        path: &Path,
    ) -> Expectation {
        let body = if status == self.status_ok {
            ExpectedBody::ImageUrl { extension: inspect::path_extension(path) }
        } else {
            Self::fallback_body(literal)
        };
        Expectation { status, body }
    }

    /// Expectation for an archive upload of `path`
    ///
    /// On the success path the archive must be readable: an unreadable
    /// archive would otherwise produce a pattern for zero images.
    pub fn expectation_for_archive(
        &self,
        status: u16,
        literal: Option<&str>,
        path: &Path,
    ) -> E2eResult<Expectation> {
        let body = if status == self.status_ok {
            let entries = inspect::archive_entries(path).into_entries(path)?;
            let extensions = entries
                .iter()
                .map(|name| inspect::extension(name).to_string())
                .collect();
            ExpectedBody::ArchiveUrls { extensions }
        } else {
            Self::fallback_body(literal)
        };
        Ok(Expectation { status, body })
    }

    /// Status check only; a mismatch is recorded, never raised
    pub fn verify_status(
        &self,
        record: &ResponseRecord,
        expected: u16,
        failures: &mut SoftFailures,
        message: &str,
    ) -> bool {
        if record.status == expected {
            return true;
        }
        failures.record(format!(
            "{}: expected status {}, got {}",
            message, expected, record.status
        ));
        false
    }

    /// Check status (soft) then body (hard); return resource URLs on success
    pub fn verify(
        &self,
        record: &ResponseRecord,
        expectation: &Expectation,
        failures: &mut SoftFailures,
        context: &str,
    ) -> E2eResult<Vec<String>> {
        let status_message = format!("{}{}", self.status_message, context);
        self.verify_status(record, expectation.status, failures, &status_message);

        self.check_body(record, &expectation.body, context)?;

        if expectation.status != self.status_ok {
            return Ok(Vec::new());
        }

        let urls = extract_urls(&record.body, &expectation.body, context)?;
        debug!("{} returned {} resource URL(s)", context, urls.len());
        Ok(urls)
    }

    /// Hard body check; a mismatch is returned as [`E2eError::BodyMismatch`]
    pub fn check_body(
        &self,
        record: &ResponseRecord,
        body: &ExpectedBody,
        context: &str,
    ) -> E2eResult<()> {
        let mismatch = |expected: String| E2eError::BodyMismatch {
            context: format!("{}{}", self.body_message, context),
            expected,
            actual: record.body.clone(),
        };

        match body {
            ExpectedBody::Literal(expected) => {
                if &record.body != expected {
                    return Err(mismatch(expected.clone()));
                }
            }
            ExpectedBody::ImageUrl { extension } => {
                let re = matcher::image_url_pattern(&self.images_base, extension)?;
                if !re.is_match(&record.body) {
                    return Err(mismatch(re.as_str().to_string()));
                }
            }
            ExpectedBody::ArchiveUrls { extensions } => {
                let re = matcher::archive_urls_pattern(&self.images_base, extensions)?;
                if !re.is_match(&record.body) {
                    return Err(mismatch(re.as_str().to_string()));
                }
            }
            ExpectedBody::Unchecked => {}
        }

        Ok(())
    }
}

/// Pull `image` / `images` out of a success body
fn extract_urls(body: &str, expected: &ExpectedBody, context: &str) -> E2eResult<Vec<String>> {
    let json: Value = serde_json::from_str(body)?;

    let missing = |field: &str| E2eError::MissingField {
        context: context.to_string(),
        field: field.to_string(),
    };

    match expected {
        ExpectedBody::ArchiveUrls { .. } => json
            .get("images")
            .and_then(Value::as_array)
            .ok_or_else(|| missing("images"))?
            .iter()
            .map(|v| v.as_str().map(String::from).ok_or_else(|| missing("images[]")))
            .collect(),
        _ => {
            if let Some(url) = json.get("image").and_then(Value::as_str) {
                Ok(vec![url.to_string()])
            } else if let Some(urls) = json.get("images").and_then(Value::as_array) {
                Ok(urls.iter().filter_map(Value::as_str).map(String::from).collect())
            } else {
                Err(missing("image"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const ID: &str = "0f8e7d6c-5b4a-4392-8171-6f5e4d3c2b1a";

    fn verifier() -> ResponseVerifier {
        ResponseVerifier::new(&SuiteConfig::new("https://uploads.example.com"))
    }

    fn record(status: u16, body: &str) -> ResponseRecord {
        ResponseRecord { status, body: body.to_string() }
    }

    #[test]
    fn test_image_success_returns_url() {
        let v = verifier();
        let expectation = v.expectation_for_image(200, None, Path::new("fixtures/cat.jpeg"));
        assert_eq!(expectation.body, ExpectedBody::ImageUrl { extension: "jpeg".to_string() });

        let url = format!("https://uploads.example.com/images/{}.jpg", ID);
        let body = format!(r#"{{"image":"{}"}}"#, url);
        let mut failures = SoftFailures::new();

        let urls = v.verify(&record(200, &body), &expectation, &mut failures, "cat.jpeg").unwrap();
        assert_eq!(urls, vec![url]);
        assert!(failures.is_empty());
    }

    #[test]
    fn test_status_mismatch_is_soft() {
        let v = verifier();
        let expectation = Expectation::literal(403, r#"{"err":"File isn't an image"}"#);
        let mut failures = SoftFailures::new();

        let response = record(400, r#"{"err":"File isn't an image"}"#);
        let urls = v
            .verify(&response, &expectation, &mut failures, "doc.pdf")
            .unwrap();

        assert!(urls.is_empty());
        assert_eq!(failures.len(), 1);
        assert!(failures.messages()[0].contains("expected status 403, got 400"));
        assert!(failures.messages()[0].contains("doc.pdf"));
    }

    #[test]
    fn test_body_mismatch_is_hard() {
        let v = verifier();
        let expectation = Expectation::literal(403, r#"{"err":"File isn't a zip"}"#);
        let mut failures = SoftFailures::new();

        let err = v
            .verify(&record(403, r#"{"err":"other"}"#), &expectation, &mut failures, "a.png")
            .unwrap_err();
        assert!(matches!(err, E2eError::BodyMismatch { .. }));
        assert!(failures.is_empty());
    }

    #[test]
    fn test_status_and_body_failures_both_surface() {
        let v = verifier();
        let expectation = v.expectation_for_image(200, None, Path::new("x.gif"));
        let mut failures = SoftFailures::new();

        let result = v.verify(&record(500, "oops"), &expectation, &mut failures, "x.gif");
        assert!(result.is_err());
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn test_archive_expectation_follows_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three.zip");
        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        for name in ["one.jpg", "two.png", "three.gif"] {
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(b"data").unwrap();
        }
        writer.finish().unwrap();

        let v = verifier();
        let expectation = v.expectation_for_archive(200, None, &path).unwrap();
        assert_eq!(
            expectation.body,
            ExpectedBody::ArchiveUrls {
                extensions: vec!["jpg".into(), "png".into(), "gif".into()]
            }
        );

        let urls: Vec<String> = ["jpg", "png", "gif"]
            .iter()
            .map(|e| format!("https://uploads.example.com/images/{}.{}", ID, e))
            .collect();
        let body = serde_json::json!({ "images": urls }).to_string();
        let mut failures = SoftFailures::new();

        let response = record(200, &body);
        let extracted = v
            .verify(&response, &expectation, &mut failures, "three.zip")
            .unwrap();
        assert_eq!(extracted, urls);
    }

    #[test]
    fn test_unreadable_archive_fails_on_success_path_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"nope").unwrap();

        let v = verifier();
        assert!(matches!(
            v.expectation_for_archive(200, None, &path),
            Err(E2eError::Fixture(_))
        ));

        let expectation = v
            .expectation_for_archive(403, Some(r#"{"err":"no image found in zip file"}"#), &path)
            .unwrap();
        assert_eq!(
            expectation.body,
            ExpectedBody::Literal(r#"{"err":"no image found in zip file"}"#.to_string())
        );
    }

    #[test]
    fn test_malformed_json_on_success_propagates() {
        let v = verifier();
        let expectation = Expectation::literal(200, "not json");
        let mut failures = SoftFailures::new();

        let err = v
            .verify(&record(200, "not json"), &expectation, &mut failures, "x.jpg")
            .unwrap_err();
        assert!(matches!(err, E2eError::Json(_)));
    }
}
