//! Response body patterns for successful uploads
//!
//! Pure functions from "expected extensions" to a compiled [`Regex`], kept
//! apart from any HTTP concerns so they can be tested in isolation.

use regex::Regex;

use crate::error::E2eResult;

/// 8-4-4-4-12 hexadecimal groups
pub const UUID_PATTERN: &str =
    "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

/// The service stores `jpeg` uploads under a `jpg` name
pub fn normalize_extension(ext: &str) -> &str {
    if ext == "jpeg" {
        "jpg"
    } else {
        ext
    }
}

/// Quoted JSON string holding `<images_base><uuid>.<ext>`
fn url_literal(images_base: &str, ext: &str) -> String {
    format!(
        r#""{}{}\.{}""#,
        regex::escape(images_base),
        UUID_PATTERN,
        regex::escape(ext)
    )
}

/// Pattern for `{"image":"<images_base><uuid>.<ext>"}` with `jpeg` normalized
pub fn image_url_pattern(images_base: &str, ext: &str) -> E2eResult<Regex> {
    let pattern = format!(
        r#"^\{{"image":{}\}}$"#,
        url_literal(images_base, normalize_extension(ext))
    );
    Ok(Regex::new(&pattern)?)
}

/// Pattern for `{"images":[...]}` holding exactly one URL per extension, in order
pub fn archive_urls_pattern<S: AsRef<str>>(images_base: &str, exts: &[S]) -> E2eResult<Regex> {
    let urls = exts
        .iter()
        .map(|ext| url_literal(images_base, ext.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    let pattern = format!(r#"^\{{"images":\[{}\]\}}$"#, urls);
    Ok(Regex::new(&pattern)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const BASE: &str = "https://uploads.example.com/images/";
    const ID: &str = "3f2b8c1e-9a4d-4c7e-8b1a-0d9e6f5a4b3c";

    #[test_case("jpeg", "jpg" ; "jpeg becomes jpg")]
    #[test_case("jpg", "jpg" ; "jpg unchanged")]
    #[test_case("gif", "gif" ; "gif unchanged")]
    #[test_case("JPEG", "JPEG" ; "case sensitive")]
    fn test_normalize_extension(input: &str, expected: &str) {
        assert_eq!(normalize_extension(input), expected);
    }

    #[test]
    fn test_image_pattern_accepts_service_body() {
        let re = image_url_pattern(BASE, "jpeg").unwrap();
        let body = format!(r#"{{"image":"{}{}.jpg"}}"#, BASE, ID);
        assert!(re.is_match(&body));
    }

    #[test_case(r#"{"image":"https://uploads.example.com/images/3f2b8c1e-9a4d-4c7e-8b1a-0d9e6f5a4b3c.gif"}"# ; "wrong extension")]
    #[test_case(r#"{"image":"https://uploads.example.com/images/not-a-uuid.jpg"}"# ; "bad identifier")]
    #[test_case(r#"{"image":"https://uploads.example.com/images/3f2b8c1e-9a4d-4c7e-8b1a-0d9e6f5a4b3c.jpg"} "# ; "trailing garbage")]
    #[test_case(r#"{"image":"https://uploadsXexample.com/images/3f2b8c1e-9a4d-4c7e-8b1a-0d9e6f5a4b3c.jpg"}"# ; "base is literal")]
    #[test_case(r#"{"err":"File isn't an image"}"# ; "error body")]
    fn test_image_pattern_rejects(body: &str) {
        let re = image_url_pattern(BASE, "jpg").unwrap();
        assert!(!re.is_match(body));
    }

    #[test]
    fn test_archive_pattern_is_positional() {
        let re = archive_urls_pattern(BASE, &["jpg", "png", "gif"]).unwrap();

        let urls = |exts: &[&str]| {
            exts.iter()
                .map(|e| format!(r#""{}{}.{}""#, BASE, ID, e))
                .collect::<Vec<_>>()
                .join(",")
        };

        assert!(re.is_match(&format!(r#"{{"images":[{}]}}"#, urls(&["jpg", "png", "gif"]))));
        assert!(!re.is_match(&format!(r#"{{"images":[{}]}}"#, urls(&["png", "jpg", "gif"]))));
        assert!(!re.is_match(&format!(r#"{{"images":[{}]}}"#, urls(&["jpg", "png"]))));
        assert!(!re.is_match(&format!(
            r#"{{"images":[{}]}}"#,
            urls(&["jpg", "png", "gif", "gif"])
        )));
    }

    #[test]
    fn test_archive_pattern_for_no_entries() {
        let re = archive_urls_pattern::<&str>(BASE, &[]).unwrap();
        assert!(re.is_match(r#"{"images":[]}"#));
    }
}
