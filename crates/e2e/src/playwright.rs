//! Playwright browser automation for rendering uploaded images

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::config::Viewport;
use crate::error::{E2eError, E2eResult};
use crate::inspect;

/// Replaces every animated GIF on the page with a PNG of its first frame and
/// resolves once all replacements have loaded.
const FREEZE_GIFS_JS: &str = r#"
    await page.evaluate(() => Promise.all(
      Array.from(document.querySelectorAll('img'))
        .filter(img => img.src.endsWith('.gif'))
        .map(img => new Promise(resolve => {
          const frame = new Image();
          frame.crossOrigin = 'anonymous';
          frame.onload = () => {
            const canvas = document.createElement('canvas');
            canvas.width = frame.width;
            canvas.height = frame.height;
            canvas.getContext('2d').drawImage(frame, 0, 0);
            img.onload = () => resolve();
            img.onerror = () => resolve();
            img.src = canvas.toDataURL('image/png');
          };
          frame.onerror = () => resolve();
          frame.src = img.src;
        }))
    ));
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }
}

/// Browser surface that renders a resource URL into a screenshot
pub struct BrowserSurface {
    /// Absolute directory for screenshots, shared with the visual tester
    screenshot_dir: PathBuf,

    viewport: Viewport,

    browser: Browser,

    headless: bool,
}

impl BrowserSurface {
    /// Create a new surface writing into `screenshot_dir`, failing fast if
    /// Playwright is unavailable
    pub fn new(config: PlaywrightConfig, screenshot_dir: &Path) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        Self::unchecked(config, screenshot_dir)
    }

    /// Same as `new` without probing for Playwright
    pub(crate) fn unchecked(config: PlaywrightConfig, screenshot_dir: &Path) -> E2eResult<Self> {
        std::fs::create_dir_all(screenshot_dir)?;

        // Node receives this path verbatim
        Ok(Self {
            screenshot_dir: std::path::absolute(screenshot_dir)?,
            viewport: config.viewport,
            browser: config.browser,
            headless: config.headless,
        })
    }

    /// Check if Playwright is installed
    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn screenshot_path(&self, name: &str) -> PathBuf {
        self.screenshot_dir.join(format!("{}.png", name))
    }

    /// Render `url` and save a viewport screenshot as `<name>.png`
    pub async fn capture(&self, url: &str, name: &str) -> E2eResult<PathBuf> {
        let path = self.screenshot_path(name);
        let script = build_capture_script(
            self.browser,
            self.headless,
            self.viewport,
            url,
            &path.to_string_lossy(),
        );
        run_script(&script).await?;
        Ok(path)
    }
}

/// Build the Node script that captures one resource
pub fn build_capture_script(
    browser: Browser,
    headless: bool,
    viewport: Viewport,
    url: &str,
    screenshot_path: &str,
) -> String {
    // JSON string literals are valid JavaScript string literals
    let url_js = serde_json::Value::from(url).to_string();
    let path_js = serde_json::Value::from(screenshot_path).to_string();

    let mut script = format!(
        r#"
const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext();
  const page = await context.newPage();

  try {{
    await page.setViewportSize({{ width: {width}, height: {height} }});
    await page.goto({url}, {{ waitUntil: 'load' }});
"#,
        browser = browser.as_str(),
        headless = headless,
        width = viewport.width,
        height = viewport.height,
        url = url_js,
    );

    if inspect::extension(url) == "gif" {
        script.push_str(FREEZE_GIFS_JS);
    }

    script.push_str(&format!(
        r#"
    await page.screenshot({{ path: {path}, animations: 'disabled' }});
    console.log(JSON.stringify({{ success: true }}));
  }} catch (error) {{
    console.error(JSON.stringify({{ success: false, error: error.message, stack: error.stack }}));
    process.exit(1);
  }} finally {{
    await browser.close();
  }}
}})();
"#,
        path = path_js,
    ));

    script
}

/// Execute a script via Node with Playwright available
///
/// The script runs from the current directory, and `require` also searches
/// that directory's `node_modules`.
pub async fn run_script(script: &str) -> E2eResult<()> {
    // Write script to temp file
    let temp_dir = tempfile::tempdir()?;
    let script_path = temp_dir.path().join("capture.js");
    std::fs::write(&script_path, script)?;

    let work_dir = std::env::current_dir()?;
    let node_path = node_path(&work_dir)?;

    debug!("Running Playwright script: {}", script_path.display());

    let output = TokioCommand::new("node")
        .arg(&script_path)
        .current_dir(&work_dir)
        .env("NODE_PATH", node_path)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        return Err(E2eError::Playwright(format!(
            "Script failed:\nstdout: {}\nstderr: {}",
            stdout, stderr
        )));
    }

    Ok(())
}

/// `<work_dir>/node_modules` ahead of any inherited `NODE_PATH`
fn node_path(work_dir: &Path) -> E2eResult<OsString> {
    let mut dirs = vec![work_dir.join("node_modules")];
    if let Some(inherited) = std::env::var_os("NODE_PATH") {
        dirs.extend(std::env::split_paths(&inherited));
    }
    std::env::join_paths(dirs)
        .map_err(|e| E2eError::Playwright(format!("Invalid NODE_PATH: {}", e)))
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub viewport: Viewport,
    pub browser: Browser,
    pub headless: bool,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            browser: Browser::Chromium,
            headless: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visual::{VisualConfig, VisualTester};

    fn script_for(url: &str) -> String {
        build_capture_script(
            Browser::Firefox,
            true,
            Viewport { width: 1280, height: 720 },
            url,
            "/tmp/shots/T001-0.png",
        )
    }

    #[test]
    fn test_script_sets_viewport_and_navigates() {
        let script = script_for("https://uploads.example.com/images/abc.jpg");
        assert!(script.contains("await firefox.launch({ headless: true })"));
        assert!(script.contains("setViewportSize({ width: 1280, height: 720 })"));
        assert!(script.contains(r#"page.goto("https://uploads.example.com/images/abc.jpg""#));
        assert!(script.contains(r#"path: "/tmp/shots/T001-0.png""#));
        assert!(!script.contains("toDataURL"));
    }

    #[test]
    fn test_gif_resources_are_frozen() {
        let script = script_for("https://uploads.example.com/images/abc.gif");
        assert!(script.contains("toDataURL('image/png')"));
    }

    #[test]
    fn test_url_is_quoted_safely() {
        let script = script_for("https://host/images/it's.jpg");
        assert!(script.contains(r#""https://host/images/it's.jpg""#));
    }

    #[test]
    fn test_browser_parse_defaults_to_chromium() {
        assert_eq!(Browser::parse("webkit"), Browser::Webkit);
        assert_eq!(Browser::parse("edge"), Browser::Chromium);
    }

    #[test]
    fn test_screenshot_dir_is_absolute() {
        let config = VisualConfig::default();
        let surface =
            BrowserSurface::unchecked(PlaywrightConfig::default(), &config.actual_dir).unwrap();
        let path = surface.screenshot_path("T001-0");
        assert!(path.is_absolute());
        assert_eq!(path, VisualTester::new(&config).unwrap().actual_path("T001-0"));
    }

    #[test]
    fn test_node_path_prefers_work_dir_modules() {
        let paths = node_path(Path::new("/work")).unwrap();
        let first = std::env::split_paths(&paths).next().unwrap();
        assert_eq!(first, PathBuf::from("/work/node_modules"));
    }

    fn node_available() -> bool {
        Command::new("node")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_script_output_lands_where_tester_looks() {
        if !node_available() {
            eprintln!("node not installed; skipping");
            return;
        }

        let config = VisualConfig::default();
        let tester = VisualTester::new(&config).unwrap();
        let surface =
            BrowserSurface::unchecked(PlaywrightConfig::default(), &config.actual_dir).unwrap();

        let name = "script-output-location";
        let target = surface.screenshot_path(name);
        let _ = std::fs::remove_file(&target);

        // Same path literal a capture script would carry
        let path_js = serde_json::Value::from(target.to_string_lossy().into_owned()).to_string();
        run_script(&format!("require('fs').writeFileSync({}, 'png');", path_js))
            .await
            .unwrap();

        let actual = tester.actual_path(name);
        assert!(actual.exists(), "{} missing", actual.display());
        std::fs::remove_file(actual).unwrap();
    }
}
