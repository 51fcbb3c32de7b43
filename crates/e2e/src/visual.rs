//! Visual regression testing with screenshot comparison

use std::path::{Path, PathBuf};
use image::{GenericImageView, Pixel, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::playwright::BrowserSurface;
use crate::verify::SoftFailures;

/// Result of a visual comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualDiff {
    pub name: String,

    /// Whether the images match (within the allowed ratio)
    pub matches: bool,

    /// Fraction of pixels that differ (0.0 - 1.0)
    pub diff_ratio: f64,

    /// Number of different pixels
    pub diff_pixels: u64,

    /// Total pixels compared
    pub total_pixels: u64,

    /// Path to the diff image (if generated)
    pub diff_image_path: Option<PathBuf>,

    /// Hash of the actual screenshot
    pub actual_hash: String,

    /// Hash of the baseline screenshot
    pub baseline_hash: String,
}

/// Compares captured screenshots against stored reference snapshots
pub struct VisualTester {
    /// Directory containing baseline screenshots
    baseline_dir: PathBuf,

    /// Directory for actual screenshots
    actual_dir: PathBuf,

    /// Directory for diff images
    diff_dir: PathBuf,

    /// Whether to create baselines when missing
    auto_update: bool,
}

impl VisualTester {
    pub fn new(config: &VisualConfig) -> E2eResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.actual_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;

        Ok(Self {
            baseline_dir: std::path::absolute(&config.baseline_dir)?,
            actual_dir: std::path::absolute(&config.actual_dir)?,
            diff_dir: std::path::absolute(&config.diff_dir)?,
            auto_update: config.auto_update,
        })
    }

    /// Where screenshots are expected; the browser surface writes here
    pub fn actual_dir(&self) -> &Path {
        &self.actual_dir
    }

    pub fn actual_path(&self, name: &str) -> PathBuf {
        self.actual_dir.join(format!("{}.png", name))
    }

    pub fn baseline_path(&self, name: &str) -> PathBuf {
        self.baseline_dir.join(format!("{}.png", name))
    }

    /// Compare a screenshot against its baseline
    pub fn compare(&self, name: &str, max_diff_ratio: f64) -> E2eResult<VisualDiff> {
        let actual_path = self.actual_path(name);
        let baseline_path = self.baseline_path(name);

        if !actual_path.exists() {
            return Err(E2eError::VisualRegression(format!(
                "Actual screenshot not found: {}",
                actual_path.display()
            )));
        }

        if !baseline_path.exists() {
            if !self.auto_update {
                return Err(E2eError::BaselineNotFound(baseline_path.to_string_lossy().to_string()));
            }

            info!("Creating baseline for '{}' (auto-update enabled)", name);
            std::fs::copy(&actual_path, &baseline_path)?;

            let actual_hash = hash_file(&actual_path)?;
            return Ok(VisualDiff {
                name: name.to_string(),
                matches: true,
                diff_ratio: 0.0,
                diff_pixels: 0,
                total_pixels: 0,
                diff_image_path: None,
                actual_hash: actual_hash.clone(),
                baseline_hash: actual_hash,
            });
        }

        let actual_img = image::open(&actual_path)?;
        let baseline_img = image::open(&baseline_path)?;

        let actual_hash = hash_file(&actual_path)?;
        let baseline_hash = hash_file(&baseline_path)?;

        if actual_hash == baseline_hash {
            debug!("Screenshots match exactly (same hash)");
            return Ok(VisualDiff {
                name: name.to_string(),
                matches: true,
                diff_ratio: 0.0,
                diff_pixels: 0,
                total_pixels: (actual_img.width() as u64) * (actual_img.height() as u64),
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            });
        }

        if actual_img.dimensions() != baseline_img.dimensions() {
            warn!(
                "Screenshot dimensions differ: actual {:?} vs baseline {:?}",
                actual_img.dimensions(),
                baseline_img.dimensions()
            );
        }

        // Pixels outside the overlapping region count as different
        let (width, height) = actual_img.dimensions();
        let baseline_rgba = baseline_img.to_rgba8();
        let actual_rgba = actual_img.to_rgba8();

        let mut diff_img = RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
        let overlap_w = width.min(baseline_img.width());
        let overlap_h = height.min(baseline_img.height());
        let total_pixels = (width as u64) * (height as u64);
        let mut diff_pixels = total_pixels - (overlap_w as u64) * (overlap_h as u64);

        for y in 0..overlap_h {
            for x in 0..overlap_w {
                let actual_pixel = actual_rgba.get_pixel(x, y);
                let baseline_pixel = baseline_rgba.get_pixel(x, y);

                if pixels_differ(actual_pixel, baseline_pixel) {
                    diff_pixels += 1;
                } else {
                    let channels = actual_pixel.channels();
                    diff_img.put_pixel(x, y, image::Rgba([
                        channels[0] / 2,
                        channels[1] / 2,
                        channels[2] / 2,
                        128,
                    ]));
                }
            }
        }

        let diff_ratio = if total_pixels == 0 {
            0.0
        } else {
            diff_pixels as f64 / total_pixels as f64
        };
        let matches = diff_ratio <= max_diff_ratio;

        let diff_image_path = if diff_pixels > 0 {
            let path = self.diff_dir.join(format!("{}-diff.png", name));
            diff_img.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "Visual regression detected in '{}': {:.4} of pixels differ (allowed: {:.4})",
                name, diff_ratio, max_diff_ratio
            );
        }

        Ok(VisualDiff {
            name: name.to_string(),
            matches,
            diff_ratio,
            diff_pixels,
            total_pixels,
            diff_image_path,
            actual_hash,
            baseline_hash,
        })
    }

    /// Update the baseline with the actual screenshot
    pub fn update_baseline(&self, name: &str) -> E2eResult<()> {
        let actual_path = self.actual_path(name);

        if !actual_path.exists() {
            return Err(E2eError::VisualRegression(format!(
                "Cannot update baseline: actual screenshot not found: {}",
                actual_path.display()
            )));
        }

        std::fs::copy(&actual_path, self.baseline_path(name))?;
        info!("Updated baseline for '{}'", name);

        Ok(())
    }

    /// Copy every captured screenshot over its baseline
    pub fn update_all_baselines(&self) -> E2eResult<usize> {
        let mut updated = 0;
        for entry in std::fs::read_dir(&self.actual_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "png").unwrap_or(false) {
                if let Some(name) = path.file_stem() {
                    self.update_baseline(&name.to_string_lossy())?;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    /// Remove diff images left by an earlier run, returning how many went
    pub fn clean_diffs(&self) -> E2eResult<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.diff_dir)? {
            let path = entry?.path();
            let is_diff = path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with("-diff.png"))
                .unwrap_or(false);
            if is_diff {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Removed {} stale diff image(s)", removed);
        }
        Ok(removed)
    }
}

/// Check if two pixels differ significantly
fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    // Allow small color differences (anti-aliasing, compression)
    const TOLERANCE: i32 = 5;

    a.channels()
        .iter()
        .zip(b.channels())
        .any(|(x, y)| (*x as i32 - *y as i32).abs() > TOLERANCE)
}

fn hash_file(path: &Path) -> E2eResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

/// Renders resource URLs and compares them against reference snapshots.
///
/// Every problem is recorded as a soft failure so a scenario can report
/// status, body and visual issues from one run.
pub struct VisualVerifier {
    surface: BrowserSurface,
    tester: VisualTester,
    max_diff_ratio: f64,
}

impl VisualVerifier {
    pub fn new(surface: BrowserSurface, tester: VisualTester, max_diff_ratio: f64) -> Self {
        Self { surface, tester, max_diff_ratio }
    }

    pub fn tester(&self) -> &VisualTester {
        &self.tester
    }

    pub async fn check(
        &self,
        url: &str,
        name: &str,
        failures: &mut SoftFailures,
    ) -> Option<VisualDiff> {
        if let Err(e) = self.surface.capture(url, name).await {
            failures.record(format!("Screenshot of {} failed: {}", url, e));
            return None;
        }

        self.assess(url, name, failures)
    }

    /// Compare an already captured screenshot and record any problem
    fn assess(&self, url: &str, name: &str, failures: &mut SoftFailures) -> Option<VisualDiff> {
        match self.tester.compare(name, self.max_diff_ratio) {
            Ok(diff) => {
                if !diff.matches {
                    failures.record(format!(
                        "Visual mismatch for {} ('{}'): {:.4} of pixels differ (allowed: {:.4})",
                        url, name, diff.diff_ratio, self.max_diff_ratio
                    ));
                }
                Some(diff)
            }
            Err(e) => {
                failures.record(format!("Visual comparison for {} failed: {}", url, e));
                None
            }
        }
    }
}

/// Configuration for visual testing
#[derive(Debug, Clone)]
pub struct VisualConfig {
    pub baseline_dir: PathBuf,
    pub actual_dir: PathBuf,
    pub diff_dir: PathBuf,
    pub auto_update: bool,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("snapshots"),
            actual_dir: PathBuf::from("test-results/screenshots"),
            diff_dir: PathBuf::from("test-results/diffs"),
            auto_update: false,
        }
    }
}
