//! Visual regression testing with screenshot comparison

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use image::{GenericImageView, Pixel, RgbaImage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::driver::{Browser, Theme};
use crate::error::{E2eError, E2eResult};

/// Identity of one baseline image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub test: String,
    pub name: String,
    pub theme: Option<Theme>,
    pub browser: Browser,
}

impl SnapshotKey {
    /// `<name>[-<theme>]-<browser>.png`
    pub fn file_name(&self) -> String {
        match self.theme {
            Some(theme) => format!("{}-{}-{}.png", self.name, theme, self.browser),
            None => format!("{}-{}.png", self.name, self.browser),
        }
    }

    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.test).join(self.file_name())
    }
}

/// Result of a visual comparison
#[derive(Debug, Clone)]
pub struct VisualDiff {
    /// Whether the images match (within threshold)
    pub matches: bool,

    /// Percentage of pixels that differ
    pub diff_percent: f64,

    /// Number of different pixels
    pub diff_pixels: u64,

    /// Total pixels compared
    pub total_pixels: u64,

    /// Hash of the actual screenshot
    pub actual_hash: String,

    /// Hash of the baseline screenshot
    pub baseline_hash: String,
}

/// What happened to a snapshot that did not fail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SnapshotOutcome {
    Matched { diff_percent: f64 },
    /// No baseline existed; the capture became the baseline and needs review
    Recorded { baseline: PathBuf },
    /// Baseline overwritten because snapshot updating is enabled
    Updated { baseline: PathBuf },
}

/// Result of evaluating one capture against the store
#[derive(Debug, Clone)]
pub enum Evaluation {
    Passed(SnapshotOutcome),
    Mismatch { diff: VisualDiff, diff_image: RgbaImage },
}

/// Configuration for visual testing
#[derive(Debug, Clone)]
pub struct VisualConfig {
    pub baseline_dir: PathBuf,
    /// Actual, expected and diff images of failed comparisons
    pub failure_dir: PathBuf,
    /// Allowed share of differing pixels (0.0 - 100.0 percent)
    pub threshold: f64,
    /// Per-channel difference still treated as equal (anti-aliasing, compression)
    pub channel_tolerance: u8,
    /// Overwrite mismatching baselines instead of failing
    pub update_snapshots: bool,
    /// Captures taken before a mismatch is final
    pub capture_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("__snapshots__"),
            failure_dir: PathBuf::from("test-results/snapshot-failures"),
            threshold: 0.2,
            channel_tolerance: 5,
            update_snapshots: false,
            capture_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Name-keyed baseline repository shared by every session of a run
pub struct SnapshotStore {
    config: VisualConfig,

    /// Per-baseline write locks; writers to one key never interleave
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl SnapshotStore {
    pub fn new(config: VisualConfig) -> E2eResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.failure_dir)?;

        Ok(Self {
            config,
            locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &VisualConfig {
        &self.config
    }

    pub fn baseline_path(&self, key: &SnapshotKey) -> PathBuf {
        self.config.baseline_dir.join(key.relative_path())
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Compare a PNG capture with its baseline, recording it when none exists.
    ///
    /// Mismatches are reported even in update mode; the caller decides once
    /// its captures have settled whether to fail or [`update_baseline`](Self::update_baseline).
    pub fn evaluate(&self, key: &SnapshotKey, actual_png: &[u8]) -> E2eResult<Evaluation> {
        let baseline_path = self.baseline_path(key);
        let lock = self.lock_for(&baseline_path);
        let _guard = lock.lock();

        if !baseline_path.exists() {
            info!("Recording new baseline for '{}' at {}", key.name, baseline_path.display());
            write_atomic(&baseline_path, actual_png)?;
            return Ok(Evaluation::Passed(SnapshotOutcome::Recorded {
                baseline: baseline_path,
            }));
        }

        let baseline_png = std::fs::read(&baseline_path)?;
        let (diff, diff_image) =
            compare_png(actual_png, &baseline_png, self.config.threshold, self.config.channel_tolerance)?;

        if diff.matches {
            return Ok(Evaluation::Passed(SnapshotOutcome::Matched {
                diff_percent: diff.diff_percent,
            }));
        }

        Ok(Evaluation::Mismatch { diff, diff_image })
    }

    /// Replace the baseline of `key` with a capture that kept mismatching
    pub fn update_baseline(&self, key: &SnapshotKey, actual_png: &[u8]) -> E2eResult<SnapshotOutcome> {
        let baseline_path = self.baseline_path(key);
        let lock = self.lock_for(&baseline_path);
        let _guard = lock.lock();

        info!("Updating baseline for '{}' at {}", key.name, baseline_path.display());
        write_atomic(&baseline_path, actual_png)?;
        Ok(SnapshotOutcome::Updated {
            baseline: baseline_path,
        })
    }

    /// Persist actual, expected and diff images for a failed key; returns the diff path
    pub fn persist_failure(
        &self,
        key: &SnapshotKey,
        actual_png: &[u8],
        diff_image: &RgbaImage,
    ) -> E2eResult<PathBuf> {
        let baseline_path = self.baseline_path(key);
        let lock = self.lock_for(&baseline_path);
        let _guard = lock.lock();

        let dir = self
            .config
            .failure_dir
            .join(&key.test)
            .join(key.file_name().trim_end_matches(".png"));
        std::fs::create_dir_all(&dir)?;

        std::fs::write(dir.join("actual.png"), actual_png)?;
        if baseline_path.exists() {
            std::fs::copy(&baseline_path, dir.join("expected.png"))?;
        }

        let diff_path = dir.join("diff.png");
        diff_image.save(&diff_path)?;
        warn!("Snapshot '{}' mismatched; artifacts in {}", key.name, dir.display());

        Ok(diff_path)
    }

    /// List all baselines, relative to the baseline directory
    pub fn list_baselines(&self) -> E2eResult<Vec<PathBuf>> {
        let mut baselines = Vec::new();

        for entry in walkdir::WalkDir::new(&self.config.baseline_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|ext| ext == "png").unwrap_or(false))
        {
            if let Ok(relative) = entry.path().strip_prefix(&self.config.baseline_dir) {
                baselines.push(relative.to_path_buf());
            }
        }

        baselines.sort();
        Ok(baselines)
    }

    /// Clean up artifacts of earlier failed comparisons
    pub fn clean_failures(&self) -> E2eResult<()> {
        if self.config.failure_dir.exists() {
            std::fs::remove_dir_all(&self.config.failure_dir)?;
        }
        std::fs::create_dir_all(&self.config.failure_dir)?;
        Ok(())
    }
}

/// Write via a temp file in the same directory and rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> E2eResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| E2eError::Config(format!("baseline path has no parent: {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| E2eError::Io(e.error))?;
    Ok(())
}

/// Hash bytes using SHA256
fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Check if two pixels differ beyond the per-channel tolerance
fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>, tolerance: u8) -> bool {
    a.channels()
        .iter()
        .zip(b.channels())
        .any(|(x, y)| (*x as i32 - *y as i32).abs() > tolerance as i32)
}

/// Pixel comparison of two PNGs.
///
/// Pixels outside the overlapping area of differently sized images count
/// as differing.
pub fn compare_png(
    actual_png: &[u8],
    baseline_png: &[u8],
    threshold: f64,
    tolerance: u8,
) -> E2eResult<(VisualDiff, RgbaImage)> {
    let actual_hash = hash_bytes(actual_png);
    let baseline_hash = hash_bytes(baseline_png);

    let actual_img = image::load_from_memory(actual_png)?;
    let baseline_img = image::load_from_memory(baseline_png)?;

    let (aw, ah) = actual_img.dimensions();
    let (bw, bh) = baseline_img.dimensions();
    let (width, height) = (aw.max(bw), ah.max(bh));
    let total_pixels = (width as u64) * (height as u64);

    // Quick hash comparison
    if actual_hash == baseline_hash {
        debug!("Screenshots match exactly (same hash)");
        let diff = VisualDiff {
            matches: true,
            diff_percent: 0.0,
            diff_pixels: 0,
            total_pixels,
            actual_hash,
            baseline_hash,
        };
        return Ok((diff, RgbaImage::new(width, height)));
    }

    if (aw, ah) != (bw, bh) {
        warn!(
            "Screenshot dimensions differ: actual {:?} vs baseline {:?}",
            (aw, ah),
            (bw, bh)
        );
    }

    let actual_rgba = actual_img.to_rgba8();
    let baseline_rgba = baseline_img.to_rgba8();

    let mut diff_img = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let inside = x < aw.min(bw) && y < ah.min(bh);
            let differs = !inside
                || pixels_differ(
                    actual_rgba.get_pixel(x, y),
                    baseline_rgba.get_pixel(x, y),
                    tolerance,
                );

            if differs {
                diff_pixels += 1;
                // Mark diff pixels in red
                diff_img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
            } else {
                // Keep original but dim it
                let channels = actual_rgba.get_pixel(x, y).channels();
                diff_img.put_pixel(
                    x,
                    y,
                    image::Rgba([channels[0] / 2, channels[1] / 2, channels[2] / 2, 128]),
                );
            }
        }
    }

    let diff_percent = if total_pixels == 0 {
        0.0
    } else {
        (diff_pixels as f64 / total_pixels as f64) * 100.0
    };

    let diff = VisualDiff {
        matches: diff_percent <= threshold,
        diff_percent,
        diff_pixels,
        total_pixels,
        actual_hash,
        baseline_hash,
    };

    Ok((diff, diff_img))
}

/// Encode an RGBA image as PNG bytes
pub fn encode_png(img: &RgbaImage) -> E2eResult<Vec<u8>> {
    use image::ImageEncoder;

    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(bytes)
}
