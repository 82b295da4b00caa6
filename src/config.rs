use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::error::{StampError, StampResult};

/// Target size of the footer after resizing, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlaySize {
    pub width: u32,
    pub height: u32,
}

impl Default for OverlaySize {
    fn default() -> Self {
        Self {
            width: 550,
            height: 120,
        }
    }
}

/// Top-left position of the footer on the art. May be negative or exceed the
/// art bounds; the footer is clipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Anchor {
    pub x: i64,
    pub y: i64,
}

impl Default for Anchor {
    fn default() -> Self {
        Self { x: 120, y: 1220 }
    }
}

/// How footer assets are turned into archives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Grouping {
    /// One archive per footer subdirectory, named after the subdirectory.
    #[default]
    PerGroup,
    /// One archive per footer file, named after the file (`f.png.zip`).
    PerFooter,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub art_extension: String,
    pub footer_extension: String,
    pub archive_extension: String,
    pub overlay_size: OverlaySize,
    pub anchor: Anchor,
    /// Maximum number of composites running at once, shared by every group.
    pub concurrency: usize,
    /// Worker threads in the pool. Defaults to `concurrency`.
    pub threads: Option<usize>,
    pub work_root: PathBuf,
    pub grouping: Grouping,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            art_extension: "jpg".to_string(),
            footer_extension: "png".to_string(),
            archive_extension: "zip".to_string(),
            overlay_size: OverlaySize::default(),
            anchor: Anchor::default(),
            concurrency: 10,
            threads: None,
            work_root: PathBuf::from("tmp"),
            grouping: Grouping::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> StampResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> StampResult<()> {
        if self.concurrency == 0 {
            return Err(StampError::config("concurrency must be >= 1"));
        }
        if self.threads == Some(0) {
            return Err(StampError::config("threads must be >= 1 when set"));
        }
        if self.overlay_size.width == 0 || self.overlay_size.height == 0 {
            return Err(StampError::config("overlay width/height must be non-zero"));
        }
        for (name, ext) in [
            ("art_extension", &self.art_extension),
            ("footer_extension", &self.footer_extension),
            ("archive_extension", &self.archive_extension),
        ] {
            if normalize_extension(ext).is_empty() {
                return Err(StampError::config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.threads.unwrap_or(self.concurrency)
    }

    pub fn is_art(&self, path: &Path) -> bool {
        has_extension(path, &self.art_extension)
    }

    pub fn is_footer(&self, path: &Path) -> bool {
        has_extension(path, &self.footer_extension)
    }

    pub fn archive_name(&self, stem: &str) -> String {
        format!("{stem}.{}", normalize_extension(&self.archive_extension))
    }
}

fn normalize_extension(ext: &str) -> &str {
    ext.trim_start_matches('.')
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(normalize_extension(ext)))
}
