#![forbid(unsafe_code)]

//! Stamp footer overlays onto batches of artwork and package the results.
//!
//! Footers live in one subdirectory per group under a footer root. For every
//! group, each art file is composited with each footer (in parallel, capped by
//! a [`ConcurrencyLimiter`]); once all of them have finished the group's
//! working directory is zipped into `<group>.zip` and removed.

pub mod archiver;
pub mod blend;
pub mod codec;
pub mod compositor;
pub mod config;
pub mod error;
pub mod fs;
pub mod limiter;
pub mod pipeline;

pub use archiver::{ArchiveSink, ZipSink, archive_dir, archive_dir_into};
pub use compositor::{CompositeSettings, Compositor};
pub use config::{Anchor, Grouping, OverlaySize, PipelineConfig};
pub use error::{StampError, StampResult};
pub use fs::{DirEntryInfo, EntryKind, Filesystem, LocalFs};
pub use limiter::{ConcurrencyLimiter, Permit};
pub use pipeline::{CompositeTask, Pipeline, PipelineEvent, RunReport, run_pipeline};
