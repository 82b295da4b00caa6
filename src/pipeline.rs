use std::{
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc::Sender,
    },
    time::{Duration, Instant},
};

use crate::{
    archiver::archive_dir,
    compositor::{CompositeSettings, Compositor},
    config::{Grouping, PipelineConfig},
    error::{StampError, StampResult},
    fs::{Filesystem, LocalFs},
    limiter::ConcurrencyLimiter,
};

/// Structured progress and failure notifications.
///
/// Sent on the channel attached with [`Pipeline::with_events`]. Logging is
/// the same whether or not a channel is attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    GroupStarted {
        group: String,
        tasks: usize,
    },
    GroupSkipped {
        group: String,
        reason: String,
    },
    TaskFailed {
        group: String,
        art: PathBuf,
        footer: PathBuf,
        error: String,
    },
    /// Every task of the group has finished.
    GroupJoined {
        group: String,
        succeeded: usize,
        failed: usize,
    },
    GroupArchived {
        group: String,
        archive: PathBuf,
        entries: usize,
    },
    ArchiveFailed {
        group: String,
        archive: PathBuf,
        error: String,
    },
    GroupCleaned {
        group: String,
        work_dir: PathBuf,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub groups_processed: usize,
    pub groups_skipped: usize,
    pub tasks_dispatched: usize,
    pub tasks_failed: usize,
    pub archives: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// One art x footer composite and where it lands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeTask {
    pub art: PathBuf,
    pub footer: PathBuf,
    pub output: PathBuf,
}

/// A set of footers that is composited, joined and archived together.
#[derive(Clone, Debug, PartialEq, Eq)]
struct WorkUnit {
    name: String,
    footers: Vec<PathBuf>,
    work_dir: PathBuf,
}

impl WorkUnit {
    /// With several footers each one gets its own subdirectory, named after
    /// the footer file, so outputs named after the same art file do not
    /// collide.
    fn tasks(&self, arts: &[PathBuf]) -> Vec<CompositeTask> {
        let nested = self.footers.len() > 1;
        let mut out = Vec::with_capacity(self.footers.len() * arts.len());
        for footer in &self.footers {
            let dir = if nested {
                self.work_dir.join(file_name(footer))
            } else {
                self.work_dir.clone()
            };
            for art in arts {
                out.push(CompositeTask {
                    art: art.clone(),
                    footer: footer.clone(),
                    output: dir.join(file_name(art)),
                });
            }
        }
        out
    }

    fn output_dirs(&self) -> Vec<PathBuf> {
        if self.footers.len() > 1 {
            self.footers
                .iter()
                .map(|f| self.work_dir.join(file_name(f)))
                .collect()
        } else {
            vec![self.work_dir.clone()]
        }
    }
}

pub struct Pipeline {
    cfg: PipelineConfig,
    compositor: Compositor,
    limiter: Arc<ConcurrencyLimiter>,
    pool: rayon::ThreadPool,
    fs: Arc<dyn Filesystem>,
    events: Option<Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> StampResult<Self> {
        cfg.validate()?;
        let limiter = ConcurrencyLimiter::shared(cfg.concurrency)?;
        let pool = build_thread_pool(cfg.worker_threads())?;
        Ok(Self {
            compositor: Compositor::new(CompositeSettings::from(&cfg)),
            cfg,
            limiter,
            pool,
            fs: Arc::new(LocalFs),
            events: None,
        })
    }

    pub fn with_events(mut self, tx: Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    /// Composite every art file with every footer, one group at a time,
    /// archiving each group into `output_root`.
    ///
    /// Only a working root overlapping one of the other roots, failures to
    /// list the art or footer roots, or to create the output and working
    /// roots end the run with `Err`. Everything else is
    /// logged, counted in the report and sent as a [`PipelineEvent`].
    pub fn run(
        &self,
        art_root: &Path,
        footer_root: &Path,
        output_root: &Path,
    ) -> StampResult<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::default();

        check_work_root(&self.cfg.work_root, &[art_root, footer_root, output_root])?;
        self.fs.ensure_dir(output_root)?;
        self.fs.ensure_dir(&self.cfg.work_root)?;

        let arts = self.enumerate_arts(art_root)?;
        let units = self.enumerate_units(footer_root, &mut report)?;
        tracing::info!(
            arts = arts.len(),
            groups = units.len(),
            concurrency = self.limiter.capacity(),
            "starting run"
        );

        for unit in &units {
            self.process_unit(unit, &arts, output_root, &mut report);
        }

        report.elapsed = start.elapsed();
        tracing::info!(
            groups = report.groups_processed,
            skipped = report.groups_skipped,
            tasks = report.tasks_dispatched,
            failed = report.tasks_failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        Ok(report)
    }

    fn enumerate_arts(&self, art_root: &Path) -> StampResult<Vec<PathBuf>> {
        Ok(self
            .fs
            .list_dir(art_root)?
            .into_iter()
            .filter(|e| e.is_file() && self.cfg.is_art(&e.path))
            .map(|e| e.path)
            .collect())
    }

    fn enumerate_units(
        &self,
        footer_root: &Path,
        report: &mut RunReport,
    ) -> StampResult<Vec<WorkUnit>> {
        let mut units = Vec::new();
        for group in self.fs.list_dir(footer_root)? {
            if !group.is_dir() {
                continue;
            }

            let footers = match self.fs.list_dir(&group.path) {
                Ok(entries) => entries
                    .into_iter()
                    .filter(|e| e.is_file() && self.cfg.is_footer(&e.path))
                    .map(|e| e.path)
                    .collect::<Vec<_>>(),
                Err(e) => {
                    tracing::warn!(
                        group = %group.name,
                        error = %e,
                        "skipping unreadable footer group"
                    );
                    self.skip(report, &group.name, e.to_string());
                    continue;
                }
            };
            if footers.is_empty() {
                tracing::info!(group = %group.name, "skipping footer group with no footers");
                self.skip(report, &group.name, "no footer assets".to_string());
                continue;
            }

            match self.cfg.grouping {
                Grouping::PerGroup => units.push(WorkUnit {
                    work_dir: self.cfg.work_root.join(&group.name),
                    name: group.name,
                    footers,
                }),
                Grouping::PerFooter => {
                    for footer in footers {
                        let name = file_name(&footer);
                        units.push(WorkUnit {
                            work_dir: self.cfg.work_root.join(&name),
                            name,
                            footers: vec![footer],
                        });
                    }
                }
            }
        }
        Ok(units)
    }

    #[tracing::instrument(skip_all, fields(group = %unit.name))]
    fn process_unit(
        &self,
        unit: &WorkUnit,
        arts: &[PathBuf],
        output_root: &Path,
        report: &mut RunReport,
    ) {
        if let Err(e) = self.prepare_work_dir(unit) {
            tracing::warn!(error = %e, "skipping group, working directory unavailable");
            self.skip(report, &unit.name, e.to_string());
            return;
        }

        let tasks = unit.tasks(arts);
        self.emit(PipelineEvent::GroupStarted {
            group: unit.name.clone(),
            tasks: tasks.len(),
        });
        tracing::info!(tasks = tasks.len(), "dispatching group");

        let failed = AtomicUsize::new(0);
        // Leaving the scope waits for every spawned task.
        self.pool.scope(|s| {
            for task in &tasks {
                let failed = &failed;
                s.spawn(move |_| {
                    if !self.run_task(&unit.name, task) {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        let failed = failed.into_inner();
        report.tasks_dispatched += tasks.len();
        report.tasks_failed += failed;
        self.emit(PipelineEvent::GroupJoined {
            group: unit.name.clone(),
            succeeded: tasks.len() - failed,
            failed,
        });

        let archive = output_root.join(self.cfg.archive_name(&unit.name));
        match archive_dir(&unit.work_dir, &archive) {
            Ok(entries) => {
                tracing::info!(archive = %archive.display(), entries, "group archived");
                report.archives.push(archive.clone());
                self.emit(PipelineEvent::GroupArchived {
                    group: unit.name.clone(),
                    archive,
                    entries,
                });
            }
            Err(e) => {
                tracing::warn!(archive = %archive.display(), error = %e, "archiving failed");
                self.emit(PipelineEvent::ArchiveFailed {
                    group: unit.name.clone(),
                    archive,
                    error: e.to_string(),
                });
            }
        }

        match self.fs.remove_dir_all(&unit.work_dir) {
            Ok(()) => self.emit(PipelineEvent::GroupCleaned {
                group: unit.name.clone(),
                work_dir: unit.work_dir.clone(),
            }),
            Err(e) => tracing::warn!(error = %e, "failed to remove working directory"),
        }
        report.groups_processed += 1;
    }

    /// Start from an empty working directory so leftovers of an earlier,
    /// interrupted run never end up in the archive.
    fn prepare_work_dir(&self, unit: &WorkUnit) -> StampResult<()> {
        self.fs.remove_dir_all(&unit.work_dir)?;
        for dir in unit.output_dirs() {
            self.fs.ensure_dir(&dir)?;
        }
        Ok(())
    }

    /// Returns whether the composite was written.
    fn run_task(&self, group: &str, task: &CompositeTask) -> bool {
        let _permit = self.limiter.acquire();
        tracing::debug!(art = %task.art.display(), footer = %task.footer.display(), "compositing");

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.compositor
                .composite(&task.art, &task.footer, &task.output)
        }))
        .unwrap_or_else(|_| Err(StampError::asset("compositor panicked")));

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    art = %task.art.display(),
                    footer = %task.footer.display(),
                    error = %e,
                    "composite failed"
                );
                self.emit(PipelineEvent::TaskFailed {
                    group: group.to_string(),
                    art: task.art.clone(),
                    footer: task.footer.clone(),
                    error: e.to_string(),
                });
                false
            }
        }
    }

    fn skip(&self, report: &mut RunReport, group: &str, reason: String) {
        report.groups_skipped += 1;
        self.emit(PipelineEvent::GroupSkipped {
            group: group.to_string(),
            reason,
        });
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }
}

/// Run with the default configuration.
///
/// Returns the number of groups processed and the wall-clock time taken.
pub fn run_pipeline(
    art_root: &Path,
    footer_root: &Path,
    output_root: &Path,
) -> StampResult<(usize, Duration)> {
    let report = Pipeline::new(PipelineConfig::default())?.run(art_root, footer_root, output_root)?;
    Ok((report.groups_processed, report.elapsed))
}

fn build_thread_pool(threads: usize) -> StampResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(StampError::config("worker threads must be >= 1"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("artstamp-worker-{i}"))
        .build()
        .map_err(|e| StampError::config(format!("failed to build rayon thread pool: {e}")))
}

/// Group working directories are wiped before use, so the working root
/// must not be, or sit inside, a directory the run reads from or writes to.
fn check_work_root(work_root: &Path, roots: &[&Path]) -> StampResult<()> {
    let work = absolute(work_root);
    for root in roots {
        if work.starts_with(absolute(root)) {
            return Err(StampError::config(format!(
                "working root '{}' must not be inside '{}'",
                work_root.display(),
                root.display()
            )));
        }
    }
    Ok(())
}

/// Canonical form of `path`, resolving its deepest existing ancestor so
/// paths that are not created yet compare against the same prefix.
fn absolute(path: &Path) -> PathBuf {
    let full = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut missing = Vec::new();
    let mut cursor = full.as_path();
    loop {
        if let Ok(found) = std::fs::canonicalize(cursor) {
            return missing.iter().rev().fold(found, |acc, part| acc.join(part));
        }
        match (cursor.parent(), cursor.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                cursor = parent;
            }
            _ => return full,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
