//! # Task Scheduler
//!
//! Discovers one subsetting task per forcing file below an input root and runs
//! them with an [`ExecutionStrategy`] chosen once at startup:
//!
//! - [`RankStrategy`] when the process is one rank of a multi-rank launch
//!   (SLURM, Open MPI or PMI environment). Every rank discovers the same sorted
//!   task list and keeps the positions where `position % world_size == rank`.
//! - [`ProcessPoolStrategy`] when a worker command is available. It re-launches
//!   the command `workers` times as ranks of a local world and merges the
//!   outcome reports they write to [`OUTCOME_FILE_VAR`].
//! - [`PoolStrategy`] otherwise, running tasks on a bounded rayon pool.
//! - [`SequentialStrategy`] when the pool size is 1 or the pool cannot be built.
//!
//! Tasks never share state and write distinct destination files, so a failed
//! or panicking task is recorded in its [`TaskOutcome`] and its siblings keep
//! running. Discovery never descends into the output root, so outputs written
//! by one rank cannot change the task list another rank sees.

use crate::error::{AoiError, AoiResult};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Environment variable naming the file a pool worker writes its outcomes to.
pub const OUTCOME_FILE_VAR: &str = "AOIGEN_OUTCOME_FILE";

/// One file to subset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Task {
    pub source_dir: PathBuf,
    pub file_name: String,
    pub destination_dir: PathBuf,
}

impl Task {
    pub fn source_path(&self) -> PathBuf {
        self.source_dir.join(&self.file_name)
    }

    /// Destination path with the file name prefixed by `<aoi>_`.
    pub fn destination_path(&self, aoi: &str) -> PathBuf {
        self.destination_dir.join(format!("{}_{}", aoi, self.file_name))
    }
}

/// Canonical form of `path`, or its absolute form when it does not exist yet.
fn resolved_path(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Walks `input_root` for files ending in `suffix`, mirroring each file's
/// relative directory under `output_root`. The list is sorted so every rank
/// sees the same order.
///
/// When `output_root` lies inside `input_root` its subtree is skipped.
pub fn discover_tasks(input_root: &Path, output_root: &Path, suffix: &str) -> AoiResult<Vec<Task>> {
    if !input_root.is_dir() {
        return Err(AoiError::Input(format!(
            "input root {} is not a directory",
            input_root.display()
        )));
    }

    let pruned = resolved_path(output_root);
    let walker = WalkDir::new(input_root).follow_links(true).into_iter().filter_entry(|entry| {
        let inside_output = entry.depth() > 0
            && entry.file_type().is_dir()
            && resolved_path(entry.path()).starts_with(&pruned);
        if inside_output {
            log::debug!("Not descending into output directory {}", entry.path().display());
        }
        !inside_output
    });

    let mut tasks = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| AoiError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            log::warn!("Skipping non UTF-8 file name: {}", entry.path().display());
            continue;
        };
        if !file_name.ends_with(suffix) {
            continue;
        }
        let source_dir = entry.path().parent().unwrap_or(input_root).to_path_buf();
        let relative = source_dir.strip_prefix(input_root).unwrap_or(Path::new(""));
        tasks.push(Task {
            destination_dir: output_root.join(relative),
            file_name: file_name.to_string(),
            source_dir,
        });
    }
    tasks.sort();
    log::info!("Discovered {} files below {}", tasks.len(), input_root.display());
    Ok(tasks)
}

/// Positions of a `len`-long task list assigned to `rank` out of `world_size`.
pub fn partition(len: usize, rank: usize, world_size: usize) -> Vec<usize> {
    let world_size = world_size.max(1);
    (0..len).filter(|pos| pos % world_size == rank).collect()
}

/// Rank and world size of a multi-rank launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankEnvironment {
    pub rank: usize,
    pub world_size: usize,
}

impl RankEnvironment {
    const VARIABLES: [(&'static str, &'static str); 4] = [
        ("AOIGEN_RANK", "AOIGEN_WORLD_SIZE"),
        ("OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
        ("PMI_RANK", "PMI_SIZE"),
        ("SLURM_PROCID", "SLURM_NTASKS"),
    ];

    /// Reads the launcher environment through `lookup`; `None` unless the world
    /// has more than one rank.
    pub fn detect_from<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (rank_key, size_key) in Self::VARIABLES {
            let rank = lookup(rank_key).and_then(|v| v.trim().parse::<usize>().ok());
            let size = lookup(size_key).and_then(|v| v.trim().parse::<usize>().ok());
            if let (Some(rank), Some(world_size)) = (rank, size)
                && world_size > 1
                && rank < world_size
            {
                return Some(RankEnvironment { rank, world_size });
            }
        }
        None
    }

    pub fn detect() -> Option<Self> {
        Self::detect_from(|key| std::env::var(key).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Completed,
    Failed(String),
}

/// Result of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: Task,
    pub status: TaskStatus,
    pub elapsed: Duration,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    fn failed(task: &Task, reason: String) -> Self {
        TaskOutcome {
            task: task.clone(),
            status: TaskStatus::Failed(reason),
            elapsed: Duration::ZERO,
        }
    }
}

/// The work done per task.
pub type TaskJob<'a> = dyn Fn(&Task) -> AoiResult<()> + Sync + 'a;

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_task(task: &Task, job: &TaskJob<'_>) -> TaskOutcome {
    let start = Instant::now();
    let status = match panic::catch_unwind(AssertUnwindSafe(|| job(task))) {
        Ok(Ok(())) => TaskStatus::Completed,
        Ok(Err(e)) => {
            log::warn!("Task {} failed: {}", task.source_path().display(), e);
            TaskStatus::Failed(e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::warn!("Task {} panicked: {}", task.source_path().display(), message);
            TaskStatus::Failed(format!("panicked: {}", message))
        }
    };
    TaskOutcome {
        task: task.clone(),
        status,
        elapsed: start.elapsed(),
    }
}

/// How a task list is spread over workers.
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> String;

    /// Runs the tasks this worker is responsible for, collecting every outcome.
    fn execute(&self, tasks: &[Task], job: &TaskJob<'_>) -> Vec<TaskOutcome>;
}

/// Runs every task in order on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

impl ExecutionStrategy for SequentialStrategy {
    fn name(&self) -> String {
        "sequential".to_string()
    }

    fn execute(&self, tasks: &[Task], job: &TaskJob<'_>) -> Vec<TaskOutcome> {
        tasks.iter().map(|task| run_task(task, job)).collect()
    }
}

/// Runs this rank's round-robin share of the task list.
#[derive(Debug, Clone, Copy)]
pub struct RankStrategy {
    pub environment: RankEnvironment,
}

impl ExecutionStrategy for RankStrategy {
    fn name(&self) -> String {
        format!(
            "rank {} of {}",
            self.environment.rank, self.environment.world_size
        )
    }

    fn execute(&self, tasks: &[Task], job: &TaskJob<'_>) -> Vec<TaskOutcome> {
        let mine = partition(tasks.len(), self.environment.rank, self.environment.world_size);
        log::info!(
            "Rank {} handles {} of {} files",
            self.environment.rank,
            mine.len(),
            tasks.len()
        );
        mine.into_iter().map(|pos| run_task(&tasks[pos], job)).collect()
    }
}

/// Runs tasks on a dedicated rayon pool of `workers` threads.
#[derive(Debug, Clone, Copy)]
pub struct PoolStrategy {
    pub workers: usize,
    pub progress: bool,
}

impl PoolStrategy {
    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

impl ExecutionStrategy for PoolStrategy {
    fn name(&self) -> String {
        format!("pool of {} threads", self.workers)
    }

    fn execute(&self, tasks: &[Task], job: &TaskJob<'_>) -> Vec<TaskOutcome> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!("Worker pool unavailable ({}), running sequentially", e);
                return SequentialStrategy.execute(tasks, job);
            }
        };

        let pb = self.progress_bar(tasks.len());
        let outcomes = pool.install(|| {
            tasks
                .par_iter()
                .progress_with(pb.clone())
                .map(|task| run_task(task, job))
                .collect::<Vec<_>>()
        });
        pb.finish_and_clear();
        outcomes
    }
}

/// Program and arguments a [`ProcessPoolStrategy`] re-launches per worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    /// The running executable with the arguments it was started with.
    pub fn current() -> Option<Self> {
        let program = std::env::current_exe().ok()?;
        Some(Self {
            program,
            args: std::env::args_os().skip(1).collect(),
        })
    }
}

/// Writes a worker's outcomes where its pool parent expects them.
pub fn write_outcome_report(path: &Path, outcomes: &[TaskOutcome]) -> AoiResult<()> {
    let json = serde_json::to_string(outcomes)
        .map_err(|e| AoiError::Io(std::io::Error::other(e.to_string())))?;
    fs::write(path, json)?;
    Ok(())
}

fn read_outcome_report(path: &Path) -> Result<Vec<TaskOutcome>, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

static REPORT_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// Runs tasks in `workers` child processes, each one rank of a local world.
///
/// Every child rediscovers the task list and runs its round-robin share
/// through [`RankStrategy`], then writes its outcomes to the file named by
/// [`OUTCOME_FILE_VAR`]. A child that exits without a report fails its whole
/// share; tasks missing from a report are failed individually.
#[derive(Debug, Clone)]
pub struct ProcessPoolStrategy {
    pub workers: usize,
    pub command: WorkerCommand,
}

impl ProcessPoolStrategy {
    fn spawn(&self, rank: usize, world_size: usize, report: &Path) -> std::io::Result<Child> {
        Command::new(&self.command.program)
            .args(&self.command.args)
            .env("AOIGEN_RANK", rank.to_string())
            .env("AOIGEN_WORLD_SIZE", world_size.to_string())
            .env(OUTCOME_FILE_VAR, report)
            .spawn()
    }
}

impl ExecutionStrategy for ProcessPoolStrategy {
    fn name(&self) -> String {
        format!("pool of {} processes", self.workers)
    }

    fn execute(&self, tasks: &[Task], _job: &TaskJob<'_>) -> Vec<TaskOutcome> {
        if tasks.is_empty() {
            return Vec::new();
        }
        let world_size = self.workers.clamp(1, tasks.len());
        let sequence = REPORT_SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut children = Vec::with_capacity(world_size);
        for rank in 0..world_size {
            let report = std::env::temp_dir().join(format!(
                "aoigen-{}-{}-rank{}.json",
                std::process::id(),
                sequence,
                rank
            ));
            // a stale report would be mistaken for this run's
            let _ = fs::remove_file(&report);
            let child = self.spawn(rank, world_size, &report).map_err(|e| e.to_string());
            children.push((rank, report, child));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (rank, report, child) in children {
            let reported = child
                .and_then(|mut child| child.wait().map_err(|e| e.to_string()))
                .and_then(|status| {
                    read_outcome_report(&report)
                        .map_err(|e| format!("exited with {} without a report ({})", status, e))
                });
            let _ = fs::remove_file(&report);

            let share = partition(tasks.len(), rank, world_size);
            match reported {
                Ok(mut reported) => {
                    let seen: HashSet<Task> = reported.iter().map(|o| o.task.clone()).collect();
                    for pos in share {
                        if !seen.contains(&tasks[pos]) {
                            reported.push(TaskOutcome::failed(
                                &tasks[pos],
                                format!("worker {} reported no outcome", rank),
                            ));
                        }
                    }
                    outcomes.extend(reported);
                }
                Err(reason) => {
                    log::warn!("Worker {} failed: {}", rank, reason);
                    outcomes.extend(share.into_iter().map(|pos| {
                        TaskOutcome::failed(&tasks[pos], format!("worker {} {}", rank, reason))
                    }));
                }
            }
        }
        outcomes.sort_by(|a, b| a.task.cmp(&b.task));
        outcomes
    }
}

/// Picks the strategy once from the launch environment and pool size.
///
/// A multi-worker pool runs as child processes when `worker` is given and as
/// threads of this process otherwise.
pub fn select_strategy(
    rank: Option<RankEnvironment>,
    workers: usize,
    progress: bool,
    worker: Option<WorkerCommand>,
) -> Box<dyn ExecutionStrategy> {
    match (rank, worker) {
        (Some(environment), _) => Box::new(RankStrategy { environment }),
        (None, Some(command)) if workers > 1 => Box::new(ProcessPoolStrategy { workers, command }),
        (None, None) if workers > 1 => Box::new(PoolStrategy { workers, progress }),
        _ => Box::new(SequentialStrategy),
    }
}

/// Aggregate of a run's outcomes.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: Vec<TaskOutcome>,
    /// Sum of per-task durations
    pub task_time: Duration,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[TaskOutcome]) -> Self {
        let failed: Vec<TaskOutcome> = outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .cloned()
            .collect();
        RunSummary {
            total: outcomes.len(),
            completed: outcomes.len() - failed.len(),
            failed,
            task_time: outcomes.iter().map(|o| o.elapsed).sum(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Discovers and runs tasks with one strategy.
pub struct TaskScheduler {
    strategy: Box<dyn ExecutionStrategy>,
    suffix: String,
}

impl TaskScheduler {
    pub fn new(strategy: Box<dyn ExecutionStrategy>, suffix: &str) -> Self {
        Self {
            strategy,
            suffix: suffix.to_string(),
        }
    }

    /// Runs `job` over every file below `input_root`.
    ///
    /// Only discovery errors are returned; per-task failures are in the outcomes.
    pub fn run(
        &self,
        input_root: &Path,
        output_root: &Path,
        job: &TaskJob<'_>,
    ) -> AoiResult<Vec<TaskOutcome>> {
        let tasks = discover_tasks(input_root, output_root, &self.suffix)?;
        log::info!("Running {} tasks ({})", tasks.len(), self.strategy.name());
        Ok(self.strategy.execute(&tasks, job))
    }
}
