//! Bounded concurrent folder sizing for accounts selected for archival.
//!
//! The coordinator thread owns the pending queue and the in-flight table.
//! Each worker has its own one-slot job channel and reports completions on a
//! shared result channel; the moment a completion arrives, the next pending
//! job is admitted into that worker's slot.

use std::collections::VecDeque;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::account::AccountRecord;
use crate::config::CustodianConfig;
use crate::error::Result;
use crate::lifecycle::ProgressTracker;

/// Coordinator wake-up bound while waiting on workers (5 checks per second).
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const BYTES_PER_MB: f64 = 1_048_576.0;

/// Measures one account directory in bytes.
type Sizer = Arc<dyn Fn(&Path) -> u64 + Send + Sync>;

#[derive(Debug)]
struct SizeJob {
    index: usize,
    path: PathBuf,
}

#[derive(Debug)]
struct SizeResult {
    worker: usize,
    index: usize,
    bytes: u64,
    latency: Duration,
}

struct Worker {
    jobs: Option<SyncSender<SizeJob>>,
    handle: Option<JoinHandle<()>>,
    in_flight: Option<usize>,
}

/// Statistics from one sizing pass.
#[derive(Debug, Clone, Default)]
pub struct SizingStats {
    pub sized: usize,
    pub workers: usize,
    /// Workers that died mid-job and were replaced.
    pub respawned: usize,
    pub total_mb: f64,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct FolderSizeWorkerPool {
    max_workers: usize,
    progress_interval: Option<usize>,
    verbose: bool,
}

impl FolderSizeWorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            progress_interval: None,
            verbose: false,
        }
    }

    pub fn from_config(config: &CustodianConfig) -> Self {
        Self {
            max_workers: config.worker_threads.max(1),
            progress_interval: config.progress_interval,
            verbose: config.verbose,
        }
    }

    /// Size every eligible record in place. Blocks until all jobs finish.
    pub fn run(&self, records: &mut [AccountRecord]) -> Result<SizingStats> {
        self.run_with(records, Arc::new(folder_size_bytes))
    }

    fn run_with(&self, records: &mut [AccountRecord], sizer: Sizer) -> Result<SizingStats> {
        let start = Instant::now();
        let mut pending: VecDeque<SizeJob> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.is_eligible())
            .map(|(index, record)| SizeJob {
                index,
                path: record.path.clone(),
            })
            .collect();

        let mut stats = SizingStats::default();
        if pending.is_empty() {
            return Ok(stats);
        }

        let worker_count = self.max_workers.min(pending.len());
        stats.workers = worker_count;
        let mut progress = ProgressTracker::new("sizing", pending.len(), self.progress_interval)
            .with_parallelism(worker_count);

        let (done_tx, done_rx) = mpsc::channel::<SizeResult>();
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            workers.push(spawn_worker(id, done_tx.clone(), &sizer, self.verbose)?);
        }
        for worker in workers.iter_mut() {
            admit(worker, &mut pending, records, &sizer, &mut progress);
        }

        let result = self.coordinate(
            &mut workers,
            &mut pending,
            records,
            &sizer,
            &done_tx,
            &done_rx,
            &mut progress,
            &mut stats,
        );

        // Closing every job channel lets idle workers exit before the join.
        for worker in workers.iter_mut() {
            worker.jobs = None;
        }
        for (id, worker) in workers.iter_mut().enumerate() {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    log::error!("folder-size worker {id} panicked");
                }
            }
        }
        result?;

        if self.progress_interval.is_some() {
            log::info!("{}", progress.report());
        }
        stats.sized = progress.completed();
        stats.total_mb = records
            .iter()
            .filter(|record| record.is_eligible())
            .map(AccountRecord::size_or_zero)
            .sum();
        stats.duration = start.elapsed();
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn coordinate(
        &self,
        workers: &mut [Worker],
        pending: &mut VecDeque<SizeJob>,
        records: &mut [AccountRecord],
        sizer: &Sizer,
        done_tx: &Sender<SizeResult>,
        done_rx: &Receiver<SizeResult>,
        progress: &mut ProgressTracker,
        stats: &mut SizingStats,
    ) -> Result<()> {
        let mut last_liveness_check = Instant::now();

        while workers.iter().any(|worker| worker.in_flight.is_some()) {
            match done_rx.recv_timeout(POLL_INTERVAL) {
                Ok(result) => {
                    records[result.index].size_mb = Some(result.bytes as f64 / BYTES_PER_MB);
                    let worker = &mut workers[result.worker];
                    if worker.in_flight == Some(result.index) {
                        worker.in_flight = None;
                        progress.record(result.latency);
                        admit(worker, pending, records, sizer, progress);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if last_liveness_check.elapsed() >= POLL_INTERVAL {
                last_liveness_check = Instant::now();
                self.replace_dead_workers(workers, pending, records, sizer, done_tx, progress, stats)?;
            }
        }
        Ok(())
    }

    /// A worker that finished while holding a job has died; its account
    /// counts as zero and a fresh worker takes over the slot.
    #[allow(clippy::too_many_arguments)]
    fn replace_dead_workers(
        &self,
        workers: &mut [Worker],
        pending: &mut VecDeque<SizeJob>,
        records: &mut [AccountRecord],
        sizer: &Sizer,
        done_tx: &Sender<SizeResult>,
        progress: &mut ProgressTracker,
        stats: &mut SizingStats,
    ) -> Result<()> {
        for id in 0..workers.len() {
            let dead = workers[id].in_flight.is_some()
                && workers[id]
                    .handle
                    .as_ref()
                    .map_or(false, |handle| handle.is_finished());
            if !dead {
                continue;
            }

            if let Some(index) = workers[id].in_flight.take() {
                log::error!(
                    "folder-size worker {id} died while sizing {}; counting it as 0 MB",
                    records[index].path.display()
                );
                records[index].size_mb = Some(0.0);
                progress.record(Duration::ZERO);
            }
            if let Some(handle) = workers[id].handle.take() {
                let _ = handle.join();
            }
            workers[id] = spawn_worker(id, done_tx.clone(), sizer, self.verbose)?;
            stats.respawned += 1;
            admit(&mut workers[id], pending, records, sizer, progress);
        }
        Ok(())
    }
}

fn spawn_worker(
    id: usize,
    done: Sender<SizeResult>,
    sizer: &Sizer,
    verbose: bool,
) -> Result<Worker> {
    let (job_tx, job_rx) = mpsc::sync_channel::<SizeJob>(1);
    let sizer = Arc::clone(sizer);
    let handle = thread::Builder::new()
        .name(format!("folder-size-{id}"))
        .spawn(move || {
            while let Ok(job) = job_rx.recv() {
                let start = Instant::now();
                if verbose {
                    log::info!("sizing {}", job.path.display());
                }
                let bytes = sizer(&job.path);
                let result = SizeResult {
                    worker: id,
                    index: job.index,
                    bytes,
                    latency: start.elapsed(),
                };
                if done.send(result).is_err() {
                    break;
                }
            }
        })?;

    Ok(Worker {
        jobs: Some(job_tx),
        handle: Some(handle),
        in_flight: None,
    })
}

/// Hand the next pending job to an idle worker, or close its channel when the
/// queue is drained.
fn admit(
    worker: &mut Worker,
    pending: &mut VecDeque<SizeJob>,
    records: &mut [AccountRecord],
    sizer: &Sizer,
    progress: &mut ProgressTracker,
) {
    while let Some(job) = pending.pop_front() {
        let index = job.index;
        let sent = worker
            .jobs
            .as_ref()
            .map_or(false, |jobs| jobs.send(job).is_ok());
        if sent {
            worker.in_flight = Some(index);
            return;
        }
        // The worker is gone and the liveness check only replaces busy
        // workers, so size the account inline rather than lose it.
        log::warn!(
            "folder-size worker unavailable, sizing {} inline",
            records[index].path.display()
        );
        let start = Instant::now();
        let bytes = sizer(&records[index].path);
        records[index].size_mb = Some(bytes as f64 / BYTES_PER_MB);
        progress.record(start.elapsed());
    }
    worker.jobs = None;
}

/// Sum the sizes of `path` and everything beneath it without following
/// symlinks. Entries that vanish mid-walk count as zero.
pub fn folder_size_bytes(path: &Path) -> u64 {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            note_walk_error(path, &err);
            return 0;
        }
    };

    let mut total = meta.len();
    if !meta.is_dir() {
        return total;
    }

    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                note_walk_error(&dir, &err);
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    note_walk_error(&dir, &err);
                    continue;
                }
            };
            let entry_path = entry.path();
            match fs::symlink_metadata(&entry_path) {
                Ok(meta) => {
                    total += meta.len();
                    if meta.is_dir() {
                        stack.push(entry_path);
                    }
                }
                Err(err) => note_walk_error(&entry_path, &err),
            }
        }
    }
    total
}

fn note_walk_error(path: &Path, err: &std::io::Error) {
    if err.kind() != ErrorKind::NotFound {
        log::warn!("cannot size {}: {err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{ActiveStatus, Decision, Enrollment};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;
    use time::{Date, Month};

    fn make_account(id: &str, path: PathBuf, decision: Decision) -> AccountRecord {
        AccountRecord {
            id: id.to_string(),
            display_name: id.to_string(),
            enrollment: Enrollment::Unknown,
            active_status: ActiveStatus::Inactive,
            student_expiration: None,
            employee_expiration: None,
            modified: Date::from_calendar_date(2020, Month::January, 1).unwrap(),
            path,
            size_mb: None,
            decision: Some(decision),
        }
    }

    fn write_bytes(path: &Path, len: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![7u8; len]).unwrap();
    }

    #[test]
    fn test_folder_size_counts_nested_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("acct");
        write_bytes(&root.join("a.txt"), 1000);
        write_bytes(&root.join("nested/deeper/b.bin"), 2500);

        let dir_overhead: u64 = [&root, &root.join("nested"), &root.join("nested/deeper")]
            .iter()
            .map(|p| fs::symlink_metadata(p).unwrap().len())
            .sum();
        assert_eq!(folder_size_bytes(&root), 3500 + dir_overhead);
    }

    #[test]
    fn test_folder_size_missing_path_is_zero() {
        let temp = TempDir::new().unwrap();
        assert_eq!(folder_size_bytes(&temp.path().join("gone")), 0);
    }

    #[test]
    fn test_pool_sizes_only_eligible_accounts() {
        let temp = TempDir::new().unwrap();
        let mut records = Vec::new();
        for i in 0..12 {
            let path = temp.path().join(format!("acct{i:02}"));
            write_bytes(&path.join("data"), 1024 * (i + 1));
            let decision = if i % 3 == 0 { Decision::Keep } else { Decision::Delete };
            records.push(make_account(&format!("acct{i:02}"), path, decision));
        }
        records.push(make_account("vanished", temp.path().join("vanished"), Decision::Delete));

        let pool = FolderSizeWorkerPool::new(3);
        let stats = pool.run(&mut records).unwrap();

        assert_eq!(stats.workers, 3);
        assert_eq!(stats.sized, 9);
        assert_eq!(stats.respawned, 0);
        for record in &records {
            match record.decision {
                Some(Decision::Keep) => assert!(record.size_mb.is_none()),
                _ => assert!(record.size_mb.is_some(), "{} not sized", record.id),
            }
        }
        assert_eq!(records.last().unwrap().size_mb, Some(0.0));
        let sized = records[1].size_mb.unwrap();
        assert!(sized >= 2048.0 / BYTES_PER_MB);
    }

    fn counting_sizer(active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Sizer {
        Arc::new(move |_path: &Path| -> u64 {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(15));
            active.fetch_sub(1, Ordering::SeqCst);
            2048
        })
    }

    #[test]
    fn test_in_flight_jobs_never_exceed_pool_size() {
        let mut records: Vec<_> = (0..20)
            .map(|i| make_account(&format!("acct{i}"), format!("/data/acct{i}").into(), Decision::Delete))
            .collect();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let stats = FolderSizeWorkerPool::new(3)
            .run_with(&mut records, counting_sizer(active.clone(), peak.clone()))
            .unwrap();

        assert_eq!(stats.sized, 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert!(records.iter().all(|r| r.size_mb == Some(2048.0 / BYTES_PER_MB)));
    }

    #[test]
    fn test_slow_job_does_not_hold_back_other_slots() {
        let mut records = vec![make_account("slow", "/data/slow".into(), Decision::Delete)];
        for i in 0..6 {
            records.push(make_account(&format!("fast{i}"), format!("/data/fast{i}").into(), Decision::Delete));
        }

        let fast_done = Arc::new(AtomicUsize::new(0));
        let slow_saw_all = Arc::new(AtomicBool::new(false));
        let sizer: Sizer = {
            let fast_done = fast_done.clone();
            let slow_saw_all = slow_saw_all.clone();
            Arc::new(move |path: &Path| -> u64 {
                if path.ends_with("slow") {
                    // Only finishes once the other slot has drained every fast job.
                    let deadline = Instant::now() + Duration::from_secs(10);
                    while fast_done.load(Ordering::SeqCst) < 6 && Instant::now() < deadline {
                        thread::sleep(Duration::from_millis(5));
                    }
                    slow_saw_all.store(fast_done.load(Ordering::SeqCst) == 6, Ordering::SeqCst);
                    4096
                } else {
                    thread::sleep(Duration::from_millis(10));
                    fast_done.fetch_add(1, Ordering::SeqCst);
                    1024
                }
            })
        };

        let stats = FolderSizeWorkerPool::new(2).run_with(&mut records, sizer).unwrap();

        assert!(slow_saw_all.load(Ordering::SeqCst));
        assert_eq!(stats.workers, 2);
        assert_eq!(stats.sized, 7);
        assert_eq!(records[0].size_mb, Some(4096.0 / BYTES_PER_MB));
    }

    #[test]
    fn test_admit_sizes_inline_when_worker_is_gone() {
        let (jobs, receiver) = mpsc::sync_channel::<SizeJob>(1);
        drop(receiver);
        let mut worker = Worker {
            jobs: Some(jobs),
            handle: None,
            in_flight: None,
        };
        let mut records = vec![
            make_account("a", "/data/a".into(), Decision::Delete),
            make_account("b", "/data/b".into(), Decision::Delete),
        ];
        let mut pending: VecDeque<SizeJob> = records
            .iter()
            .enumerate()
            .map(|(index, record)| SizeJob {
                index,
                path: record.path.clone(),
            })
            .collect();
        let mut progress = ProgressTracker::new("sizing", 2, None);
        let sizer: Sizer = Arc::new(|_path: &Path| -> u64 { 1_048_576 });

        admit(&mut worker, &mut pending, &mut records, &sizer, &mut progress);

        assert!(pending.is_empty());
        assert!(worker.jobs.is_none());
        assert!(worker.in_flight.is_none());
        assert_eq!(progress.completed(), 2);
        assert!(records.iter().all(|r| r.size_mb == Some(1.0)));
    }

    #[test]
    fn test_pool_shrinks_to_job_count() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("solo");
        write_bytes(&path.join("f"), 10);
        let mut records = vec![make_account("solo", path, Decision::Delete)];

        let stats = FolderSizeWorkerPool::new(50).run(&mut records).unwrap();
        assert_eq!(stats.workers, 1);
        assert_eq!(stats.sized, 1);
    }

    #[test]
    fn test_pool_with_nothing_eligible() {
        let mut records = vec![make_account("keep", "/nonexistent".into(), Decision::Keep)];
        let stats = FolderSizeWorkerPool::new(4).run(&mut records).unwrap();
        assert_eq!(stats.workers, 0);
        assert!(records[0].size_mb.is_none());
    }
}
