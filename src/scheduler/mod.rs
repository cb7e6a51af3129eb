//! Named-job control plane.
//!
//! Each registered job is `Stopped` or `Running`. A running job owns exactly
//! one timer task; [`JobScheduler::register`] and [`JobScheduler::restart`]
//! always tear the previous timer down first, so a name never has two.
//!
//! Runs of the same job never overlap. Every job holds a run lock: a
//! scheduled firing that finds a run in flight is skipped, and a manual
//! [`JobScheduler::trigger`] is rejected with [`SchedulerError::AlreadyRunning`].
//! Runs execute on their own task, so [`JobScheduler::stop`] only cancels
//! future firings.

pub mod control;
pub mod job;
pub mod schedule;

pub use control::{ControlAck, ControlAction};
pub use job::{Job, job_fn};
pub use schedule::Schedule;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown job '{0}'")]
    UnknownJob(String),
    #[error("invalid schedule '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },
    #[error("job '{0}' is already running")]
    AlreadyRunning(String),
    #[error("run of job '{job}' did not complete: {reason}")]
    RunAborted { job: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Stopped,
    Running,
}

/// Read-only snapshot of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub name: String,
    pub schedule: String,
    pub status: JobState,
    pub last_run_at: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub run_count: u64,
    pub last_error: Option<String>,
    pub in_flight: bool,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Bookkeeping shared between the timer, triggers and status readers.
/// Survives re-registration so a replaced job cannot overlap its
/// predecessor's in-flight run.
#[derive(Default)]
struct RunState {
    run_lock: Arc<tokio::sync::Mutex<()>>,
    last_run_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
    error_count: AtomicU64,
    run_count: AtomicU64,
}

impl RunState {
    fn record(&self, run: &RunRecord) {
        if let Ok(mut last) = self.last_run_at.lock() {
            *last = Some(run.started_at);
        }
        if let Ok(mut last) = self.last_error.lock() {
            *last = run.error.clone();
        }
        self.run_count.fetch_add(1, Ordering::Relaxed);
        if run.error.is_some() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

struct Entry {
    schedule: Schedule,
    job: Arc<dyn Job>,
    state: Arc<RunState>,
    timer: Option<JoinHandle<()>>,
}

impl Entry {
    fn snapshot(&self, name: &str) -> JobStatus {
        JobStatus {
            name: name.to_string(),
            schedule: self.schedule.to_string(),
            status: if self.timer.is_some() { JobState::Running } else { JobState::Stopped },
            last_run_at: self.state.last_run_at.lock().ok().and_then(|g| *g),
            error_count: self.state.error_count.load(Ordering::Relaxed),
            run_count: self.state.run_count.load(Ordering::Relaxed),
            last_error: self.state.last_error.lock().ok().and_then(|g| g.clone()),
            in_flight: self.state.run_lock.try_lock().is_err(),
        }
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Explicit job table, constructed once and passed to every control and
/// query entry point.
pub struct JobScheduler {
    jobs: Mutex<BTreeMap<String, Entry>>,
    job_timeout: Duration,
}

impl JobScheduler {
    /// `job_timeout` bounds every run, scheduled or triggered.
    pub fn new(job_timeout: Duration) -> Self {
        Self { jobs: Mutex::new(BTreeMap::new()), job_timeout }
    }

    fn jobs(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        // Every mutation under this lock is a single field write or insert.
        self.jobs.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Creates or replaces `name`. The job starts `Stopped`; any previous
    /// timer under that name is cancelled first.
    pub fn register(&self, name: &str, schedule: &str, job: Arc<dyn Job>) -> Result<JobStatus, SchedulerError> {
        let schedule = Schedule::parse(schedule)?;
        let mut jobs = self.jobs();

        let state = match jobs.get_mut(name) {
            Some(existing) => {
                existing.stop_timer();
                existing.state.clone()
            }
            None => Arc::new(RunState::default()),
        };

        let entry = Entry { schedule, job, state, timer: None };
        let status = entry.snapshot(name);
        jobs.insert(name.to_string(), entry);
        info!(job = name, schedule = %status.schedule, "Job registered");
        Ok(status)
    }

    /// Arms the timer. Starting a running job is a no-op.
    pub fn start(&self, name: &str) -> Result<JobStatus, SchedulerError> {
        let mut jobs = self.jobs();
        let entry = jobs.get_mut(name).ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?;

        if entry.timer.is_none() {
            entry.timer = Some(spawn_timer(
                name.to_string(),
                entry.schedule.clone(),
                entry.job.clone(),
                entry.state.clone(),
                self.job_timeout,
            ));
            info!(job = name, schedule = %entry.schedule, "Job started");
        }
        Ok(entry.snapshot(name))
    }

    /// Cancels future firings. An in-flight run completes normally.
    pub fn stop(&self, name: &str) -> Result<JobStatus, SchedulerError> {
        let mut jobs = self.jobs();
        let entry = jobs.get_mut(name).ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?;
        if entry.timer.is_some() {
            entry.stop_timer();
            info!(job = name, "Job stopped");
        }
        Ok(entry.snapshot(name))
    }

    /// Stop, optionally swap the schedule, then start. A bad schedule is
    /// rejected before anything changes.
    pub fn restart(&self, name: &str, new_schedule: Option<&str>) -> Result<JobStatus, SchedulerError> {
        let parsed = new_schedule.map(Schedule::parse).transpose()?;
        {
            let mut jobs = self.jobs();
            let entry = jobs.get_mut(name).ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?;
            if let Some(schedule) = parsed {
                entry.schedule = schedule;
            }
        }
        self.stop(name)?;
        self.start(name)
    }

    /// Runs the job now, outside its timer, and waits for it to finish.
    /// Bookkeeping is identical to a scheduled firing. The run has its own
    /// task, so dropping the returned future does not cancel it.
    pub async fn trigger(&self, name: &str) -> Result<RunRecord, SchedulerError> {
        let (job, state) = {
            let jobs = self.jobs();
            let entry = jobs.get(name).ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?;
            (entry.job.clone(), entry.state.clone())
        };

        let guard = state
            .run_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| SchedulerError::AlreadyRunning(name.to_string()))?;

        let span = tracing::info_span!("job_run", job = name, trigger = "manual");
        tokio::spawn(execute(job, state, self.job_timeout, guard).instrument(span))
            .await
            .map_err(|e| SchedulerError::RunAborted {
                job: name.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn status(&self, name: &str) -> Result<JobStatus, SchedulerError> {
        self.jobs()
            .get(name)
            .map(|e| e.snapshot(name))
            .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))
    }

    /// Every job, ordered by name.
    pub fn get_all(&self) -> Vec<JobStatus> {
        self.jobs().iter().map(|(name, e)| e.snapshot(name)).collect()
    }

    pub fn stop_all(&self) {
        for entry in self.jobs().values_mut() {
            entry.stop_timer();
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn spawn_timer(
    name: String,
    schedule: Schedule,
    job: Arc<dyn Job>,
    state: Arc<RunState>,
    timeout: Duration,
) -> JoinHandle<()> {
    let span = tracing::info_span!("job_timer", job = %name);
    tokio::spawn(
        async move {
            loop {
                let Some(delay) = schedule.next_delay(Utc::now()) else {
                    warn!(schedule = %schedule, "Schedule has no future firings");
                    return;
                };
                tokio::time::sleep(delay).await;

                let Ok(guard) = state.run_lock.clone().try_lock_owned() else {
                    warn!("Previous run still in flight, skipping firing");
                    continue;
                };
                // The run gets its own task so aborting the timer never
                // cancels it.
                let span = tracing::info_span!("job_run", job = %name, trigger = "schedule");
                tokio::spawn(execute(job.clone(), state.clone(), timeout, guard).instrument(span));
            }
        }
        .instrument(span),
    )
}

async fn execute(job: Arc<dyn Job>, state: Arc<RunState>, timeout: Duration, guard: OwnedMutexGuard<()>) -> RunRecord {
    let started_at = Utc::now();
    let clock = std::time::Instant::now();

    let error = match tokio::time::timeout(timeout, job.run()).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(format!("{e:#}")),
        Err(_) => Some(format!("timed out after {}s", timeout.as_secs())),
    };

    let run = RunRecord {
        started_at,
        duration_ms: clock.elapsed().as_millis() as u64,
        error,
    };
    state.record(&run);
    drop(guard);

    match &run.error {
        None => info!(duration_ms = run.duration_ms, "Job run succeeded"),
        Some(e) => error!(duration_ms = run.duration_ms, error = %e, "Job run failed"),
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn Job>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let job = job_fn(move || {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (hits, job)
    }

    fn scheduler() -> JobScheduler {
        JobScheduler::new(Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregister_never_doubles_timers() {
        let sched = scheduler();
        let (first, job) = counter();
        sched.register("sync", "@every 10s", job).unwrap();
        sched.start("sync").unwrap();

        let (second, job) = counter();
        sched.register("sync", "@every 10s", job).unwrap();
        assert_eq!(sched.status("sync").unwrap().status, JobState::Stopped);
        sched.start("sync").unwrap();
        sched.start("sync").unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 3);
        assert_eq!(sched.get_all().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_trigger() {
        let sched = scheduler();
        let (hits, job) = counter();
        sched.register("sync", "*/10 * * * *", job).unwrap();
        sched.start("sync").unwrap();
        sched.stop("sync").unwrap();

        let run = sched.trigger("sync").await.unwrap();
        assert!(run.is_success());

        let status = sched.status("sync").unwrap();
        assert_eq!(status.status, JobState::Stopped);
        assert_eq!(status.last_run_at, Some(run.started_at));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(25 * 60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_in_flight_is_rejected() {
        let sched = scheduler();
        let slow = job_fn(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        sched.register("slow", "@every 5s", slow).unwrap();
        sched.start("slow").unwrap();

        // First firing at 5s holds the lock until 65s.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(sched.status("slow").unwrap().in_flight);
        assert_eq!(sched.trigger("slow").await, Err(SchedulerError::AlreadyRunning("slow".into())));

        // Stop does not abort the run.
        sched.stop("slow").unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        let status = sched.status("slow").unwrap();
        assert_eq!(status.run_count, 1);
        assert!(!status.in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trigger_still_completes_run() {
        let sched = scheduler();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let slow = job_fn(move || {
            let h = h.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        sched.register("slow", "@every 1h", slow).unwrap();

        let cancelled = tokio::time::timeout(Duration::from_secs(1), sched.trigger("slow")).await;
        assert!(cancelled.is_err());
        assert!(sched.status("slow").unwrap().in_flight);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let status = sched.status("slow").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(status.run_count, 1);
        assert!(status.last_run_at.is_some());
        assert!(!status.in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_and_timeouts_are_counted() {
        let sched = JobScheduler::new(Duration::from_secs(1));
        sched.register("bad", "@every 1h", job_fn(|| async { Err(anyhow!("upstream 503")) })).unwrap();
        sched
            .register(
                "hang",
                "@every 1h",
                job_fn(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                }),
            )
            .unwrap();

        let run = sched.trigger("bad").await.unwrap();
        assert_eq!(run.error.as_deref(), Some("upstream 503"));
        let run = sched.trigger("hang").await.unwrap();
        assert!(run.error.unwrap().contains("timed out"));

        assert_eq!(sched.status("bad").unwrap().error_count, 1);
        assert_eq!(sched.status("hang").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_control_errors_leave_state_unchanged() {
        let sched = scheduler();
        let (_, job) = counter();
        assert!(matches!(
            sched.register("x", "not a schedule", job.clone()),
            Err(SchedulerError::InvalidSchedule { .. })
        ));
        assert!(sched.get_all().is_empty());

        sched.register("x", "*/5 * * * *", job).unwrap();
        sched.start("x").unwrap();
        assert!(sched.restart("x", Some("@every 0s")).is_err());
        let status = sched.status("x").unwrap();
        assert_eq!(status.schedule, "*/5 * * * *");
        assert_eq!(status.status, JobState::Running);

        assert_eq!(sched.start("nope"), Err(SchedulerError::UnknownJob("nope".into())));
        assert!(sched.trigger("nope").await.is_err());

        let restarted = sched.restart("x", Some("@every 1m")).unwrap();
        assert_eq!(restarted.schedule, "@every 1m");
        assert_eq!(restarted.status, JobState::Running);
    }
}
