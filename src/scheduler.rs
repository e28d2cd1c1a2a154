use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::pipeline::{DealPipeline, RunReport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Option<Uuid>,
    pub cron_expression: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub skipped_count: u64,
    pub total_run_time_ms: u64,
    pub last_error: Option<String>,
    pub last_report: Option<RunReport>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub status: JobStatus,
    pub running: bool,
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub skipped_runs: u64,
    pub average_run_time_ms: f64,
    pub last_run: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}

/// Clears the in-flight flag when a run ends, even on panic.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(Arc::clone(flag)))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs the deal pipeline on a cron schedule, never two runs at once.
pub struct DealScheduler {
    scheduler: JobScheduler,
    pipeline: Arc<DealPipeline>,
    job: Arc<RwLock<JobInfo>>,
    running: Arc<AtomicBool>,
    config: SchedulerConfig,
    start_time: DateTime<Utc>,
}

impl DealScheduler {
    pub async fn new(pipeline: Arc<DealPipeline>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        let job = JobInfo {
            id: None,
            cron_expression: config.cron.clone(),
            status: JobStatus::Active,
            created_at: Utc::now(),
            last_run: None,
            last_duration_ms: None,
            run_count: 0,
            success_count: 0,
            error_count: 0,
            skipped_count: 0,
            total_run_time_ms: 0,
            last_error: None,
            last_report: None,
        };

        Ok(Self {
            scheduler,
            pipeline,
            job: Arc::new(RwLock::new(job)),
            running: Arc::new(AtomicBool::new(false)),
            config,
            start_time: Utc::now(),
        })
    }

    pub async fn start(&self) -> Result<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let job_info = Arc::clone(&self.job);
        let running = Arc::clone(&self.running);

        let job = Job::new_async(self.config.cron.as_str(), move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            let job_info = Arc::clone(&job_info);
            let running = Arc::clone(&running);

            Box::pin(async move {
                if job_info.read().await.status == JobStatus::Paused {
                    tracing::debug!("Scheduler paused, skipping tick");
                    return;
                }
                Self::execute(pipeline, job_info, running).await;
            })
        })?;

        let id = self.scheduler.add(job).await?;
        self.job.write().await.id = Some(id);
        self.scheduler.start().await?;
        tracing::info!(cron = %self.config.cron, "Deal scheduler started");

        if self.config.run_on_start {
            let pipeline = Arc::clone(&self.pipeline);
            let job_info = Arc::clone(&self.job);
            let running = Arc::clone(&self.running);
            tokio::spawn(async move {
                Self::execute(pipeline, job_info, running).await;
            });
        }
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        // JobScheduler is a cloneable handle onto the same scheduler
        let mut scheduler = self.scheduler.clone();
        scheduler.shutdown().await?;
        tracing::info!("Deal scheduler shutdown");
        Ok(())
    }

    /// Run the pipeline immediately, outside of the schedule.
    ///
    /// `Ok(None)` when another run was already in flight.
    pub async fn run_now(&self) -> Result<Option<RunReport>> {
        Self::execute(Arc::clone(&self.pipeline), Arc::clone(&self.job), Arc::clone(&self.running))
            .await
            .transpose()
    }

    /// `None` when another run was in flight and this one was skipped.
    async fn execute(
        pipeline: Arc<DealPipeline>,
        job_info: Arc<RwLock<JobInfo>>,
        running: Arc<AtomicBool>,
    ) -> Option<Result<RunReport>> {
        let Some(_guard) = RunGuard::acquire(&running) else {
            tracing::warn!("Previous pipeline run still in flight, skipping");
            job_info.write().await.skipped_count += 1;
            return None;
        };

        let started = tokio::time::Instant::now();
        let result = pipeline.run_once().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut job = job_info.write().await;
        job.run_count += 1;
        job.last_run = Some(Utc::now());
        job.last_duration_ms = Some(elapsed_ms);
        job.total_run_time_ms += elapsed_ms;

        Some(match result {
            Ok(report) => {
                job.success_count += 1;
                job.last_error = None;
                job.last_report = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Pipeline run failed");
                job.error_count += 1;
                job.last_error = Some(e.to_string());
                Err(e.into())
            }
        })
    }

    pub async fn pause(&self) {
        self.job.write().await.status = JobStatus::Paused;
        tracing::info!("Deal scheduler paused");
    }

    pub async fn resume(&self) {
        self.job.write().await.status = JobStatus::Active;
        tracing::info!("Deal scheduler resumed");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn job_info(&self) -> JobInfo {
        self.job.read().await.clone()
    }

    pub async fn stats(&self) -> SchedulerStats {
        let job = self.job.read().await;
        let average_run_time_ms = if job.run_count > 0 {
            job.total_run_time_ms as f64 / job.run_count as f64
        } else {
            0.0
        };
        let uptime = Utc::now().signed_duration_since(self.start_time);

        SchedulerStats {
            status: job.status,
            running: self.is_running(),
            completed_runs: job.success_count,
            failed_runs: job.error_count,
            skipped_runs: job.skipped_count,
            average_run_time_ms,
            last_run: job.last_run,
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affiliate::AffiliateConverter;
    use crate::config::AppConfig;
    use crate::plugins::PluginManager;
    use crate::storage::{self, OfferRepository};

    async fn create_test_scheduler() -> DealScheduler {
        let config = AppConfig::from_toml_str(include_str!("../config/default.toml")).unwrap();
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        storage::migrate(&pool).await.unwrap();

        let pipeline = DealPipeline::new(
            &config,
            PluginManager::new(),
            AffiliateConverter::new(&config.affiliate),
            OfferRepository::new(pool),
        );
        DealScheduler::new(Arc::new(pipeline), config.scheduler).await.unwrap()
    }

    #[tokio::test]
    async fn test_scheduler_start_and_shutdown() {
        let scheduler = create_test_scheduler().await;
        assert!(scheduler.start().await.is_ok());
        assert!(scheduler.job_info().await.id.is_some());
        assert!(scheduler.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_run_now_updates_job_info() {
        let scheduler = create_test_scheduler().await;
        let report = scheduler.run_now().await.unwrap().expect("run was not skipped");
        assert_eq!(report.collected, 0);

        let job = scheduler.job_info().await;
        assert_eq!(job.run_count, 1);
        assert_eq!(job.success_count, 1);
        assert!(job.last_report.is_some());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let scheduler = create_test_scheduler().await;
        scheduler.running.store(true, Ordering::Release);

        assert!(scheduler.run_now().await.unwrap().is_none());
        assert_eq!(scheduler.stats().await.skipped_runs, 1);
        assert_eq!(scheduler.job_info().await.run_count, 0);
    }

    #[tokio::test]
    async fn test_pause_resume() {
        let scheduler = create_test_scheduler().await;
        scheduler.pause().await;
        assert_eq!(scheduler.stats().await.status, JobStatus::Paused);
        scheduler.resume().await;
        assert_eq!(scheduler.stats().await.status, JobStatus::Active);
    }

    #[test]
    fn test_run_guard_releases_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        {
            let guard = RunGuard::acquire(&flag);
            assert!(guard.is_some());
            assert!(RunGuard::acquire(&flag).is_none());
        }
        assert!(!flag.load(Ordering::Acquire));
    }
}
