//! # 계산 스케줄러 (CalculationScheduler)
//!
//! 점수가 바뀔 때마다 집계를 다시 계산하는 비동기 작업을 관리합니다.
//!
//! ## 구조
//! ```text
//! schedule() ─▶ [unbounded mpsc 큐] ─▶ 워커 N개 (수신자를 Mutex로 공유)
//!      │                                   │
//!      └─ 작업 기록 (pending) ◀────────────┘ running → completed / failed
//! ```
//! - `schedule()`은 기다리지 않고 작업 ID를 돌려줍니다.
//! - 같은 대상(성적표, 학생-연도, 학급)의 작업은 `KeyedLocks`로 직렬화됩니다.
//! - 작업 하나는 최대 `max_job_duration` 동안만 실행되고, 넘으면 `Timeout`으로 실패합니다.
//! - 끝난 작업 기록은 보관 기간이 지나면 주기적으로 지워집니다.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::{
    sync::{mpsc, Mutex as AsyncMutex},
    task::JoinHandle,
    time::Instant,
};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::Config,
    db::{self, report_cards as db_report_cards, summaries as db_summaries},
    models::{CalculationError, CalculationJob, CalculationStatus, JobStatus, JobTarget},
    services::{aggregation, locks::KeyedLocks},
};

const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub max_job_duration: Duration,
    pub retention: Duration,
    pub sweep_interval: Duration,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.calc_workers,
            max_job_duration: config.calc_max_job_duration,
            retention: config.calc_job_retention,
            sweep_interval: config
                .calc_job_retention
                .clamp(Duration::from_secs(1), Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("calculation scheduler is shut down")]
    Closed,
}

type JobMessage = (Uuid, JobTarget);

struct Shared {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    jobs: RwLock<HashMap<Uuid, CalculationJob>>,
    locks: KeyedLocks,
}

pub struct CalculationScheduler {
    shared: Arc<Shared>,
    sender: Mutex<Option<mpsc::UnboundedSender<JobMessage>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CalculationScheduler {
    /// 워커와 기록 정리 작업을 띄웁니다. tokio 런타임 안에서 호출해야 합니다.
    pub fn start(pool: SqlitePool, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<JobMessage>();
        let receiver = Arc::new(AsyncMutex::new(receiver));

        let shared = Arc::new(Shared {
            pool,
            clock,
            jobs: RwLock::new(HashMap::new()),
            locks: KeyedLocks::new(),
            config,
        });

        let workers = (0..shared.config.workers.max(1))
            .map(|worker| {
                let shared = shared.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some((job_id, target)) = next else { break };
                        shared.run(job_id, target).await;
                    }
                    tracing::debug!(worker, "Calculation worker stopped");
                })
            })
            .collect();

        let sweeper = {
            let shared = shared.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(shared.config.sweep_interval);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let evicted = shared.evict_finished();
                    if evicted > 0 {
                        tracing::debug!(evicted, "Evicted finished calculation jobs");
                    }
                }
            })
        };

        tracing::info!(workers = shared.config.workers, "Calculation scheduler started");
        Self {
            shared,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// 작업을 큐에 넣고 바로 작업 ID를 돌려줍니다.
    pub fn schedule(&self, target: JobTarget) -> Result<Uuid, SchedulerError> {
        let job_id = Uuid::now_v7();
        let job = CalculationJob::pending(job_id, target.clone(), self.shared.clock.now());

        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = sender.as_ref().ok_or(SchedulerError::Closed)?;

        self.shared.write_jobs().insert(job_id, job);
        if sender.send((job_id, target.clone())).is_err() {
            self.shared.write_jobs().remove(&job_id);
            return Err(SchedulerError::Closed);
        }

        tracing::debug!(%job_id, %target, "Calculation scheduled");
        Ok(job_id)
    }

    pub fn status(&self, job_id: Uuid) -> Option<CalculationJob> {
        self.shared.read_jobs().get(&job_id).cloned()
    }

    /// 보관 기간이 지난 끝난 작업 기록을 지우고 지운 개수를 돌려줍니다.
    pub fn evict_finished(&self) -> usize {
        self.shared.evict_finished()
    }

    /// 큐를 닫고, 남은 작업을 다 처리한 워커들이 끝날 때까지 기다립니다.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().unwrap_or_else(|e| e.into_inner()).take());

        let workers: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Calculation worker panicked");
            }
        }

        if let Some(sweeper) = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take() {
            sweeper.abort();
        }
        tracing::info!("Calculation scheduler stopped");
    }
}

impl Shared {
    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, CalculationJob>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, CalculationJob>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    fn update_job(&self, job_id: Uuid, apply: impl FnOnce(&mut CalculationJob)) {
        if let Some(job) = self.write_jobs().get_mut(&job_id) {
            apply(job);
        }
    }

    fn evict_finished(&self) -> usize {
        let Ok(retention) = chrono::Duration::from_std(self.config.retention) else {
            return 0;
        };
        let cutoff = self.clock.now() - retention;

        let mut jobs = self.write_jobs();
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_finished() && job.finished_at.is_some_and(|at| at <= cutoff))
        });
        before - jobs.len()
    }

    async fn run(&self, job_id: Uuid, target: JobTarget) {
        let _guard = self.locks.lock(&target.lock_key()).await;

        let started_at = self.clock.now();
        self.update_job(job_id, |job| {
            job.status = JobStatus::Running;
            job.started_at = Some(started_at);
        });

        let max = self.config.max_job_duration;
        let deadline = Instant::now() + max;
        let outcome = tokio::time::timeout(max, self.execute(&target, deadline))
            .await
            .unwrap_or(Err(CalculationError::Timeout(max)));

        if let Err(err) = &outcome {
            tracing::error!(%job_id, %target, error = %err, "Calculation failed");
            self.record_failure(job_id, &target).await;
        }

        let finished_at = self.clock.now();
        self.update_job(job_id, |job| {
            job.finished_at = Some(finished_at);
            match outcome {
                Ok(result) => {
                    job.status = JobStatus::Completed;
                    job.result = result;
                }
                Err(err) => {
                    job.status = JobStatus::Failed;
                    job.error = Some(err.to_string());
                }
            }
        });

        if self
            .read_jobs()
            .get(&job_id)
            .is_some_and(|job| job.status == JobStatus::Completed)
        {
            tracing::info!(%job_id, %target, "Calculation completed");
        }
    }

    async fn execute(
        &self,
        target: &JobTarget,
        deadline: Instant,
    ) -> Result<Option<Value>, CalculationError> {
        match target {
            JobTarget::ReportCard { report_card_id } => {
                self.recalculate_report_card(report_card_id, deadline).await
            }
            JobTarget::StudentYear { student_id, year } => {
                self.recalculate_student_year(student_id, *year, deadline).await
            }
            JobTarget::ClassStatistics { year, term } => {
                let ids = db_report_cards::load_class_report_card_ids(&self.pool, *year, *term)
                    .await
                    .map_err(load_failed)?;
                if ids.is_empty() {
                    return Err(CalculationError::LoadFailed(format!(
                        "no report cards found for year {}{}",
                        year,
                        term.map(|t| format!(" {}", t)).unwrap_or_default()
                    )));
                }
                let rows = db_report_cards::load_class_marks(&self.pool, *year, *term)
                    .await
                    .map_err(load_failed)?;
                self.check_deadline(deadline)?;

                let stats = aggregation::class_statistics(*year, *term, &ids, &rows)
                    .map_err(|e| CalculationError::ComputeFailed(e.to_string()))?;
                to_result(&stats).map(Some)
            }
        }
    }

    async fn recalculate_report_card(
        &self,
        report_card_id: &str,
        deadline: Instant,
    ) -> Result<Option<Value>, CalculationError> {
        let found = db_report_cards::set_calculation_status(
            &self.pool,
            report_card_id,
            CalculationStatus::Calculating,
        )
        .await
        .map_err(load_failed)?;
        if !found {
            return Err(CalculationError::LoadFailed(format!(
                "report card {} not found",
                report_card_id
            )));
        }

        let scores = db_report_cards::load_scores(&self.pool, report_card_id)
            .await
            .map_err(load_failed)?
            .ok_or_else(|| {
                CalculationError::LoadFailed(format!("report card {} not found", report_card_id))
            })?;
        self.check_deadline(deadline)?;

        let aggregates = aggregation::aggregate(&scores)
            .map_err(|e| CalculationError::ComputeFailed(e.to_string()))?;
        self.check_deadline(deadline)?;

        let calculated_at = db::timestamp(self.clock.now());
        let stored = persist_with_retry(|| {
            db_report_cards::store_aggregates(&self.pool, report_card_id, &aggregates, &calculated_at)
        })
        .await?;
        if !stored {
            return Err(CalculationError::PersistFailed(format!(
                "report card {} was deleted during calculation",
                report_card_id
            )));
        }

        to_result(&aggregates).map(Some)
    }

    async fn recalculate_student_year(
        &self,
        student_id: &str,
        year: i64,
        deadline: Instant,
    ) -> Result<Option<Value>, CalculationError> {
        let cards = db_report_cards::count_student_year_report_cards(&self.pool, student_id, year)
            .await
            .map_err(load_failed)?;
        if cards == 0 {
            // 남아 있는 요약은 지워진 성적표로 계산한 것이므로 함께 지웁니다.
            db_summaries::delete_summary(&self.pool, student_id, year)
                .await
                .map_err(|e| CalculationError::PersistFailed(e.to_string()))?;
            return Err(CalculationError::LoadFailed(format!(
                "no report cards found for student {} in year {}",
                student_id, year
            )));
        }

        let rows = db_report_cards::load_student_year_marks(&self.pool, student_id, year)
            .await
            .map_err(load_failed)?;
        self.check_deadline(deadline)?;

        let summary = aggregation::performance_summary(student_id, year, &rows)
            .map_err(|e| CalculationError::ComputeFailed(e.to_string()))?;
        self.check_deadline(deadline)?;

        let calculated_at = db::timestamp(self.clock.now());
        persist_with_retry(|| db_summaries::upsert_summary(&self.pool, &summary, &calculated_at))
            .await?;

        to_result(&summary).map(Some)
    }

    /// 실패한 성적표 작업은 `failed` 상태만 남기고 이전 집계 값은 건드리지 않습니다.
    ///
    /// 이 기록마저 실패하면 성적표는 `calculating`으로 남습니다. 다음 작업이 상태를
    /// 다시 쓰므로 재계산을 예약하면 바로잡힙니다.
    async fn record_failure(&self, job_id: Uuid, target: &JobTarget) {
        let JobTarget::ReportCard { report_card_id } = target else {
            return;
        };

        let write = db_report_cards::set_calculation_status(
            &self.pool,
            report_card_id,
            CalculationStatus::Failed,
        );
        let cause = match tokio::time::timeout(self.config.max_job_duration, write).await {
            Ok(Ok(_)) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.config.max_job_duration),
        };
        tracing::error!(
            %job_id,
            %target,
            report_card_id = %report_card_id,
            cause = %cause,
            "Failed to record calculation failure; report card status stale until recalculated"
        );
    }

    fn check_deadline(&self, deadline: Instant) -> Result<(), CalculationError> {
        if Instant::now() >= deadline {
            Err(CalculationError::Timeout(self.config.max_job_duration))
        } else {
            Ok(())
        }
    }
}

async fn persist_with_retry<T, F, Fut>(mut write: F) -> Result<T, CalculationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut backoff = PERSIST_BACKOFF;
    let mut attempt = 1;
    loop {
        match write().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < PERSIST_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "Persist failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(CalculationError::PersistFailed(e.to_string())),
        }
    }
}

fn load_failed(err: sqlx::Error) -> CalculationError {
    CalculationError::LoadFailed(err.to_string())
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, CalculationError> {
    serde_json::to_value(value).map_err(|e| CalculationError::PersistFailed(e.to_string()))
}
