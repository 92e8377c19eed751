//! # 계산 작업(CalculationJob) 모델
//!
//! 작업 상태 흐름:
//! ```text
//! pending → running → completed
//!                   ↘ failed (LoadFailed / ComputeFailed / PersistFailed / Timeout)
//! ```
//! 작업 기록은 스케줄러 메모리에 보관되며, 끝난 뒤 보관 기간이 지나면 제거됩니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::report_card::{CalculationStatus, Term};

/// 무엇을 다시 계산할지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JobTarget {
    #[serde(rename_all = "camelCase")]
    ReportCard { report_card_id: String },
    #[serde(rename_all = "camelCase")]
    StudentYear { student_id: String, year: i64 },
    #[serde(rename_all = "camelCase")]
    ClassStatistics { year: i64, term: Option<Term> },
}

impl JobTarget {
    /// 같은 대상을 건드리는 작업끼리 직렬화하기 위한 잠금 키
    pub fn lock_key(&self) -> String {
        match self {
            JobTarget::ReportCard { report_card_id } => format!("report_card:{report_card_id}"),
            JobTarget::StudentYear { student_id, year } => {
                format!("student_year:{student_id}:{year}")
            }
            JobTarget::ClassStatistics { year, term } => format!(
                "class_statistics:{year}:{}",
                term.map(|t| t.as_str()).unwrap_or("all")
            ),
        }
    }
}

impl std::fmt::Display for JobTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lock_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// 클라이언트가 폴링할 때 보는 상태 문자열로 변환합니다. (running → calculating)
    pub fn calculation_status(self) -> CalculationStatus {
        match self {
            JobStatus::Pending => CalculationStatus::Pending,
            JobStatus::Running => CalculationStatus::Calculating,
            JobStatus::Completed => CalculationStatus::Completed,
            JobStatus::Failed => CalculationStatus::Failed,
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalculationError {
    #[error("failed to load marks: {0}")]
    LoadFailed(String),
    #[error("failed to compute aggregates: {0}")]
    ComputeFailed(String),
    #[error("failed to persist results: {0}")]
    PersistFailed(String),
    #[error("job exceeded the maximum duration of {0:?}")]
    Timeout(std::time::Duration),
}

/// 작업 기록. `status(job_id)`가 돌려주는 값입니다.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationJob {
    pub job_id: Uuid,
    pub target: JobTarget,
    pub status: JobStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
}

impl CalculationJob {
    pub fn pending(job_id: Uuid, target: JobTarget, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            target,
            status: JobStatus::Pending,
            scheduled_at,
            started_at: None,
            finished_at: None,
            error: None,
            result: None,
        }
    }
}

/// `GET /calculations/{job_id}` 응답
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationJobResponse {
    pub calculation_task_id: Uuid,
    pub calculation_status: CalculationStatus,
    #[serde(flatten)]
    pub job: CalculationJob,
}

impl From<CalculationJob> for CalculationJobResponse {
    fn from(job: CalculationJob) -> Self {
        Self {
            calculation_task_id: job.job_id,
            calculation_status: job.status.calculation_status(),
            job,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledResponse {
    pub calculation_status: CalculationStatus,
    pub calculation_task_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ClassStatisticsRequest {
    pub year: i64,
    pub term: Option<Term>,
}
