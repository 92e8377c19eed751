//! # 학생-연도 성적 요약과 학급 통계 모델
//!
//! 둘 다 계산 작업의 결과물입니다. 학생-연도 요약은 `performance_summaries`에 저장되고,
//! 학급 통계는 작업 결과(`result`)로만 제공됩니다.
//! 과목 성취도(`SubjectPerformance`)는 요청 때마다 바로 계산합니다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    report_card::{CalculationStatus, Term},
    score::{Grade, Score},
};

/// 집계 입력으로 쓰는 점수 한 건 (성적표/과목 정보 포함)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoredMarkRow {
    pub report_card_id: String,
    pub term: String,
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub average_score: Score,
    pub grade: Option<Grade>,
    /// 이 과목이 등장한 학기 수
    pub term_count: i64,
}

/// 성적표 한 장(한 학기)의 평균
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermAverage {
    pub report_card_id: String,
    pub term: Term,
    pub average_score: Score,
    pub grade: Option<Grade>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub student_id: String,
    pub year: i64,
    pub subject_averages: Vec<SubjectAverage>,
    /// 평균이 0보다 큰 성적표만, 학기 순서로
    #[serde(default)]
    pub term_averages: Vec<TermAverage>,
    /// 학기 평균들의 평균
    pub overall_average: Score,
    pub overall_grade: Option<Grade>,
    /// 학기 평균에 들어간 성적표 수
    pub terms_completed: i64,
    pub total_subjects: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSubjectAverage {
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub average_score: Score,
    pub mark_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatistics {
    pub year: i64,
    pub term: Option<Term>,
    pub total_students: i64,
    pub class_average: Score,
    pub highest_average: Score,
    pub lowest_average: Score,
    pub students_above_75: i64,
    pub students_below_50: i64,
    pub grade_distribution: BTreeMap<Grade, i64>,
    pub subject_averages: Vec<ClassSubjectAverage>,
}

/// 과목 하나에 매겨진 점수 한 건
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubjectMarkRow {
    pub student_id: String,
    pub score: i64,
}

/// 과목별 성취도. 점수가 없으면 평균/최고/최저는 `None`입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub year: Option<i64>,
    pub average_score: Option<Score>,
    pub highest_score: Option<Score>,
    pub lowest_score: Option<Score>,
    /// 점수를 받은 서로 다른 학생 수
    pub total_students: i64,
    pub total_marks: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubjectPerformanceQuery {
    pub year: Option<i64>,
}

/// 저장된 성적 요약 (`performance_summaries` 한 행)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSummary {
    pub summary: PerformanceSummary,
    pub calculated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    pub year: i64,
}

/// `GET /students/{id}/performance` 응답
///
/// 저장된 요약이 있으면 함께 돌려주고, 최신 점수로 다시 계산하는 작업을 예약합니다.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceResponse {
    pub student_id: String,
    pub year: i64,
    pub summary: Option<PerformanceSummary>,
    pub calculated_at: Option<String>,
    pub calculation_status: CalculationStatus,
    pub calculation_task_id: uuid::Uuid,
}
