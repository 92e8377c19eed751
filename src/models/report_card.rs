//! # 성적표(ReportCard)와 점수(Mark) 모델
//!
//! 성적표는 (학생, 학기, 연도)마다 하나만 존재합니다.
//! 총점/평균/등급 같은 파생 필드는 계산 작업만 기록하고,
//! 요청 핸들러는 `calculationStatus`를 `pending`으로 초기화하는 것만 허용됩니다.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::score::{Grade, Score};

/// 학기. 선언 순서가 곧 학기 순서입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    #[serde(rename = "Term 1")]
    Term1,
    #[serde(rename = "Term 2")]
    Term2,
    #[serde(rename = "Term 3")]
    Term3,
    #[serde(rename = "Final")]
    Final,
}

impl Term {
    pub fn as_str(&self) -> &'static str {
        match self {
            Term::Term1 => "Term 1",
            Term::Term2 => "Term 2",
            Term::Term3 => "Term 3",
            Term::Final => "Final",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Term {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Term 1" => Ok(Term::Term1),
            "Term 2" => Ok(Term::Term2),
            "Term 3" => Ok(Term::Term3),
            "Final" => Ok(Term::Final),
            other => Err(format!(
                "invalid term {other:?}; choose Term 1, Term 2, Term 3 or Final"
            )),
        }
    }
}

/// 클라이언트에 보이는 계산 상태. 문자열 값은 그대로 API에 노출됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationStatus {
    Pending,
    Calculating,
    Completed,
    Failed,
}

impl CalculationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationStatus::Pending => "pending",
            CalculationStatus::Calculating => "calculating",
            CalculationStatus::Completed => "completed",
            CalculationStatus::Failed => "failed",
        }
    }
}

impl FromStr for CalculationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CalculationStatus::Pending),
            "calculating" => Ok(CalculationStatus::Calculating),
            "completed" => Ok(CalculationStatus::Completed),
            "failed" => Ok(CalculationStatus::Failed),
            other => Err(format!("unknown calculation status {other:?}")),
        }
    }
}

/// 점수 집합에서 계산한 요약 통계
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub total_subjects: i64,
    pub total_score: Score,
    pub average_score: Score,
    pub highest_score: Score,
    pub lowest_score: Score,
    pub percentage: Score,
    pub grade: Option<Grade>,
}

impl Aggregates {
    /// 점수가 하나도 없을 때의 결과 (에러가 아닌 정상 결과)
    pub fn empty() -> Self {
        Self {
            total_subjects: 0,
            total_score: Score::ZERO,
            average_score: Score::ZERO,
            highest_score: Score::ZERO,
            lowest_score: Score::ZERO,
            percentage: Score::ZERO,
            grade: None,
        }
    }
}

/// `report_cards` 테이블 한 행 (점수는 1/100 단위 정수)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReportCardRow {
    pub id: String,
    pub student_id: String,
    pub term: String,
    pub year: i64,
    pub total_subjects: i64,
    pub total_score: i64,
    pub average_score: i64,
    pub highest_score: i64,
    pub lowest_score: i64,
    pub percentage: i64,
    pub grade: Option<String>,
    pub calculation_status: String,
    pub last_calculated: Option<String>,
    pub created_at: String,
}

/// 과목 정보를 붙인 `marks` 행
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MarkRow {
    pub id: String,
    pub report_card_id: String,
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub score: i64,
    pub remarks: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub score: Score,
    pub remarks: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    #[serde(rename = "reportCardId")]
    pub id: String,
    pub student_id: String,
    pub term: Term,
    pub year: i64,
    #[serde(flatten)]
    pub aggregates: Aggregates,
    pub calculation_status: CalculationStatus,
    pub last_calculated: Option<String>,
    pub created_at: String,
    pub marks: Vec<Mark>,
}

impl ReportCard {
    /// DB 행들을 API 모델로 조립합니다. 저장된 값이 잘못되었으면 에러 메시지를 돌려줍니다.
    pub fn from_rows(row: ReportCardRow, marks: Vec<MarkRow>) -> Result<Self, String> {
        let grade = row.grade.as_deref().map(str::parse::<Grade>).transpose()?;
        let marks = marks
            .into_iter()
            .map(|m| Mark {
                id: m.id,
                student_id: row.student_id.clone(),
                subject_id: m.subject_id,
                subject_code: m.subject_code,
                subject_name: m.subject_name,
                score: Score::from_hundredths(m.score),
                remarks: m.remarks,
            })
            .collect();

        Ok(Self {
            term: row.term.parse()?,
            calculation_status: row.calculation_status.parse()?,
            aggregates: Aggregates {
                total_subjects: row.total_subjects,
                total_score: Score::from_hundredths(row.total_score),
                average_score: Score::from_hundredths(row.average_score),
                highest_score: Score::from_hundredths(row.highest_score),
                lowest_score: Score::from_hundredths(row.lowest_score),
                percentage: Score::from_hundredths(row.percentage),
                grade,
            },
            id: row.id,
            student_id: row.student_id,
            year: row.year,
            last_calculated: row.last_calculated,
            created_at: row.created_at,
            marks,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkInput {
    pub subject_id: String,
    pub score: Score,
    #[serde(default)]
    pub remarks: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportCardRequest {
    pub student_id: String,
    pub term: Term,
    pub year: i64,
    #[serde(default)]
    pub marks: Vec<MarkInput>,
}

/// `PATCH /report-cards/{id}`. `marks`가 있으면 기존 점수를 모두 교체합니다.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportCardRequest {
    pub term: Option<Term>,
    pub year: Option<i64>,
    pub marks: Option<Vec<MarkInput>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardFilter {
    pub year: Option<i64>,
    pub term: Option<Term>,
    pub student_id: Option<String>,
}

/// 성적표 생성/수정 응답. 집계가 끝나기 전에 바로 돌려주므로
/// `calculationStatus`는 항상 `"calculating"`이고 작업 ID가 함께 옵니다.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardWriteResponse {
    #[serde(flatten)]
    pub report_card: ReportCard,
    pub calculation_task_id: uuid::Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateRequest {
    pub report_card_ids: Vec<String>,
}
