//! # 성적표/점수 데이터베이스 쿼리 모듈
//!
//! 두 종류의 호출자가 있습니다.
//! - 라우트 핸들러: 성적표 생성/조회/수정/삭제 (`AppError` 반환)
//! - 계산 스케줄러: 점수 로딩과 집계 결과 기록 (`sqlx::Error` 반환, 작업 에러로 분류됨)
//!
//! ## 테이블 구조
//! - `report_cards`: 성적표와 파생 필드 (점수는 1/100 단위 정수)
//! - `marks`: 성적표에 속한 과목별 점수, `position`으로 입력 순서를 유지

use std::collections::HashMap;

use crate::error::AppError;
use crate::models::*;
use sqlx::{Sqlite, SqlitePool, Transaction};

const REPORT_CARD_COLUMNS: &str = r#"
    id, student_id, term, year, total_subjects, total_score, average_score,
    highest_score, lowest_score, percentage, grade, calculation_status,
    last_calculated, created_at
"#;

/// 같은 (학생, 학기, 연도)의 성적표가 이미 있는지 확인합니다.
/// 수정 시에는 자기 자신(`exclude_id`)을 제외합니다.
pub async fn duplicate_exists(
    pool: &SqlitePool,
    student_id: &str,
    term: Term,
    year: i64,
    exclude_id: Option<&str>,
) -> Result<bool, AppError> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT id FROM report_cards
        WHERE student_id = ? AND term = ? AND year = ? AND (? IS NULL OR id <> ?)
        LIMIT 1
        "#,
    )
    .bind(student_id)
    .bind(term.as_str())
    .bind(year)
    .bind(exclude_id)
    .bind(exclude_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// 성적표와 점수를 한 트랜잭션으로 만듭니다. `calculation_status`는 `pending`으로 시작합니다.
pub async fn create_report_card(
    pool: &SqlitePool,
    id: &str,
    student_id: &str,
    term: Term,
    year: i64,
    marks: &[MarkInput],
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO report_cards (id, student_id, term, year, calculation_status)
        VALUES (?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(id)
    .bind(student_id)
    .bind(term.as_str())
    .bind(year)
    .execute(&mut *tx)
    .await
    .map_err(|e| duplicate_to_conflict(e, student_id, term, year))?;

    insert_marks(&mut tx, id, marks).await?;
    tx.commit().await?;
    Ok(())
}

/// 학기/연도를 바꾸거나 점수를 통째로 교체합니다.
///
/// 점수를 교체하면 파생 필드는 그대로 두고 `calculation_status`만 `pending`으로 되돌립니다.
/// 성적표가 없으면 `Ok(false)`.
pub async fn update_report_card(
    pool: &SqlitePool,
    id: &str,
    student_id: &str,
    term: Term,
    year: i64,
    marks: Option<&[MarkInput]>,
) -> Result<bool, AppError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE report_cards
        SET term = ?, year = ?,
            calculation_status = CASE WHEN ? THEN 'pending' ELSE calculation_status END
        WHERE id = ?
        "#,
    )
    .bind(term.as_str())
    .bind(year)
    .bind(marks.is_some())
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| duplicate_to_conflict(e, student_id, term, year))?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    if let Some(marks) = marks {
        sqlx::query("DELETE FROM marks WHERE report_card_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_marks(&mut tx, id, marks).await?;
    }

    tx.commit().await?;
    Ok(true)
}

async fn insert_marks(
    tx: &mut Transaction<'_, Sqlite>,
    report_card_id: &str,
    marks: &[MarkInput],
) -> Result<(), AppError> {
    for (position, mark) in marks.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO marks (id, report_card_id, subject_id, position, score, remarks)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::now_v7().to_string())
        .bind(report_card_id)
        .bind(&mark.subject_id)
        .bind(position as i64)
        .bind(mark.score.hundredths())
        .bind(&mark.remarks)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn duplicate_to_conflict(err: sqlx::Error, student_id: &str, term: Term, year: i64) -> AppError {
    if super::is_unique_violation(&err) {
        AppError::Conflict(format!(
            "Report card for student {}, for {}, and year {} already exists.",
            student_id, term, year
        ))
    } else {
        AppError::Database(err)
    }
}

async fn fetch_row(pool: &SqlitePool, id: &str) -> Result<Option<ReportCardRow>, sqlx::Error> {
    sqlx::query_as::<_, ReportCardRow>(&format!(
        "SELECT {REPORT_CARD_COLUMNS} FROM report_cards WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

async fn fetch_marks(pool: &SqlitePool, report_card_id: &str) -> Result<Vec<MarkRow>, sqlx::Error> {
    sqlx::query_as::<_, MarkRow>(
        r#"
        SELECT m.id, m.report_card_id, m.subject_id, s.code AS subject_code,
               s.name AS subject_name, m.score, m.remarks
        FROM marks m
        JOIN subjects s ON s.id = m.subject_id
        WHERE m.report_card_id = ?
        ORDER BY m.position
        "#,
    )
    .bind(report_card_id)
    .fetch_all(pool)
    .await
}

pub async fn get_report_card(pool: &SqlitePool, id: &str) -> Result<Option<ReportCard>, AppError> {
    let Some(row) = fetch_row(pool, id).await? else {
        return Ok(None);
    };
    let marks = fetch_marks(pool, id).await?;
    ReportCard::from_rows(row, marks)
        .map(Some)
        .map_err(AppError::Internal)
}

/// 조건에 맞는 성적표를 점수와 함께 조회합니다.
///
/// 성적표마다 점수를 따로 조회하지 않도록(N+1) 같은 조건으로 점수를 한 번에 읽어 묶습니다.
pub async fn list_report_cards(
    pool: &SqlitePool,
    filter: &ReportCardFilter,
) -> Result<Vec<ReportCard>, AppError> {
    let term = filter.term.map(|t| t.as_str());
    let student_id = filter.student_id.as_deref();

    let rows = sqlx::query_as::<_, ReportCardRow>(&format!(
        r#"
        SELECT {REPORT_CARD_COLUMNS} FROM report_cards
        WHERE (? IS NULL OR year = ?)
          AND (? IS NULL OR term = ?)
          AND (? IS NULL OR student_id = ?)
        ORDER BY year DESC, term DESC, created_at
        "#
    ))
    .bind(filter.year)
    .bind(filter.year)
    .bind(term)
    .bind(term)
    .bind(student_id)
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mark_rows = sqlx::query_as::<_, MarkRow>(
        r#"
        SELECT m.id, m.report_card_id, m.subject_id, s.code AS subject_code,
               s.name AS subject_name, m.score, m.remarks
        FROM marks m
        JOIN subjects s ON s.id = m.subject_id
        JOIN report_cards rc ON rc.id = m.report_card_id
        WHERE (? IS NULL OR rc.year = ?)
          AND (? IS NULL OR rc.term = ?)
          AND (? IS NULL OR rc.student_id = ?)
        ORDER BY m.report_card_id, m.position
        "#,
    )
    .bind(filter.year)
    .bind(filter.year)
    .bind(term)
    .bind(term)
    .bind(student_id)
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    let mut marks_by_card: HashMap<String, Vec<MarkRow>> = HashMap::new();
    for mark in mark_rows {
        marks_by_card
            .entry(mark.report_card_id.clone())
            .or_default()
            .push(mark);
    }

    rows.into_iter()
        .map(|row| {
            let marks = marks_by_card.remove(&row.id).unwrap_or_default();
            ReportCard::from_rows(row, marks).map_err(AppError::Internal)
        })
        .collect()
}

pub async fn delete_report_card(pool: &SqlitePool, id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM report_cards WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// ── 계산 작업용 쿼리 ──

pub async fn set_calculation_status(
    pool: &SqlitePool,
    id: &str,
    status: CalculationStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE report_cards SET calculation_status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// 성적표의 현재 점수를 읽습니다. 성적표가 없으면 `None`.
pub async fn load_scores(pool: &SqlitePool, id: &str) -> Result<Option<Vec<Score>>, sqlx::Error> {
    if fetch_row(pool, id).await?.is_none() {
        return Ok(None);
    }

    let scores: Vec<(i64,)> =
        sqlx::query_as("SELECT score FROM marks WHERE report_card_id = ? ORDER BY position")
            .bind(id)
            .fetch_all(pool)
            .await?;

    Ok(Some(
        scores
            .into_iter()
            .map(|(s,)| Score::from_hundredths(s))
            .collect(),
    ))
}

/// 집계 결과와 `completed` 상태, 계산 시각을 함께 기록합니다.
pub async fn store_aggregates(
    pool: &SqlitePool,
    id: &str,
    aggregates: &Aggregates,
    calculated_at: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE report_cards
        SET total_subjects = ?, total_score = ?, average_score = ?,
            highest_score = ?, lowest_score = ?, percentage = ?, grade = ?,
            calculation_status = 'completed', last_calculated = ?
        WHERE id = ?
        "#,
    )
    .bind(aggregates.total_subjects)
    .bind(aggregates.total_score.hundredths())
    .bind(aggregates.average_score.hundredths())
    .bind(aggregates.highest_score.hundredths())
    .bind(aggregates.lowest_score.hundredths())
    .bind(aggregates.percentage.hundredths())
    .bind(aggregates.grade.map(|g| g.as_str()))
    .bind(calculated_at)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// 한 학생의 한 해 점수 전체 (학기 순서)
pub async fn load_student_year_marks(
    pool: &SqlitePool,
    student_id: &str,
    year: i64,
) -> Result<Vec<ScoredMarkRow>, sqlx::Error> {
    sqlx::query_as::<_, ScoredMarkRow>(
        r#"
        SELECT rc.id AS report_card_id, rc.term, m.subject_id,
               s.code AS subject_code, s.name AS subject_name, m.score
        FROM marks m
        JOIN report_cards rc ON rc.id = m.report_card_id
        JOIN subjects s ON s.id = m.subject_id
        WHERE rc.student_id = ? AND rc.year = ?
        ORDER BY rc.term, m.position
        "#,
    )
    .bind(student_id)
    .bind(year)
    .fetch_all(pool)
    .await
}

/// 학생의 해당 연도 성적표 수 (점수가 없는 성적표 포함)
pub async fn count_student_year_report_cards(
    pool: &SqlitePool,
    student_id: &str,
    year: i64,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM report_cards WHERE student_id = ? AND year = ?")
            .bind(student_id)
            .bind(year)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// 한 과목의 점수 전체. `year`가 없으면 모든 연도.
pub async fn load_subject_marks(
    pool: &SqlitePool,
    subject_id: &str,
    year: Option<i64>,
) -> Result<Vec<SubjectMarkRow>, sqlx::Error> {
    sqlx::query_as::<_, SubjectMarkRow>(
        r#"
        SELECT rc.student_id, m.score
        FROM marks m
        JOIN report_cards rc ON rc.id = m.report_card_id
        WHERE m.subject_id = ? AND (? IS NULL OR rc.year = ?)
        ORDER BY rc.student_id
        "#,
    )
    .bind(subject_id)
    .bind(year)
    .bind(year)
    .fetch_all(pool)
    .await
}

/// 학급 통계 대상 성적표 ID 목록 (점수가 없는 성적표 포함)
pub async fn load_class_report_card_ids(
    pool: &SqlitePool,
    year: i64,
    term: Option<Term>,
) -> Result<Vec<String>, sqlx::Error> {
    let term = term.map(|t| t.as_str());
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT id FROM report_cards
        WHERE year = ? AND (? IS NULL OR term = ?)
        ORDER BY id
        "#,
    )
    .bind(year)
    .bind(term)
    .bind(term)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn load_class_marks(
    pool: &SqlitePool,
    year: i64,
    term: Option<Term>,
) -> Result<Vec<ScoredMarkRow>, sqlx::Error> {
    let term = term.map(|t| t.as_str());
    sqlx::query_as::<_, ScoredMarkRow>(
        r#"
        SELECT rc.id AS report_card_id, rc.term, m.subject_id,
               s.code AS subject_code, s.name AS subject_name, m.score
        FROM marks m
        JOIN report_cards rc ON rc.id = m.report_card_id
        JOIN subjects s ON s.id = m.subject_id
        WHERE rc.year = ? AND (? IS NULL OR rc.term = ?)
        ORDER BY rc.id, m.position
        "#,
    )
    .bind(year)
    .bind(term)
    .bind(term)
    .fetch_all(pool)
    .await
}
