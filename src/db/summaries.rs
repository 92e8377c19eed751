//! 학생-연도 성적 요약 저장소 (`performance_summaries`)
//!
//! 요약은 JSON 문자열 한 칸에 통째로 저장합니다. 재계산하면 (학생, 연도) 행을 덮어씁니다.

use crate::models::{PerformanceSummary, StoredSummary};
use sqlx::SqlitePool;

pub async fn upsert_summary(
    pool: &SqlitePool,
    summary: &PerformanceSummary,
    calculated_at: &str,
) -> Result<(), sqlx::Error> {
    let json = serde_json::to_string(summary).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO performance_summaries (student_id, year, summary, calculated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(student_id, year) DO UPDATE SET
            summary = excluded.summary,
            calculated_at = excluded.calculated_at
        "#,
    )
    .bind(&summary.student_id)
    .bind(summary.year)
    .bind(json)
    .bind(calculated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_summary(
    pool: &SqlitePool,
    student_id: &str,
    year: i64,
) -> Result<Option<StoredSummary>, sqlx::Error> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT summary, calculated_at FROM performance_summaries WHERE student_id = ? AND year = ?",
    )
    .bind(student_id)
    .bind(year)
    .fetch_optional(pool)
    .await?;

    row.map(|(summary, calculated_at)| {
        serde_json::from_str(&summary)
            .map(|summary| StoredSummary { summary, calculated_at })
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))
    })
    .transpose()
}

/// 성적표가 모두 지워진 (학생, 연도)의 요약을 지웁니다. 지운 행이 있으면 true.
pub async fn delete_summary(pool: &SqlitePool, student_id: &str, year: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM performance_summaries WHERE student_id = ? AND year = ?")
        .bind(student_id)
        .bind(year)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
