//! # 집계 엔진 (AggregationEngine)
//!
//! 점수 집합에서 총점/평균/최고/최저/백분율/등급을 계산하는 순수 함수 모음입니다.
//! DB나 시계에 의존하지 않으므로 계산 작업과 테스트에서 그대로 호출합니다.
//!
//! 모든 연산은 1/100 단위 정수로 하며, 평균은 소수 둘째 자리에서 반올림(half-up)합니다.

use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use crate::models::{
    Aggregates, ClassStatistics, ClassSubjectAverage, Grade, PerformanceSummary, Score,
    ScoredMarkRow, Subject, SubjectAverage, SubjectMarkRow, SubjectPerformance, Term,
    TermAverage,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("score {0} is outside 0.00-100.00")]
    ScoreOutOfRange(Score),
    #[error("score total overflowed")]
    Overflow,
    #[error("unknown term {0:?}")]
    InvalidTerm(String),
}

/// 성적표 한 장의 점수를 집계합니다.
///
/// 점수가 없으면 모두 0, 등급 없음(`None`)인 정상 결과를 돌려줍니다.
pub fn aggregate(scores: &[Score]) -> Result<Aggregates, AggregationError> {
    if scores.is_empty() {
        return Ok(Aggregates::empty());
    }

    let mut total: i64 = 0;
    let mut highest = Score::ZERO;
    let mut lowest = Score::MAX_MARK;
    for &score in scores {
        let score = score
            .as_mark()
            .map_err(|_| AggregationError::ScoreOutOfRange(score))?;
        total = total
            .checked_add(score.hundredths())
            .ok_or(AggregationError::Overflow)?;
        highest = highest.max(score);
        lowest = lowest.min(score);
    }

    let count = scores.len() as i64;
    let average = mean_half_up(total, count)?;
    Ok(Aggregates {
        total_subjects: count,
        total_score: Score::from_hundredths(total),
        average_score: average,
        highest_score: highest,
        lowest_score: lowest,
        percentage: average,
        grade: Some(Grade::for_average(average)),
    })
}

/// 1/100 단위 합계를 개수로 나눈 평균. 0.005는 올립니다.
pub fn mean_half_up(total_hundredths: i64, count: i64) -> Result<Score, AggregationError> {
    if count <= 0 {
        return Ok(Score::ZERO);
    }
    let doubled = total_hundredths
        .checked_mul(2)
        .and_then(|t| t.checked_add(count))
        .ok_or(AggregationError::Overflow)?;
    Ok(Score::from_hundredths(doubled.div_euclid(count * 2)))
}

#[derive(Default)]
struct SubjectTally {
    code: String,
    name: String,
    total: i64,
    count: i64,
    cards: HashSet<String>,
}

fn tally_subjects(rows: &[ScoredMarkRow]) -> Result<Vec<(String, SubjectTally)>, AggregationError> {
    let mut order: Vec<String> = Vec::new();
    let mut tallies: HashMap<String, SubjectTally> = HashMap::new();

    for row in rows {
        let score = Score::from_hundredths(row.score)
            .as_mark()
            .map_err(|_| AggregationError::ScoreOutOfRange(Score::from_hundredths(row.score)))?;

        let tally = tallies.entry(row.subject_id.clone()).or_insert_with(|| {
            order.push(row.subject_id.clone());
            SubjectTally {
                code: row.subject_code.clone(),
                name: row.subject_name.clone(),
                ..Default::default()
            }
        });
        tally.total = tally
            .total
            .checked_add(score.hundredths())
            .ok_or(AggregationError::Overflow)?;
        tally.count += 1;
        tally.cards.insert(row.report_card_id.clone());
    }

    let mut subjects: Vec<(String, SubjectTally)> = order
        .into_iter()
        .filter_map(|id| tallies.remove(&id).map(|t| (id, t)))
        .collect();
    subjects.sort_by(|a, b| a.1.code.cmp(&b.1.code));
    Ok(subjects)
}

/// 한 학생의 한 해 성적 요약
///
/// 성적표마다 평균을 내고, 평균이 0보다 큰 성적표만 학기 평균으로 셉니다.
/// 전체 평균은 그 학기 평균들의 평균이고, 과목별 평균은 센 성적표의 점수만으로 냅니다.
pub fn performance_summary(
    student_id: &str,
    year: i64,
    rows: &[ScoredMarkRow],
) -> Result<PerformanceSummary, AggregationError> {
    let mut order: Vec<(&str, &str)> = Vec::new();
    let mut scores_by_card: HashMap<&str, Vec<Score>> = HashMap::new();
    for row in rows {
        let scores = scores_by_card
            .entry(row.report_card_id.as_str())
            .or_insert_with(|| {
                order.push((row.report_card_id.as_str(), row.term.as_str()));
                Vec::new()
            });
        scores.push(Score::from_hundredths(row.score));
    }

    let mut term_averages = Vec::new();
    let mut counted: HashSet<&str> = HashSet::new();
    let mut sum_of_averages: i64 = 0;
    for (card_id, term) in order {
        let scores = scores_by_card.get(card_id).map(Vec::as_slice).unwrap_or(&[]);
        let aggregates = aggregate(scores)?;
        if aggregates.average_score <= Score::ZERO {
            continue;
        }

        sum_of_averages = sum_of_averages
            .checked_add(aggregates.average_score.hundredths())
            .ok_or(AggregationError::Overflow)?;
        counted.insert(card_id);
        term_averages.push(TermAverage {
            report_card_id: card_id.to_string(),
            term: term
                .parse()
                .map_err(|_| AggregationError::InvalidTerm(term.to_string()))?,
            average_score: aggregates.average_score,
            grade: aggregates.grade,
        });
    }
    term_averages.sort_by_key(|t| t.term);

    let counted_rows: Vec<ScoredMarkRow> = rows
        .iter()
        .filter(|r| counted.contains(r.report_card_id.as_str()))
        .cloned()
        .collect();
    let subject_averages = tally_subjects(&counted_rows)?
        .into_iter()
        .map(|(subject_id, tally)| {
            let average = mean_half_up(tally.total, tally.count)?;
            Ok(SubjectAverage {
                subject_id,
                subject_code: tally.code,
                subject_name: tally.name,
                average_score: average,
                grade: Some(Grade::for_average(average)),
                term_count: tally.cards.len() as i64,
            })
        })
        .collect::<Result<Vec<_>, AggregationError>>()?;

    let terms_completed = term_averages.len() as i64;
    let overall_average = mean_half_up(sum_of_averages, terms_completed)?;

    Ok(PerformanceSummary {
        student_id: student_id.to_string(),
        year,
        total_subjects: subject_averages.len() as i64,
        subject_averages,
        term_averages,
        overall_average,
        overall_grade: (terms_completed > 0).then(|| Grade::for_average(overall_average)),
        terms_completed,
    })
}

/// 학급 통계
///
/// `report_card_ids`는 대상 성적표 전체이고 점수가 없는 성적표도 평균 0으로 포함됩니다.
/// 성적표 한 장을 학생 한 명으로 셉니다.
pub fn class_statistics(
    year: i64,
    term: Option<Term>,
    report_card_ids: &[String],
    rows: &[ScoredMarkRow],
) -> Result<ClassStatistics, AggregationError> {
    let mut scores_by_card: HashMap<&str, Vec<Score>> = report_card_ids
        .iter()
        .map(|id| (id.as_str(), Vec::new()))
        .collect();
    for row in rows {
        if let Some(scores) = scores_by_card.get_mut(row.report_card_id.as_str()) {
            scores.push(Score::from_hundredths(row.score));
        }
    }

    let mut grade_distribution: BTreeMap<Grade, i64> =
        Grade::ALL.into_iter().map(|g| (g, 0)).collect();
    let mut sum_of_averages: i64 = 0;
    let mut highest = Score::ZERO;
    let mut lowest: Option<Score> = None;
    let mut above_75 = 0;
    let mut below_50 = 0;

    for id in report_card_ids {
        let scores = scores_by_card.get(id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let average = aggregate(scores)?.average_score;

        sum_of_averages = sum_of_averages
            .checked_add(average.hundredths())
            .ok_or(AggregationError::Overflow)?;
        highest = highest.max(average);
        lowest = Some(lowest.map_or(average, |l| l.min(average)));
        *grade_distribution
            .entry(Grade::for_average(average))
            .or_insert(0) += 1;
        if average >= Score::whole(75) {
            above_75 += 1;
        }
        if average < Score::whole(50) {
            below_50 += 1;
        }
    }

    let total_students = report_card_ids.len() as i64;
    let subject_averages = tally_subjects(rows)?
        .into_iter()
        .map(|(subject_id, tally)| {
            Ok(ClassSubjectAverage {
                subject_id,
                subject_code: tally.code,
                subject_name: tally.name,
                average_score: mean_half_up(tally.total, tally.count)?,
                mark_count: tally.count,
            })
        })
        .collect::<Result<Vec<_>, AggregationError>>()?;

    Ok(ClassStatistics {
        year,
        term,
        total_students,
        class_average: mean_half_up(sum_of_averages, total_students)?,
        highest_average: highest,
        lowest_average: lowest.unwrap_or(Score::ZERO),
        students_above_75: above_75,
        students_below_50: below_50,
        grade_distribution,
        subject_averages,
    })
}

/// 과목 하나의 성취도 (평균/최고/최저, 학생 수, 점수 수)
pub fn subject_performance(
    subject: &Subject,
    year: Option<i64>,
    rows: &[SubjectMarkRow],
) -> Result<SubjectPerformance, AggregationError> {
    let mut total: i64 = 0;
    let mut highest: Option<Score> = None;
    let mut lowest: Option<Score> = None;
    let mut students: HashSet<&str> = HashSet::new();
    for row in rows {
        let raw = Score::from_hundredths(row.score);
        let score = raw
            .as_mark()
            .map_err(|_| AggregationError::ScoreOutOfRange(raw))?;
        total = total
            .checked_add(score.hundredths())
            .ok_or(AggregationError::Overflow)?;
        highest = Some(highest.map_or(score, |h| h.max(score)));
        lowest = Some(lowest.map_or(score, |l| l.min(score)));
        students.insert(row.student_id.as_str());
    }

    let total_marks = rows.len() as i64;
    let average = if total_marks > 0 {
        Some(mean_half_up(total, total_marks)?)
    } else {
        None
    };

    Ok(SubjectPerformance {
        subject_id: subject.id.clone(),
        subject_code: subject.code.clone(),
        subject_name: subject.name.clone(),
        year,
        average_score: average,
        highest_score: highest,
        lowest_score: lowest,
        total_students: students.len() as i64,
        total_marks,
    })
}
