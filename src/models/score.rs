//! # 점수(Score)와 등급(Grade)
//!
//! 점수는 소수 둘째 자리까지의 고정소수점 값입니다.
//! 부동소수점 오차를 피하기 위해 내부적으로 1/100 단위 정수(`86.33` → `8633`)로 저장하고,
//! JSON에서는 `"86.33"` 같은 문자열로 내보냅니다.
//! 입력은 JSON 숫자(`86.33`)와 문자열(`"86.33"`)을 모두 받습니다.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    #[error("score must be a non-negative number with at most two decimals")]
    Format,
    #[error("score must be between 0.00 and 100.00")]
    OutOfRange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(i64);

impl Score {
    pub const ZERO: Score = Score(0);
    /// 한 과목 점수의 상한 (100.00)
    pub const MAX_MARK: Score = Score(10_000);

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Score(hundredths)
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    /// 정수 점수에서 만듭니다. (`Score::whole(90)` == 90.00)
    pub const fn whole(points: i64) -> Self {
        Score(points * 100)
    }

    /// 한 과목 점수로 쓸 수 있는 값인지 확인합니다.
    pub fn as_mark(self) -> Result<Self, ScoreError> {
        if (0..=Self::MAX_MARK.0).contains(&self.0) {
            Ok(self)
        } else {
            Err(ScoreError::OutOfRange)
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Score {
    type Err = ScoreError;

    /// `"90"`, `"90.5"`, `"86.33"`을 받습니다. 음수나 소수 셋째 자리는 거부합니다.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (whole, frac) = match raw.split_once('.') {
            Some((w, f)) => (w, f),
            None => (raw, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScoreError::Format);
        }
        // "90.50"처럼 뒤에 붙은 0은 허용합니다.
        let frac = frac.trim_end_matches('0');
        if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScoreError::Format);
        }

        let whole: i64 = whole.parse().map_err(|_| ScoreError::Format)?;
        let frac_value: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| ScoreError::Format)? * 10,
            _ => frac.parse().map_err(|_| ScoreError::Format)?,
        };
        whole
            .checked_mul(100)
            .and_then(|h| h.checked_add(frac_value))
            .map(Score)
            .ok_or(ScoreError::Format)
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(serde_json::Number),
            Text(String),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n.to_string(),
            Raw::Text(s) => s,
        };
        text.parse().map_err(de::Error::custom)
    }
}

/// 평균 점수에 따른 등급. 하한은 포함(inclusive)입니다.
///
/// 선언 순서가 곧 높은 등급부터의 순서이므로 `Ord`도 그 순서를 따릅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

/// (하한, 등급) 표. 위에서부터 처음 만족하는 행을 씁니다.
const GRADE_THRESHOLDS: [(Score, Grade); 7] = [
    (Score::whole(95), Grade::APlus),
    (Score::whole(90), Grade::A),
    (Score::whole(85), Grade::BPlus),
    (Score::whole(80), Grade::B),
    (Score::whole(75), Grade::CPlus),
    (Score::whole(70), Grade::C),
    (Score::whole(60), Grade::D),
];

impl Grade {
    pub const ALL: [Grade; 8] = [
        Grade::APlus,
        Grade::A,
        Grade::BPlus,
        Grade::B,
        Grade::CPlus,
        Grade::C,
        Grade::D,
        Grade::F,
    ];

    pub fn for_average(average: Score) -> Grade {
        GRADE_THRESHOLDS
            .iter()
            .find(|(floor, _)| average >= *floor)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::F)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grade::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| format!("unknown grade {s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_decimal_scores() {
        assert_eq!("90".parse::<Score>().unwrap(), Score::whole(90));
        assert_eq!("90.5".parse::<Score>().unwrap(), Score::from_hundredths(9050));
        assert_eq!("86.33".parse::<Score>().unwrap(), Score::from_hundredths(8633));
        assert_eq!("72.10".parse::<Score>().unwrap(), Score::from_hundredths(7210));
        assert_eq!("72.100".parse::<Score>().unwrap(), Score::from_hundredths(7210));
    }

    #[test]
    fn rejects_bad_formats() {
        for raw in ["", "-5", "abc", "1.234", ".5", "5.x", "1e2"] {
            assert_eq!(raw.parse::<Score>(), Err(ScoreError::Format), "{raw}");
        }
    }

    #[test]
    fn mark_range_is_enforced() {
        assert!(Score::whole(100).as_mark().is_ok());
        assert_eq!(Score::from_hundredths(10_001).as_mark(), Err(ScoreError::OutOfRange));
    }

    #[test]
    fn json_accepts_numbers_and_strings() {
        let from_number: Score = serde_json::from_str("86.33").unwrap();
        let from_text: Score = serde_json::from_str("\"86.33\"").unwrap();
        let from_int: Score = serde_json::from_str("80").unwrap();
        assert_eq!(from_number, Score::from_hundredths(8633));
        assert_eq!(from_text, from_number);
        assert_eq!(from_int, Score::whole(80));
        assert_eq!(serde_json::to_string(&from_number).unwrap(), "\"86.33\"");
        assert_eq!(Score::from_hundredths(5).to_string(), "0.05");
    }

    #[test]
    fn grade_boundaries_are_inclusive() {
        assert_eq!(Grade::for_average(Score::whole(95)), Grade::APlus);
        assert_eq!(Grade::for_average(Score::from_hundredths(9499)), Grade::A);
        assert_eq!(Grade::for_average(Score::whole(90)), Grade::A);
        assert_eq!(Grade::for_average(Score::whole(85)), Grade::BPlus);
        assert_eq!(Grade::for_average(Score::whole(80)), Grade::B);
        assert_eq!(Grade::for_average(Score::whole(75)), Grade::CPlus);
        assert_eq!(Grade::for_average(Score::whole(70)), Grade::C);
        assert_eq!(Grade::for_average(Score::whole(60)), Grade::D);
        assert_eq!(Grade::for_average(Score::from_hundredths(5999)), Grade::F);
        assert_eq!(Grade::for_average(Score::ZERO), Grade::F);
    }

    #[test]
    fn grade_text_round_trips() {
        for grade in Grade::ALL {
            assert_eq!(grade.as_str().parse::<Grade>().unwrap(), grade);
            assert_eq!(
                serde_json::to_string(&grade).unwrap(),
                format!("\"{}\"", grade.as_str())
            );
        }
    }
}
