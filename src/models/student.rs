use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateStudentRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub code: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubjectRequest {
    pub code: String,
    pub name: String,
}

/// 과목 코드는 영문 대문자 2~4자 + 숫자 2~4자입니다. (예: MATH101)
pub fn is_valid_subject_code(code: &str) -> bool {
    let letters = code.bytes().take_while(|b| b.is_ascii_uppercase()).count();
    let digits = &code[letters..];
    (2..=4).contains(&letters)
        && (2..=4).contains(&digits.len())
        && digits.bytes().all(|b| b.is_ascii_digit())
}
