// Google Sheets v4 values client and grade sheet conversions
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

use crate::db::grades::ImportedGrade;
use crate::db::Grade;

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

pub const GRADE_HEADER: [&str; 8] = [
    "student_code",
    "first_name",
    "last_name",
    "coursework",
    "midterm",
    "final",
    "total",
    "grade_point",
];

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateValuesResponse {
    #[serde(default)]
    updated_cells: u64,
}

pub struct SheetsClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl SheetsClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: access_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range)
        )
    }

    /// Cell values of `range`, row-major, rendered as strings.
    pub async fn read_range(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let response = self
            .http
            .get(self.values_url(spreadsheet_id, range))
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .context("Failed to reach Google Sheets")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Google Sheets returned {} reading {}: {}", status, range, body);
        }

        let value_range: ValueRange = response
            .json()
            .await
            .context("Invalid Google Sheets response")?;

        Ok(value_range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    /// Overwrite `range` with `rows`; returns the number of updated cells.
    pub async fn write_range(&self, spreadsheet_id: &str, range: &str, rows: &[Vec<String>]) -> Result<u64> {
        let body = serde_json::json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });

        let response = self
            .http
            .put(self.values_url(spreadsheet_id, range))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .context("Failed to reach Google Sheets")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Google Sheets returned {} writing {}: {}", status, range, body);
        }

        let updated: UpdateValuesResponse = response
            .json()
            .await
            .context("Invalid Google Sheets response")?;
        Ok(updated.updated_cells)
    }
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A sheet row that could not be imported.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SkippedRow {
    /// 1-based row number within the range.
    pub row: usize,
    pub reason: String,
}

fn parse_score(raw: Option<&String>, column: &str) -> std::result::Result<f64, String> {
    let raw = raw.map(|s| s.trim()).unwrap_or("");
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| format!("invalid {} score {:?}", column, raw))
}

/// Parse `student_code, coursework, midterm, final` rows. A leading header row
/// is ignored; blank and malformed rows are returned separately.
pub fn parse_grade_rows(rows: &[Vec<String>]) -> (Vec<ImportedGrade>, Vec<SkippedRow>) {
    let mut grades = Vec::new();
    let mut skipped = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        let code = row.first().map(|c| c.trim()).unwrap_or("");

        if index == 0 && code.eq_ignore_ascii_case("student_code") {
            continue;
        }
        if row.iter().all(|cell| cell.trim().is_empty()) {
            skipped.push(SkippedRow {
                row: row_number,
                reason: "blank row".to_string(),
            });
            continue;
        }
        if code.is_empty() {
            skipped.push(SkippedRow {
                row: row_number,
                reason: "missing student code".to_string(),
            });
            continue;
        }

        let parsed = parse_score(row.get(1), "coursework").and_then(|coursework| {
            let midterm = parse_score(row.get(2), "midterm")?;
            let final_exam = parse_score(row.get(3), "final")?;
            Ok((coursework, midterm, final_exam))
        });

        match parsed {
            Ok((coursework, midterm, final_exam)) => grades.push(ImportedGrade {
                student_code: code.to_string(),
                coursework,
                midterm,
                final_exam,
            }),
            Err(reason) => skipped.push(SkippedRow {
                row: row_number,
                reason,
            }),
        }
    }

    (grades, skipped)
}

/// Header plus one row per graded student.
pub fn grade_export_rows(grades: &[Grade]) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(grades.len() + 1);
    rows.push(GRADE_HEADER.iter().map(|h| h.to_string()).collect());
    for grade in grades {
        rows.push(vec![
            grade.student_code.clone(),
            grade.first_name.clone(),
            grade.last_name.clone(),
            grade.coursework.to_string(),
            grade.midterm.to_string(),
            grade.final_exam.to_string(),
            grade.total.to_string(),
            format!("{:.1}", grade.grade_point),
        ]);
    }
    rows
}
