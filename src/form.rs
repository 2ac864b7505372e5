//! XLSForm schema generation: question-type inference and the three sheet
//! builders (survey, choices, settings), plus the variable-info projection
//! used by `inspect`.
//!
//! Inference is priority-ordered, first match wins:
//!
//! 1. a column with a non-empty value-label mapping is a closed question —
//!    `select_one <name>_choices` — regardless of its storage kind, since
//!    value-labeled integer codes are answers, not measurements;
//! 2. integer storage → `integer`;
//! 3. floating-point storage → `decimal`;
//! 4. boolean storage → `select_one yes_no` (binary survey fields are
//!    choice questions by convention);
//! 5. anything else → `text`.

use std::fmt;
use std::path::Path;

use heck::ToTitleCase;
use serde::Serialize;

use crate::dataset::{Column, ColumnKind, Dataset};

/// List name of the built-in yes/no choice list.
pub const YES_NO_LIST: &str = "yes_no";

/// XLSForm question type for one survey row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionType {
    /// `select_one <list>` against a named choice list.
    SelectOne(String),
    Integer,
    Decimal,
    Text,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::SelectOne(list) => write!(f, "select_one {list}"),
            QuestionType::Integer => write!(f, "integer"),
            QuestionType::Decimal => write!(f, "decimal"),
            QuestionType::Text => write!(f, "text"),
        }
    }
}

/// Choice-list name generated for a categorical column.
pub fn choice_list_name(column: &str) -> String {
    format!("{column}_choices")
}

/// Infer the question type for one column.
pub fn infer_question_type(dataset: &Dataset, column: &Column) -> QuestionType {
    if dataset.categorical_labels(&column.name).is_some() {
        return QuestionType::SelectOne(choice_list_name(&column.name));
    }
    match column.kind {
        ColumnKind::Integer => QuestionType::Integer,
        ColumnKind::Float => QuestionType::Decimal,
        ColumnKind::Boolean => QuestionType::SelectOne(YES_NO_LIST.to_string()),
        ColumnKind::Text => QuestionType::Text,
    }
}

/// One row of the `survey` sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyRow {
    pub question_type: QuestionType,
    pub name: String,
    pub label: String,
}

/// One row of the `choices` sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceRow {
    pub list_name: String,
    pub name: String,
    pub label: String,
}

/// The `settings` sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub form_title: String,
    pub form_id: String,
}

/// Build the survey sheet: one row per column in source order. The label
/// falls back to the column name, never empty.
pub fn survey_rows(dataset: &Dataset) -> Vec<SurveyRow> {
    dataset
        .columns
        .iter()
        .map(|column| SurveyRow {
            question_type: infer_question_type(dataset, column),
            name: column.name.clone(),
            label: dataset
                .variable_label(&column.name)
                .unwrap_or(&column.name)
                .to_string(),
        })
        .collect()
}

/// Build the choices sheet: the two fixed `yes_no` entries first, then one
/// row per (code, label) pair of each categorical column, columns in source
/// order, pairs in mapping order.
pub fn choice_rows(dataset: &Dataset) -> Vec<ChoiceRow> {
    let mut rows = vec![
        ChoiceRow {
            list_name: YES_NO_LIST.to_string(),
            name: "1".to_string(),
            label: "Yes".to_string(),
        },
        ChoiceRow {
            list_name: YES_NO_LIST.to_string(),
            name: "0".to_string(),
            label: "No".to_string(),
        },
    ];

    for column in &dataset.columns {
        let Some(labels) = dataset.categorical_labels(&column.name) else {
            continue;
        };
        let list_name = choice_list_name(&column.name);
        for (code, label) in labels {
            rows.push(ChoiceRow {
                list_name: list_name.clone(),
                name: code.to_string(),
                label: label.clone(),
            });
        }
    }

    rows
}

/// Build the settings sheet. `form_id` defaults to the source file's base
/// name; `form_title` defaults to the id with underscores as spaces, title
/// cased.
pub fn settings(source: &Path, form_id: Option<&str>, form_title: Option<&str>) -> Settings {
    let form_id = match form_id {
        Some(id) => id.to_string(),
        None => source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let form_title = match form_title {
        Some(title) => title.to_string(),
        None => form_id.to_title_case(),
    };
    Settings {
        form_title,
        form_id,
    }
}

/// Per-column summary for inspection. Read-only projection; plays no part
/// in conversion.
#[derive(Debug, Clone, Serialize)]
pub struct VariableInfo {
    pub variable: String,
    pub label: String,
    pub kind: ColumnKind,
    pub has_value_labels: bool,
    pub distinct_values: usize,
}

pub fn variable_info(dataset: &Dataset) -> Vec<VariableInfo> {
    dataset
        .columns
        .iter()
        .map(|column| VariableInfo {
            variable: column.name.clone(),
            label: dataset
                .variable_label(&column.name)
                .unwrap_or_default()
                .to_string(),
            kind: column.kind,
            has_value_labels: dataset.categorical_labels(&column.name).is_some(),
            distinct_values: column.distinct_count(),
        })
        .collect()
}
