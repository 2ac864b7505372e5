//! In-memory model of a loaded statistical dataset.
//!
//! Loaders produce a [`Dataset`]: columns in source order with their storage
//! kind and cell values, plus the two metadata maps XLSForm generation feeds
//! on — variable labels (column name → question text) and value labels
//! (column name → coded value → category name). Both maps preserve encounter
//! order; the choices sheet depends on it.

use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

/// Storage kind of a column as declared by the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Text => "text",
        };
        write!(f, "{name}")
    }
}

/// A single cell. `Missing` covers system-missing and tagged-missing codes.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Missing,
}

impl CellValue {
    /// Display form used for distinct-value counting; `None` for missing.
    /// Integral floats render as the integer they equal so that `2` and
    /// `2.0` count as one value.
    pub fn display_value(&self) -> Option<String> {
        match self {
            CellValue::Int(i) => Some(i.to_string()),
            CellValue::Float(f) => Some(format_numeric(*f)),
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Missing => None,
        }
    }
}

/// A coded value in a value-label mapping.
///
/// Stata codes are 32-bit integers; SPSS codes are doubles or short strings.
/// The string form feeds the choices sheet: integers (and floats with zero
/// fractional part) render without a decimal point or sign padding, other
/// floats use Rust's shortest round-trip formatting, strings pass through.
#[derive(Debug, Clone)]
pub enum LabelCode {
    Int(i64),
    Float(f64),
    Text(String),
}

impl LabelCode {
    /// Collapse a numeric code to `Int` when it is integral.
    pub fn from_f64(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < 9.0e15 {
            LabelCode::Int(value as i64)
        } else {
            LabelCode::Float(value)
        }
    }
}

impl fmt::Display for LabelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelCode::Int(i) => write!(f, "{i}"),
            LabelCode::Float(v) => write!(f, "{}", format_numeric(*v)),
            LabelCode::Text(s) => write!(f, "{s}"),
        }
    }
}

impl PartialEq for LabelCode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LabelCode::Int(a), LabelCode::Int(b)) => a == b,
            (LabelCode::Float(a), LabelCode::Float(b)) => a.to_bits() == b.to_bits(),
            (LabelCode::Text(a), LabelCode::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for LabelCode {}

impl Hash for LabelCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            LabelCode::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            LabelCode::Float(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
            LabelCode::Text(s) => {
                2u8.hash(state);
                s.hash(state);
            }
        }
    }
}

fn format_numeric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// One column of the source table, in source order.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            values: Vec::new(),
        }
    }

    pub fn with_values(name: impl Into<String>, kind: ColumnKind, values: Vec<CellValue>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    /// Number of distinct non-missing values.
    pub fn distinct_count(&self) -> usize {
        self.values
            .iter()
            .filter_map(CellValue::display_value)
            .unique()
            .count()
    }
}

/// Value-label mapping for one column: coded value → category name.
pub type ValueLabelMap = IndexMap<LabelCode, String>;

/// A parsed dataset: the table plus its label metadata.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub columns: Vec<Column>,
    /// Column name → human-readable question text. Absent key means the
    /// column name itself is the label.
    pub variable_labels: IndexMap<String, String>,
    /// Column name → value-label mapping. Absent key (or an empty mapping)
    /// means the column is not categorical.
    pub value_labels: IndexMap<String, ValueLabelMap>,
}

impl Dataset {
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Variable label for a column, if one was recorded.
    pub fn variable_label(&self, column: &str) -> Option<&str> {
        self.variable_labels.get(column).map(String::as_str)
    }

    /// Non-empty value-label mapping for a column. An empty mapping does not
    /// make a column categorical and is filtered out here.
    pub fn categorical_labels(&self, column: &str) -> Option<&ValueLabelMap> {
        self.value_labels.get(column).filter(|m| !m.is_empty())
    }
}
