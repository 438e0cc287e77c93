//! Row view-models built from remote pages

use crate::core::predicate::lookup;
use crate::core::query::RemotePage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;

/// Key of the synthetic total row
pub const TOTAL_ROW_KEY: &str = "__total__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Data,
    /// Synthetic aggregate row, styled apart and excluded from row actions
    Total,
}

/// One displayed row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    /// Stable key derived from the row's identity field
    pub key: String,
    pub kind: RowKind,
    pub data: Value,
}

impl RowView {
    pub fn is_total(&self) -> bool {
        self.kind == RowKind::Total
    }

    /// Whether per-row actions (approve, cancel, open popup) apply
    pub fn is_actionable(&self) -> bool {
        self.kind == RowKind::Data
    }
}

/// Client-side total row: sums of numeric fields over the displayed page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalRowSpec {
    pub sum_fields: Vec<String>,
}

impl TotalRowSpec {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            sum_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Sum every configured field; non-numeric or missing values count as zero
    pub fn derive(&self, rows: &[Value]) -> Value {
        let mut totals = Map::new();
        for field in &self.sum_fields {
            let mut sum = 0f64;
            let mut integral = true;
            for row in rows {
                let Some(value) = lookup(row, field).and_then(numeric) else {
                    continue;
                };
                integral &= value.fract() == 0.0;
                sum += value;
            }
            totals.insert(field.clone(), to_number(sum, integral));
        }
        Value::Object(totals)
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        // Amounts sometimes arrive as decimal strings
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn to_number(sum: f64, integral: bool) -> Value {
    if integral && sum.abs() < i64::MAX as f64 {
        return Value::Number(Number::from(sum as i64));
    }
    Number::from_f64(sum).map(Value::Number).unwrap_or(Value::Null)
}

/// Turns a remote page into row view-models
#[derive(Debug, Clone, PartialEq)]
pub struct RowMapper {
    identity_field: String,
    total_row: Option<TotalRowSpec>,
}

impl Default for RowMapper {
    fn default() -> Self {
        Self::new("id")
    }
}

impl RowMapper {
    pub fn new(identity_field: impl Into<String>) -> Self {
        Self {
            identity_field: identity_field.into(),
            total_row: None,
        }
    }

    pub fn with_total_row(mut self, spec: Option<TotalRowSpec>) -> Self {
        self.total_row = spec;
        self
    }

    pub fn identity_field(&self) -> &str {
        &self.identity_field
    }

    /// Map rows 1:1, prepending a total row when one is available
    ///
    /// The server aggregate wins over a derived total. `offset` is the index
    /// of the page's first row, used for rows lacking an identity.
    pub fn map_page(&self, page: &RemotePage, offset: u64) -> Vec<RowView> {
        let mut views = Vec::with_capacity(page.rows.len() + 1);
        let mut seen = HashSet::with_capacity(page.rows.len() + 1);

        let total = match (&page.aggregate, &self.total_row) {
            (Some(aggregate), _) => Some(aggregate.clone()),
            (None, Some(spec)) if !page.rows.is_empty() => Some(spec.derive(&page.rows)),
            _ => None,
        };
        if let Some(data) = total {
            seen.insert(TOTAL_ROW_KEY.to_string());
            views.push(RowView {
                key: TOTAL_ROW_KEY.to_string(),
                kind: RowKind::Total,
                data,
            });
        }

        for (index, row) in page.rows.iter().enumerate() {
            let position = offset.saturating_add(index as u64);
            let mut key = self
                .identity_of(row)
                .unwrap_or_else(|| format!("row-{}", position));
            if !seen.insert(key.clone()) {
                key = format!("{}#{}", key, position);
                seen.insert(key.clone());
            }
            views.push(RowView {
                key,
                kind: RowKind::Data,
                data: row.clone(),
            });
        }
        views
    }

    fn identity_of(&self, row: &Value) -> Option<String> {
        match lookup(row, &self.identity_field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
