//! In-memory implementation of RemoteSource for testing and development

use crate::core::predicate::lookup;
use crate::core::query::{QueryOptions, RemotePage, SortDirection, SortSpec};
use crate::core::source::RemoteSource;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// In-memory row source
///
/// Evaluates predicate trees against held rows, sorts by every sort key in
/// priority order and slices the requested page. Uses RwLock for thread-safe
/// access; clones share the same rows.
#[derive(Clone, Default)]
pub struct InMemorySource {
    rows: Arc<RwLock<Vec<Value>>>,
    failures: Arc<RwLock<VecDeque<String>>>,
}

impl InMemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
            failures: Arc::default(),
        }
    }

    pub fn insert(&self, row: Value) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        rows.push(row);
        Ok(())
    }

    pub fn extend(&self, new_rows: impl IntoIterator<Item = Value>) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        rows.extend(new_rows);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        rows.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next fetch fail with `message`; queued failures apply in order
    pub fn fail_next(&self, message: impl Into<String>) -> Result<()> {
        let mut failures = self
            .failures
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        failures.push_back(message.into());
        Ok(())
    }
}

#[async_trait]
impl RemoteSource for InMemorySource {
    async fn fetch(&self, options: QueryOptions) -> Result<RemotePage> {
        {
            let mut failures = self
                .failures
                .write()
                .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
            if let Some(message) = failures.pop_front() {
                return Err(anyhow!(message));
            }
        }

        let rows = self
            .rows
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let mut matching: Vec<&Value> = rows
            .iter()
            .filter(|row| options.filters.iter().all(|node| node.matches(row)))
            .collect();

        if let Some(sort) = &options.sort {
            matching.sort_by(|a, b| compare_rows(a, b, sort));
        }

        let total = matching.len() as u64;
        let offset = options.pagination.offset() as usize;
        let page = matching
            .into_iter()
            .skip(offset)
            .take(options.pagination.per_page as usize)
            .cloned()
            .collect();

        Ok(RemotePage::new(page, total))
    }
}

fn compare_rows(a: &Value, b: &Value, sort: &[SortSpec]) -> Ordering {
    for spec in sort {
        let ordering = match (lookup(a, &spec.field), lookup(b, &spec.field)) {
            // Missing values sort last in both directions
            (None, None) => Ordering::Equal,
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (Some(x), Some(y)) => match spec.direction {
                SortDirection::Asc => compare_values(x, y),
                SortDirection::Desc => compare_values(y, x),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ => a.to_string().cmp(&b.to_string()),
    }
}
