//! An in-memory `DataStore` for tests: it records every call in order, can be told to fail
//! specific calls, and optionally enforces foreign keys the way the hosted store does.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::filter::Filter;
use crate::store::{DataStore, Row, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Select,
    Delete,
    Insert,
}

impl StoreOp {
    fn method(&self) -> &'static str {
        match self {
            StoreOp::Select => "SELECT",
            StoreOp::Delete => "DELETE",
            StoreOp::Insert => "INSERT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub table: String,
    pub filter: Option<Filter>,
}

/// `child.column` references `parent.parent_column`.
#[derive(Debug, Clone)]
struct ForeignKey {
    child: String,
    column: String,
    parent: String,
    parent_column: String,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    calls: Mutex<Vec<StoreCall>>,
    failures: Mutex<HashMap<(StoreOp, String), String>>,
    foreign_keys: Vec<ForeignKey>,
}

fn as_row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        other => panic!("memory store rows must be objects, got {other}"),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, table: &str, rows: Vec<Value>) -> Self {
        self.tables
            .lock()
            .expect("poisoned lock")
            .entry(table.to_owned())
            .or_default()
            .extend(rows.into_iter().map(as_row));
        self
    }

    /// Refuse deletes of parent rows that are still referenced, with Postgres' error code.
    pub fn with_foreign_key(mut self, child: &str, column: &str, parent: &str, parent_column: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            child: child.to_owned(),
            column: column.to_owned(),
            parent: parent.to_owned(),
            parent_column: parent_column.to_owned(),
        });
        self
    }

    /// Make every `op` against `table` fail with `message`.
    pub fn fail_on(&self, op: StoreOp, table: &str, message: &str) {
        self.failures
            .lock()
            .expect("poisoned lock")
            .insert((op, table.to_owned()), message.to_owned());
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("poisoned lock").clone()
    }

    /// The tables deletes were issued against, in call order.
    pub fn deleted_tables(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.op == StoreOp::Delete)
            .map(|call| call.table)
            .collect()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .expect("poisoned lock")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, op: StoreOp, table: &str, filter: Option<&Filter>) -> StoreResult<()> {
        self.calls.lock().expect("poisoned lock").push(StoreCall {
            op,
            table: table.to_owned(),
            filter: filter.cloned(),
        });

        match self
            .failures
            .lock()
            .expect("poisoned lock")
            .get(&(op, table.to_owned()))
        {
            Some(message) => Err(StoreError::ApiError {
                method: op.method(),
                table: table.to_owned(),
                status: 500,
                code: None,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn violated_key(&self, tables: &HashMap<String, Vec<Row>>, table: &str, removed: &[Row]) -> Option<String> {
        for key in self.foreign_keys.iter().filter(|key| key.parent == table) {
            let removed_keys: Vec<&Value> = removed
                .iter()
                .filter_map(|row| row.get(&key.parent_column))
                .collect();
            let referenced = tables.get(&key.child).is_some_and(|children| {
                children.iter().any(|child| {
                    child
                        .get(&key.column)
                        .is_some_and(|value| removed_keys.contains(&value))
                })
            });
            if referenced {
                return Some(format!(
                    "update or delete on table \"{}\" violates foreign key constraint on table \"{}\"",
                    key.parent, key.child
                ));
            }
        }
        None
    }
}

fn project(row: &Row, columns: &str) -> Row {
    if columns.trim() == "*" {
        return row.clone();
    }
    columns
        .split(',')
        .map(str::trim)
        .filter_map(|column| row.get(column).map(|value| (column.to_owned(), value.clone())))
        .collect()
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, table: &str, columns: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        self.record(StoreOp::Select, table, Some(filter))?;

        Ok(self
            .rows(table)
            .iter()
            .filter(|row| filter.matches(row))
            .map(|row| project(row, columns))
            .collect())
    }

    async fn delete(&self, table: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        self.record(StoreOp::Delete, table, Some(filter))?;
        if filter.is_unrestricted() {
            return Err(StoreError::UnfilteredDelete(table.to_owned()));
        }

        let mut tables = self.tables.lock().expect("poisoned lock");
        let (removed, kept): (Vec<Row>, Vec<Row>) = tables
            .get(table)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .partition(|row| filter.matches(row));

        if let Some(message) = self.violated_key(&tables, table, &removed) {
            return Err(StoreError::ApiError {
                method: "DELETE",
                table: table.to_owned(),
                status: 409,
                code: Some("23503".to_owned()),
                message,
            });
        }

        tables.insert(table.to_owned(), kept);
        Ok(removed)
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<Vec<Row>> {
        self.record(StoreOp::Insert, table, None)?;

        self.tables
            .lock()
            .expect("poisoned lock")
            .entry(table.to_owned())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows)
    }
}
