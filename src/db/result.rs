//! Result cursor.
//!
//! A `ResultCursor` wraps what a driver returned for a SELECT. The raw rows
//! are pulled from the driver source at most once; the array, object and
//! custom-type forms are each built on first request and memoized, so
//! repeated calls hand back the same data without touching the source.
//!
//! Row navigation (`row`, `first_row`, `next_row`, ...) shares one
//! `current_row` pointer across all forms. Moving past either end is a
//! no-op that returns the current row again.

use std::any::{Any, TypeId};
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::value::{Row, Value};
use super::DbError;

/// Column metadata as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMeta {
    pub name: String,
    /// Engine type name (`int4`, `TEXT`, ...).
    pub type_name: String,
}

/// Where a cursor's rows come from.
pub trait ResultSource: Send {
    fn field_names(&self) -> Vec<String>;

    fn rows_count(&self) -> usize;

    /// Hand over every row. Called at most once per cursor.
    fn fetch_all(&mut self) -> Vec<Vec<Value>>;

    fn field_data(&self) -> Vec<FieldMeta> {
        self.field_names()
            .into_iter()
            .map(|name| FieldMeta {
                name,
                type_name: String::new(),
            })
            .collect()
    }
}

/// A fully buffered driver result.
#[derive(Debug, Clone, Default)]
pub struct MaterializedResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub fields: Vec<FieldMeta>,
}

impl ResultSource for MaterializedResult {
    fn field_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn rows_count(&self) -> usize {
        self.rows.len()
    }

    fn fetch_all(&mut self) -> Vec<Vec<Value>> {
        std::mem::take(&mut self.rows)
    }

    fn field_data(&self) -> Vec<FieldMeta> {
        if self.fields.is_empty() {
            self.columns
                .iter()
                .map(|name| FieldMeta {
                    name: name.clone(),
                    type_name: String::new(),
                })
                .collect()
        } else {
            self.fields.clone()
        }
    }
}

/// Materialization form requested from `result`/`row`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultKind {
    /// Column-keyed rows (`Row`).
    #[default]
    Array,
    /// JSON objects.
    Object,
}

/// A whole result in one form.
#[derive(Debug, Clone, Copy)]
pub enum ResultSet<'a> {
    Array(&'a [Row]),
    Object(&'a [serde_json::Value]),
}

impl ResultSet<'_> {
    pub fn len(&self) -> usize {
        match self {
            ResultSet::Array(rows) => rows.len(),
            ResultSet::Object(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single row in one form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultRow<'a> {
    Array(&'a Row),
    Object(&'a serde_json::Value),
}

impl<'a> ResultRow<'a> {
    pub fn as_array(&self) -> Option<&'a Row> {
        match self {
            ResultRow::Array(row) => Some(row),
            ResultRow::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&'a serde_json::Value> {
        match self {
            ResultRow::Object(row) => Some(row),
            ResultRow::Array(_) => None,
        }
    }
}

pub struct ResultCursor {
    source: RefCell<Option<Box<dyn ResultSource>>>,
    columns: Arc<Vec<String>>,
    fields: Vec<FieldMeta>,
    num_rows: usize,
    rows: OnceCell<Vec<Row>>,
    objects: OnceCell<Vec<serde_json::Value>>,
    custom: RefCell<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    current_row: Cell<usize>,
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("columns", &self.columns)
            .field("num_rows", &self.num_rows)
            .field("current_row", &self.current_row.get())
            .finish()
    }
}

impl ResultCursor {
    /// Wrap a live driver result.
    pub fn new(source: Box<dyn ResultSource>) -> Self {
        let columns = Arc::new(source.field_names());
        let fields = source.field_data();
        let num_rows = source.rows_count();
        Self {
            source: RefCell::new(Some(source)),
            columns,
            fields,
            num_rows,
            rows: OnceCell::new(),
            objects: OnceCell::new(),
            custom: RefCell::new(HashMap::new()),
            current_row: Cell::new(0),
        }
    }

    /// A cursor rebuilt from cached rows, with no driver behind it.
    ///
    /// Field metadata is unavailable offline: `fields_count` is 0 and
    /// `field_names`/`fetch_fields` are empty.
    pub fn offline(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns = Arc::new(columns);
        let num_rows = rows.len();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect::<Vec<_>>();
        Self {
            source: RefCell::new(None),
            columns: Arc::new(Vec::new()),
            fields: Vec::new(),
            num_rows,
            rows: OnceCell::from(rows),
            objects: OnceCell::new(),
            custom: RefCell::new(HashMap::new()),
            current_row: Cell::new(0),
        }
    }

    /// An empty cursor, returned for statements that produce no rows.
    pub fn empty() -> Self {
        Self::offline(Vec::new(), Vec::new())
    }

    fn materialize(&self) -> Vec<Row> {
        let Some(mut source) = self.source.borrow_mut().take() else {
            return Vec::new();
        };
        source
            .fetch_all()
            .into_iter()
            .map(|values| Row::new(Arc::clone(&self.columns), values))
            .collect()
    }

    /// Rows keyed by column name. Computed once.
    pub fn result_array(&self) -> &[Row] {
        self.rows.get_or_init(|| self.materialize())
    }

    /// Rows as JSON objects. Computed once.
    pub fn result_object(&self) -> &[serde_json::Value] {
        self.objects
            .get_or_init(|| self.result_array().iter().map(Row::to_json_object).collect())
    }

    /// Rows deserialized into `T`. Computed once per type.
    pub fn custom_result<T>(&self) -> Result<Arc<Vec<T>>, DbError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();
        if let Some(cached) = self.custom.borrow().get(&key) {
            if let Ok(typed) = Arc::clone(cached).downcast::<Vec<T>>() {
                return Ok(typed);
            }
        }

        let decoded = self
            .result_object()
            .iter()
            .map(|obj| serde_json::from_value::<T>(obj.clone()))
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| DbError::Decode(e.to_string()))?;
        let decoded = Arc::new(decoded);
        self.custom
            .borrow_mut()
            .insert(key, Arc::clone(&decoded) as Arc<dyn Any + Send + Sync>);
        Ok(decoded)
    }

    pub fn result(&self, kind: ResultKind) -> ResultSet<'_> {
        match kind {
            ResultKind::Array => ResultSet::Array(self.result_array()),
            ResultKind::Object => ResultSet::Object(self.result_object()),
        }
    }

    fn row_at(&self, idx: usize, kind: ResultKind) -> Option<ResultRow<'_>> {
        match kind {
            ResultKind::Array => self.result_array().get(idx).map(ResultRow::Array),
            ResultKind::Object => self.result_object().get(idx).map(ResultRow::Object),
        }
    }

    fn len(&self, kind: ResultKind) -> usize {
        self.result(kind).len()
    }

    /// Row `n`, moving the pointer there. An out-of-range `n` leaves the
    /// pointer alone and returns the current row.
    pub fn row(&self, n: usize, kind: ResultKind) -> Option<ResultRow<'_>> {
        if n < self.len(kind) {
            self.current_row.set(n);
        }
        self.row_at(self.current_row.get(), kind)
    }

    pub fn row_array(&self, n: usize) -> Option<&Row> {
        self.row(n, ResultKind::Array).and_then(|r| r.as_array())
    }

    pub fn row_object(&self, n: usize) -> Option<&serde_json::Value> {
        self.row(n, ResultKind::Object).and_then(|r| r.as_object())
    }

    pub fn first_row(&self, kind: ResultKind) -> Option<ResultRow<'_>> {
        self.row_at(0, kind)
    }

    pub fn last_row(&self, kind: ResultKind) -> Option<ResultRow<'_>> {
        let len = self.len(kind);
        if len == 0 {
            return None;
        }
        self.row_at(len - 1, kind)
    }

    pub fn next_row(&self, kind: ResultKind) -> Option<ResultRow<'_>> {
        let next = self.current_row.get() + 1;
        if next < self.len(kind) {
            self.current_row.set(next);
        }
        self.row_at(self.current_row.get(), kind)
    }

    pub fn previous_row(&self, kind: ResultKind) -> Option<ResultRow<'_>> {
        let current = self.current_row.get();
        if current > 0 {
            self.current_row.set(current - 1);
        }
        self.row_at(self.current_row.get(), kind)
    }

    pub fn current_row(&self) -> usize {
        self.current_row.get()
    }

    pub fn rows_count(&self) -> usize {
        self.num_rows
    }

    pub fn fields_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn fetch_fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    /// Column names of the materialized rows, available offline too.
    pub(crate) fn row_columns(&self) -> Vec<String> {
        self.result_array()
            .first()
            .map(|r| r.columns().to_vec())
            .unwrap_or_else(|| self.columns.to_vec())
    }

    /// Release the driver-side result. Rows already materialized stay.
    pub fn free_result(&mut self) {
        self.source.get_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: MaterializedResult,
        fetches: Arc<AtomicUsize>,
    }

    impl ResultSource for CountingSource {
        fn field_names(&self) -> Vec<String> {
            self.inner.field_names()
        }

        fn rows_count(&self) -> usize {
            self.inner.rows_count()
        }

        fn fetch_all(&mut self) -> Vec<Vec<Value>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_all()
        }
    }

    fn cursor(n: i64) -> (ResultCursor, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: MaterializedResult {
                columns: vec!["id".into(), "name".into()],
                rows: (1..=n)
                    .map(|i| vec![Value::Int(i), Value::Text(format!("n{}", i))])
                    .collect(),
                fields: vec![],
            },
            fetches: Arc::clone(&fetches),
        };
        (ResultCursor::new(Box::new(source)), fetches)
    }

    fn id(row: Option<ResultRow<'_>>) -> Option<i64> {
        row.and_then(|r| r.as_array())
            .and_then(|r| r.get("id"))
            .and_then(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
    }

    #[test]
    fn test_result_array_fetches_once() {
        let (cursor, fetches) = cursor(3);
        let first = cursor.result_array().as_ptr();
        let second = cursor.result_array().as_ptr();
        assert_eq!(first, second);
        cursor.result_object();
        cursor.row(2, ResultKind::Object);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_result_object_is_memoized() {
        let (cursor, _) = cursor(2);
        let a = cursor.result_object().as_ptr();
        cursor.next_row(ResultKind::Array);
        let b = cursor.result_object().as_ptr();
        assert_eq!(a, b);
        assert_eq!(cursor.result_object()[0]["name"], "n1");
    }

    #[test]
    fn test_custom_result_is_memoized() {
        #[derive(serde::Deserialize)]
        struct Item {
            id: i64,
            name: String,
        }
        let (cursor, _) = cursor(2);
        let a = cursor.custom_result::<Item>().unwrap();
        let b = cursor.custom_result::<Item>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a[1].id, 2);
        assert_eq!(a[1].name, "n2");
    }

    #[test]
    fn test_custom_result_decode_error() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Wrong {
            missing: String,
        }
        let (cursor, _) = cursor(1);
        let err = cursor.custom_result::<Wrong>().unwrap_err();
        assert_eq!(err.message_key(), "db_decode_failed");
    }

    #[test]
    fn test_next_and_previous_clamp() {
        let (cursor, _) = cursor(2);
        assert_eq!(id(cursor.previous_row(ResultKind::Array)), Some(1));
        assert_eq!(id(cursor.next_row(ResultKind::Array)), Some(2));
        assert_eq!(id(cursor.next_row(ResultKind::Array)), Some(2));
        assert_eq!(cursor.current_row(), 1);
        assert_eq!(id(cursor.previous_row(ResultKind::Array)), Some(1));
    }

    #[test]
    fn test_row_out_of_range_returns_current() {
        let (cursor, _) = cursor(3);
        assert_eq!(id(cursor.row(1, ResultKind::Array)), Some(2));
        assert_eq!(id(cursor.row(10, ResultKind::Array)), Some(2));
        assert_eq!(cursor.row_array(2).and_then(|r| r.get("id")), Some(&Value::Int(3)));
    }

    #[test]
    fn test_first_and_last_do_not_move_pointer() {
        let (cursor, _) = cursor(3);
        assert_eq!(id(cursor.last_row(ResultKind::Array)), Some(3));
        assert_eq!(id(cursor.first_row(ResultKind::Array)), Some(1));
        assert_eq!(cursor.current_row(), 0);
    }

    #[test]
    fn test_empty_result() {
        let (cursor, _) = cursor(0);
        assert!(cursor.row(0, ResultKind::Array).is_none());
        assert!(cursor.last_row(ResultKind::Object).is_none());
        assert!(cursor.next_row(ResultKind::Array).is_none());
    }

    #[test]
    fn test_metadata_live_and_offline() {
        let (live, _) = cursor(2);
        assert_eq!(live.rows_count(), 2);
        assert_eq!(live.fields_count(), 2);
        assert_eq!(live.field_names(), vec!["id", "name"]);

        let offline = ResultCursor::offline(vec!["id".into()], vec![vec![Value::Int(7)]]);
        assert_eq!(offline.rows_count(), 1);
        assert_eq!(offline.fields_count(), 0);
        assert!(offline.field_names().is_empty());
        assert!(offline.fetch_fields().is_empty());
        assert_eq!(offline.row_array(0).and_then(|r| r.get("id")), Some(&Value::Int(7)));
    }

    #[test]
    fn test_free_result_keeps_materialized_rows() {
        let (mut cursor, fetches) = cursor(2);
        cursor.result_array();
        cursor.free_result();
        assert_eq!(cursor.result_array().len(), 2);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
