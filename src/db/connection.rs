//! A live connection to one configured group.
//!
//! `Connection` ties a driver to its dialect and carries the per-connection
//! state: table prefix, transaction depth, query cache and the query log.
//! Callers reach it through the `Queryable` and `ActiveRecord` traits, which
//! the registry implements on the handles it hands out.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::builder::QueryBuilder;
use super::cache::{CachedResult, DbCache};
use super::config::ConnectionParams;
use super::dialect::{Dialect, SqlDialect};
use super::driver::{Driver, DriverKind, QueryOutcome};
use super::result::{FieldMeta, ResultCursor};
use super::schema::{Forge, Utility};
use super::value::{DatabaseValue, Value};
use super::{is_write_type, DbError};

pub struct Connection {
    group: String,
    driver: Box<dyn Driver>,
    dialect: SqlDialect,
    params: ConnectionParams,
    trans_depth: u32,
    trans_failed: bool,
    cache: Option<DbCache>,
    cache_on: bool,
    cache_uri: String,
    save_queries: bool,
    queries: Vec<String>,
    query_times: Vec<Duration>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("group", &self.group)
            .field("platform", &self.dialect.platform())
            .field("trans_depth", &self.trans_depth)
            .finish()
    }
}

impl Connection {
    /// Resolve the driver, connect, and set up the query cache.
    pub fn open(group: &str, params: ConnectionParams) -> Result<Self, DbError> {
        let kind = DriverKind::from_name(&params.dbdriver)?;
        let mut driver = kind.create(&params);
        driver.connect(params.pconnect)?;
        info!(category = "db", group, driver = kind.name(), "database driver initialized");
        Ok(Self::from_driver(group, driver, params))
    }

    /// Wrap an already connected driver.
    pub fn from_driver(group: &str, driver: Box<dyn Driver>, params: ConnectionParams) -> Self {
        let dialect = driver.kind().dialect();
        let cache = if params.cache_on {
            params.cachedir.as_ref().and_then(|dir| match DbCache::new(dir) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(category = "db_cache", group, error = %e, "query cache disabled");
                    None
                }
            })
        } else {
            None
        };
        let cache_on = cache.is_some();

        Self {
            group: group.to_string(),
            driver,
            dialect,
            params,
            trans_depth: 0,
            trans_failed: false,
            cache,
            cache_on,
            cache_uri: String::new(),
            save_queries: true,
            queries: Vec::new(),
            query_times: Vec::new(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn platform(&self) -> &'static str {
        self.dialect.platform()
    }

    pub fn dbprefix(&self) -> &str {
        &self.params.dbprefix
    }

    /// Swap the table prefix, returning the new one.
    pub fn set_dbprefix(&mut self, prefix: &str) -> &str {
        self.params.dbprefix = prefix.to_string();
        &self.params.dbprefix
    }

    /// Prepend the table prefix unless the name already carries it.
    pub fn prefix_table(&self, table: &str) -> String {
        let prefix = &self.params.dbprefix;
        if prefix.is_empty() || table.starts_with(prefix.as_str()) {
            table.to_string()
        } else {
            format!("{}{}", prefix, table)
        }
    }

    /// Prefixed and quoted table name.
    pub fn protect_table(&self, table: &str) -> String {
        self.dialect.protect_identifiers(&self.prefix_table(table.trim()))
    }

    pub fn escape(&self, value: &Value) -> String {
        self.dialect.escape_value(value)
    }

    pub fn escape_str(&self, s: &str) -> String {
        self.dialect.escape_str(s, false)
    }

    pub fn escape_like_str(&self, s: &str) -> String {
        self.dialect.escape_str(s, true)
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    pub fn reconnect(&mut self) -> Result<(), DbError> {
        self.driver.reconnect()
    }

    pub fn close(&mut self) {
        debug!(category = "db", group = %self.group, "closing connection");
        self.driver.close();
    }

    pub fn version(&mut self) -> Result<String, DbError> {
        self.driver.version()
    }

    pub fn set_query_timeout(&mut self, timeout: Duration) -> Result<(), DbError> {
        self.driver.set_query_timeout(timeout)
    }

    /// Send a statement and record it in the query log.
    fn run(&mut self, sql: &str) -> Result<QueryOutcome, DbError> {
        let started = Instant::now();
        let outcome = self.driver.execute(sql);
        let elapsed = started.elapsed();

        if self.save_queries {
            self.queries.push(sql.to_string());
            self.query_times.push(elapsed);
        }
        debug!(
            category = "db",
            group = %self.group,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            sql,
            "query executed"
        );

        if let Err(e) = &outcome {
            if self.trans_depth > 0 {
                self.trans_failed = true;
            }
            warn!(category = "db", group = %self.group, error = %e, "query failed");
        }
        outcome
    }

    /// Run a statement and wrap its rows in a cursor.
    ///
    /// Writes return an empty cursor; use `affected_rows` for the count.
    /// Reads go through the query cache when it is on.
    pub fn query(&mut self, sql: &str) -> Result<ResultCursor, DbError> {
        let cacheable = self.cache_on && !is_write_type(sql);
        if cacheable {
            if let Some(hit) = self
                .cache
                .as_ref()
                .and_then(|cache| cache.read(&self.cache_uri, sql))
            {
                debug!(category = "db_cache", group = %self.group, "cache hit");
                return Ok(hit.into_cursor());
            }
        }

        match self.run(sql)? {
            QueryOutcome::Rows(result) => {
                let cursor = ResultCursor::new(Box::new(result));
                if cacheable {
                    if let Some(cache) = &self.cache {
                        cache.write(&self.cache_uri, sql, &CachedResult::from_cursor(&cursor));
                    }
                }
                Ok(cursor)
            }
            QueryOutcome::Affected(_) => Ok(ResultCursor::empty()),
        }
    }

    /// Run a statement for its effect. Returns affected (or returned) rows.
    pub fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        match self.run(sql)? {
            QueryOutcome::Affected(n) => Ok(n),
            QueryOutcome::Rows(result) => Ok(result.rows.len() as u64),
        }
    }

    pub fn affected_rows(&self) -> u64 {
        self.driver.affected_rows()
    }

    pub fn insert_id(&mut self, table: Option<&str>, column: Option<&str>) -> Result<i64, DbError> {
        let table = table.map(|t| self.prefix_table(t));
        self.driver.insert_id(table.as_deref(), column)
    }

    pub fn last_query(&self) -> Option<&str> {
        self.queries.last().map(String::as_str)
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn query_times(&self) -> &[Duration] {
        &self.query_times
    }

    pub fn set_save_queries(&mut self, save: bool) {
        self.save_queries = save;
    }

    // Transactions

    /// Open a transaction. Only the outermost call reaches the server.
    pub fn trans_begin(&mut self) -> Result<bool, DbError> {
        self.trans_depth += 1;
        if self.trans_depth > 1 {
            return Ok(true);
        }
        self.trans_failed = false;
        if let Err(e) = self.driver.begin() {
            self.trans_depth = 0;
            return Err(e);
        }
        self.queries.push("BEGIN".to_string());
        Ok(true)
    }

    /// Commit. Nested calls only unwind the depth counter.
    pub fn trans_commit(&mut self) -> Result<bool, DbError> {
        if self.trans_depth == 0 {
            return Ok(false);
        }
        self.trans_depth -= 1;
        if self.trans_depth > 0 {
            return Ok(true);
        }
        self.driver.commit()?;
        self.queries.push("COMMIT".to_string());
        Ok(true)
    }

    /// Roll back. Nested calls only unwind the depth counter.
    pub fn trans_rollback(&mut self) -> Result<bool, DbError> {
        if self.trans_depth == 0 {
            return Ok(false);
        }
        self.trans_depth -= 1;
        if self.trans_depth > 0 {
            return Ok(true);
        }
        self.driver.rollback()?;
        self.queries.push("ROLLBACK".to_string());
        Ok(true)
    }

    /// False once any statement inside the current transaction failed.
    pub fn trans_status(&self) -> bool {
        !self.trans_failed
    }

    pub fn trans_depth(&self) -> u32 {
        self.trans_depth
    }

    /// Run `f` inside a transaction, committing on success and rolling
    /// back on error.
    ///
    /// A query that failed inside `f` also rolls back, even when `f`
    /// handled the error; that case returns `DbError::TransactionFailed`.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DbError>,
    {
        self.trans_begin()?;
        match f(self) {
            Ok(value) if self.trans_status() => {
                self.trans_commit()?;
                Ok(value)
            }
            Ok(_) => {
                self.trans_rollback()?;
                Err(DbError::TransactionFailed(self.group.clone()))
            }
            Err(e) => {
                self.trans_rollback()?;
                Err(e)
            }
        }
    }

    // Query cache

    pub fn cache_on(&mut self) -> bool {
        self.cache_on = self.cache.is_some();
        self.cache_on
    }

    pub fn cache_off(&mut self) {
        self.cache_on = false;
    }

    pub fn is_cache_on(&self) -> bool {
        self.cache_on
    }

    /// Key under which the current request's reads are cached.
    pub fn set_cache_uri(&mut self, uri: &str) {
        self.cache_uri = uri.to_string();
    }

    pub fn cache_delete(&self, uri: &str) {
        if let Some(cache) = &self.cache {
            cache.delete(uri);
        }
    }

    pub fn cache_delete_all(&self) {
        if let Some(cache) = &self.cache {
            cache.delete_all();
        }
    }

    // Metadata

    /// First column of every row, as text.
    fn first_column(&mut self, sql: &str, key: Option<&str>) -> Result<Vec<String>, DbError> {
        let cursor = self.query(sql)?;
        Ok(cursor
            .result_array()
            .iter()
            .filter_map(|row| match key {
                Some(key) => row.get(key),
                None => row.get_index(0),
            })
            .filter_map(|v| v.as_string())
            .collect())
    }

    /// Tables in the database. With `constrain_by_prefix`, only those
    /// starting with the table prefix.
    pub fn list_tables(&mut self, constrain_by_prefix: bool) -> Result<Vec<String>, DbError> {
        let prefix = constrain_by_prefix.then(|| self.params.dbprefix.clone());
        let sql = self.dialect.list_tables_sql(prefix.as_deref());
        self.first_column(&sql, None)
    }

    pub fn table_exists(&mut self, table: &str) -> Result<bool, DbError> {
        let table = self.prefix_table(table);
        Ok(self.list_tables(false)?.contains(&table))
    }

    pub fn list_fields(&mut self, table: &str) -> Result<Vec<String>, DbError> {
        let table = self.prefix_table(table);
        let sql = self.dialect.list_columns_sql(&table);
        let key = self.dialect.list_columns_key();
        self.first_column(&sql, Some(key))
    }

    pub fn field_exists(&mut self, field: &str, table: &str) -> Result<bool, DbError> {
        Ok(self.list_fields(table)?.iter().any(|f| f == field))
    }

    /// Column metadata from a one-row probe of `table`.
    pub fn field_data(&mut self, table: &str) -> Result<Vec<FieldMeta>, DbError> {
        let sql = self
            .dialect
            .limit_clause(&format!("SELECT * FROM {}", self.protect_table(table)), 1, 0);
        match self.run(&sql)? {
            QueryOutcome::Rows(result) => Ok(ResultCursor::new(Box::new(result))
                .fetch_fields()
                .to_vec()),
            QueryOutcome::Affected(_) => Ok(Vec::new()),
        }
    }

    pub fn count_all(&mut self, table: &str) -> Result<i64, DbError> {
        if table.trim().is_empty() {
            return Ok(0);
        }
        let sql = self.dialect.count_all_sql(&self.protect_table(table));
        let cursor = self.query(&sql)?;
        Ok(cursor
            .row_array(0)
            .and_then(|row| row.get("numrows"))
            .map(|v| v.as_i64_or(0))
            .unwrap_or(0))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.trans_depth > 0 {
            warn!(category = "db", group = %self.group, "connection dropped inside a transaction");
        }
    }
}

/// Plain driver access: raw statements, transactions, metadata, schema.
pub trait Queryable {
    fn connection(&mut self) -> &mut Connection;

    fn query(&mut self, sql: &str) -> Result<ResultCursor, DbError> {
        self.connection().query(sql)
    }

    fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        self.connection().execute(sql)
    }

    fn trans_begin(&mut self) -> Result<bool, DbError> {
        self.connection().trans_begin()
    }

    fn trans_commit(&mut self) -> Result<bool, DbError> {
        self.connection().trans_commit()
    }

    fn trans_rollback(&mut self) -> Result<bool, DbError> {
        self.connection().trans_rollback()
    }

    fn insert_id(&mut self, table: Option<&str>, column: Option<&str>) -> Result<i64, DbError> {
        self.connection().insert_id(table, column)
    }

    fn affected_rows(&mut self) -> u64 {
        self.connection().affected_rows()
    }

    fn count_all(&mut self, table: &str) -> Result<i64, DbError> {
        self.connection().count_all(table)
    }

    fn list_tables(&mut self) -> Result<Vec<String>, DbError> {
        self.connection().list_tables(false)
    }

    fn list_fields(&mut self, table: &str) -> Result<Vec<String>, DbError> {
        self.connection().list_fields(table)
    }

    fn table_exists(&mut self, table: &str) -> Result<bool, DbError> {
        self.connection().table_exists(table)
    }

    fn field_exists(&mut self, field: &str, table: &str) -> Result<bool, DbError> {
        self.connection().field_exists(field, table)
    }

    fn forge(&mut self) -> Forge<'_> {
        Forge::new(self.connection())
    }

    fn utility(&mut self) -> Utility<'_> {
        Utility::new(self.connection())
    }
}

/// Adds the query builder on top of `Queryable`.
pub trait ActiveRecord: Queryable {
    fn builder(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::new(self.connection())
    }
}

impl Queryable for Connection {
    fn connection(&mut self) -> &mut Connection {
        self
    }
}
