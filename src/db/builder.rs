//! Active record query builder.
//!
//! A `QueryBuilder` borrows a connection and accumulates clauses. Every
//! clause method takes and returns the builder by value; every terminal
//! method (`get`, `insert`, `update`, `delete`, ...) consumes it. The
//! accumulated state therefore never outlives one statement, whether the
//! statement succeeded or not.
//!
//! # Example
//!
//! ```ignore
//! let rows = db
//!     .builder()
//!     .select("username")
//!     .from("user")
//!     .where_("uid", 1)
//!     .get()?;
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::connection::Connection;
use super::dialect::Dialect;
use super::result::ResultCursor;
use super::value::{DatabaseValue, Value};
use super::DbError;

/// Rows per statement for batch inserts and updates.
pub const BATCH_SIZE: usize = 100;

/// Comparison operator of a WHERE/HAVING predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
        }
    }

    /// Split a legacy `"column op"` key into column and operator.
    ///
    /// `"uid >"` and `"uid>"` both give `("uid", Gt)`; a bare column is
    /// `Eq`. `<>` is kept as its own spelling of `NotEq`.
    pub fn parse_key(key: &str) -> (String, Operator, &'static str) {
        const SUFFIXES: [(&str, Operator); 7] = [
            ("<=", Operator::LtEq),
            (">=", Operator::GtEq),
            ("<>", Operator::NotEq),
            ("!=", Operator::NotEq),
            ("=", Operator::Eq),
            ("<", Operator::Lt),
            (">", Operator::Gt),
        ];
        let key = key.trim();
        for (suffix, op) in SUFFIXES {
            if let Some(column) = key.strip_suffix(suffix) {
                return (column.trim().to_string(), op, suffix);
            }
        }
        (key.to_string(), Operator::Eq, "=")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeSide {
    /// `%value`
    Before,
    /// `value%`
    After,
    /// `%value%`
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Plain,
    Inner,
    Left,
    Right,
    Outer,
    LeftOuter,
    RightOuter,
}

impl JoinType {
    fn keyword(&self) -> &'static str {
        match self {
            JoinType::Plain => "JOIN",
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Outer => "OUTER JOIN",
            JoinType::LeftOuter => "LEFT OUTER JOIN",
            JoinType::RightOuter => "RIGHT OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chain {
    And,
    Or,
}

#[derive(Debug, Clone)]
enum Predicate {
    Compare {
        column: String,
        op: &'static str,
        value: Value,
    },
    Raw(String),
    In {
        column: String,
        values: Vec<Value>,
        not: bool,
    },
    Like {
        column: String,
        value: String,
        side: LikeSide,
        not: bool,
    },
}

#[derive(Debug, Clone, Default)]
struct QueryState {
    select: Vec<String>,
    distinct: bool,
    from: Vec<String>,
    /// Unaliased table names seen in FROM/JOIN, prefixed in dotted columns.
    tables: Vec<String>,
    joins: Vec<String>,
    wheres: Vec<(Chain, Predicate)>,
    group_by: Vec<String>,
    having: Vec<(Chain, Predicate)>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: u64,
    set: Vec<(String, String)>,
}

pub struct QueryBuilder<'c> {
    conn: &'c mut Connection,
    state: QueryState,
}

impl std::fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("group", &self.conn.group())
            .field("state", &self.state)
            .finish()
    }
}

fn join_condition_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([\w.]+)([\W\s]+)(.+)$").ok())
        .as_ref()
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl<'c> QueryBuilder<'c> {
    pub(crate) fn new(conn: &'c mut Connection) -> Self {
        Self {
            conn,
            state: QueryState::default(),
        }
    }

    // Identifier helpers

    /// Quote a column reference, prefixing the table part of
    /// `table.column` when it names a table already added with `from` or
    /// `join`.
    fn protect_column(&self, item: &str) -> String {
        let item = item.trim();
        let dialect = self.conn.dialect();
        if let Some((table, rest)) = item.split_once('.') {
            if !item.contains('(') && self.state.tables.iter().any(|t| t == table) {
                let prefixed = format!("{}.{}", self.conn.prefix_table(table), rest);
                return dialect.protect_identifiers(&prefixed);
            }
        }
        dialect.protect_identifiers(item)
    }

    /// Quote a table reference, with optional alias, and remember it.
    fn track_table(&mut self, item: &str) -> String {
        let item = item.trim();
        let (table, alias) = match item.rsplit_once(' ') {
            Some((table, alias)) if !table.trim().is_empty() => {
                let table = table.trim();
                let table = table
                    .strip_suffix(" AS")
                    .or_else(|| table.strip_suffix(" as"))
                    .unwrap_or(table)
                    .trim();
                (table, Some(alias.trim()))
            }
            _ => (item, None),
        };
        if alias.is_none() && !self.state.tables.iter().any(|t| t == table) {
            self.state.tables.push(table.to_string());
        }
        let protected = self.conn.protect_table(table);
        match alias {
            Some(alias) => format!(
                "{} {}",
                protected,
                self.conn.dialect().escape_identifier(alias)
            ),
            None => protected,
        }
    }

    fn target_table(&self, table: &str) -> Result<String, DbError> {
        if !table.trim().is_empty() {
            return Ok(self.conn.protect_table(table));
        }
        self.state.from.first().cloned().ok_or(DbError::MustSetTable)
    }

    // SELECT

    /// Comma-separated columns. Expressions such as `COUNT(*)` pass through.
    pub fn select(mut self, columns: &str) -> Self {
        let protected: Vec<String> = split_list(columns)
            .map(|c| self.protect_column(c))
            .collect();
        self.state.select.extend(protected);
        self
    }

    /// A select expression used exactly as written.
    pub fn select_raw(mut self, expr: &str) -> Self {
        self.state.select.push(expr.to_string());
        self
    }

    fn select_aggregate(mut self, function: &str, column: &str, alias: Option<&str>) -> Self {
        let column = column.trim();
        let alias = alias
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(column)
            .trim()
            .to_string();
        let dialect = self.conn.dialect();
        let expr = format!(
            "{}({}) AS {}",
            function,
            self.protect_column(column),
            dialect.escape_identifier(&alias)
        );
        self.state.select.push(expr);
        self
    }

    pub fn select_max(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate("MAX", column, alias)
    }

    pub fn select_min(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate("MIN", column, alias)
    }

    pub fn select_avg(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate("AVG", column, alias)
    }

    pub fn select_sum(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate("SUM", column, alias)
    }

    pub fn distinct(mut self) -> Self {
        self.state.distinct = true;
        self
    }

    /// Comma-separated tables, each optionally aliased (`user u`).
    pub fn from(mut self, tables: &str) -> Self {
        for table in split_list(tables) {
            let rendered = self.track_table(table);
            self.state.from.push(rendered);
        }
        self
    }

    pub fn join(self, table: &str, condition: &str) -> Self {
        self.join_with(table, condition, JoinType::Plain)
    }

    /// Join with an explicit type. Simple `a.x = b.y` conditions have both
    /// sides quoted; anything else is used as written.
    pub fn join_with(mut self, table: &str, condition: &str, kind: JoinType) -> Self {
        let table = self.track_table(table);
        let condition = match join_condition_regex().and_then(|re| re.captures(condition.trim())) {
            Some(caps) => format!(
                "{}{}{}",
                self.protect_column(&caps[1]),
                &caps[2],
                self.protect_column(&caps[3])
            ),
            None => condition.to_string(),
        };
        self.state
            .joins
            .push(format!("{} {} ON {}", kind.keyword(), table, condition));
        self
    }

    // WHERE

    fn push_where(mut self, chain: Chain, predicate: Predicate) -> Self {
        self.state.wheres.push((chain, predicate));
        self
    }

    fn compare(column: String, op: Operator, spelled: &'static str, value: Value) -> Predicate {
        let op = if op == Operator::NotEq { spelled } else { op.as_sql() };
        Predicate::Compare { column, op, value }
    }

    /// `where_("uid", 1)`, or the suffix form `where_("uid >", 1)`.
    /// A NULL value renders `IS NULL`.
    pub fn where_(self, key: &str, value: impl Into<Value>) -> Self {
        let (column, op, spelled) = Operator::parse_key(key);
        self.push_where(Chain::And, Self::compare(column, op, spelled, value.into()))
    }

    pub fn or_where(self, key: &str, value: impl Into<Value>) -> Self {
        let (column, op, spelled) = Operator::parse_key(key);
        self.push_where(Chain::Or, Self::compare(column, op, spelled, value.into()))
    }

    pub fn where_op(self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        let predicate = Self::compare(column.trim().to_string(), op, op.as_sql(), value.into());
        self.push_where(Chain::And, predicate)
    }

    pub fn or_where_op(self, column: &str, op: Operator, value: impl Into<Value>) -> Self {
        let predicate = Self::compare(column.trim().to_string(), op, op.as_sql(), value.into());
        self.push_where(Chain::Or, predicate)
    }

    /// A predicate used exactly as written.
    pub fn where_raw(self, sql: &str) -> Self {
        self.push_where(Chain::And, Predicate::Raw(sql.to_string()))
    }

    pub fn or_where_raw(self, sql: &str) -> Self {
        self.push_where(Chain::Or, Predicate::Raw(sql.to_string()))
    }

    fn push_in<I, V>(self, chain: Chain, column: &str, values: I, not: bool) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self;
        }
        let predicate = Predicate::In {
            column: column.trim().to_string(),
            values,
            not,
        };
        self.push_where(chain, predicate)
    }

    /// An empty list adds no predicate.
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(Chain::And, column, values, false)
    }

    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(Chain::Or, column, values, false)
    }

    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(Chain::And, column, values, true)
    }

    pub fn or_where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_in(Chain::Or, column, values, true)
    }

    fn push_like(self, chain: Chain, column: &str, value: &str, side: LikeSide, not: bool) -> Self {
        let predicate = Predicate::Like {
            column: column.trim().to_string(),
            value: value.to_string(),
            side,
            not,
        };
        self.push_where(chain, predicate)
    }

    pub fn like(self, column: &str, value: &str, side: LikeSide) -> Self {
        self.push_like(Chain::And, column, value, side, false)
    }

    pub fn or_like(self, column: &str, value: &str, side: LikeSide) -> Self {
        self.push_like(Chain::Or, column, value, side, false)
    }

    pub fn not_like(self, column: &str, value: &str, side: LikeSide) -> Self {
        self.push_like(Chain::And, column, value, side, true)
    }

    pub fn or_not_like(self, column: &str, value: &str, side: LikeSide) -> Self {
        self.push_like(Chain::Or, column, value, side, true)
    }

    // GROUP BY / HAVING / ORDER BY / LIMIT

    pub fn group_by(mut self, columns: &str) -> Self {
        let protected: Vec<String> = split_list(columns)
            .map(|c| self.protect_column(c))
            .collect();
        self.state.group_by.extend(protected);
        self
    }

    pub fn having(mut self, key: &str, value: impl Into<Value>) -> Self {
        let (column, op, spelled) = Operator::parse_key(key);
        self.state
            .having
            .push((Chain::And, Self::compare(column, op, spelled, value.into())));
        self
    }

    pub fn or_having(mut self, key: &str, value: impl Into<Value>) -> Self {
        let (column, op, spelled) = Operator::parse_key(key);
        self.state
            .having
            .push((Chain::Or, Self::compare(column, op, spelled, value.into())));
        self
    }

    pub fn having_raw(mut self, sql: &str) -> Self {
        self.state.having.push((Chain::And, Predicate::Raw(sql.to_string())));
        self
    }

    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        let dialect = self.conn.dialect();
        let clause = match direction {
            OrderDirection::Random => dialect.random_keyword().to_string(),
            OrderDirection::Asc => format!("{} ASC", self.protect_column(column)),
            OrderDirection::Desc => format!("{} DESC", self.protect_column(column)),
        };
        self.state.order_by.push(clause);
        self
    }

    /// LIMIT `rows`; OFFSET is only rendered when `offset > 0`.
    pub fn limit(mut self, rows: u64, offset: u64) -> Self {
        self.state.limit = Some(rows);
        self.state.offset = offset;
        self
    }

    /// Only takes effect together with a limit.
    pub fn offset(mut self, offset: u64) -> Self {
        self.state.offset = offset;
        self
    }

    // SET

    /// Value for the next insert/update, escaped.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let rendered = self.conn.escape(&value.into());
        self.push_set(column, rendered);
        self
    }

    /// Value for the next insert/update, used as written (`count + 1`).
    pub fn set_raw(mut self, column: &str, sql: &str) -> Self {
        self.push_set(column, sql.to_string());
        self
    }

    pub fn set_many<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (column, value) in values {
            let rendered = self.conn.escape(&value.into());
            self.push_set(column.as_ref(), rendered);
        }
        self
    }

    fn push_set(&mut self, column: &str, rendered: String) {
        let column = self.conn.dialect().protect_identifiers(column);
        match self.state.set.iter_mut().find(|(k, _)| *k == column) {
            Some(slot) => slot.1 = rendered,
            None => self.state.set.push((column, rendered)),
        }
    }

    // Compilation

    fn render_predicate(&self, predicate: &Predicate) -> String {
        let dialect = self.conn.dialect();
        match predicate {
            Predicate::Raw(sql) => sql.clone(),
            Predicate::Compare { column, op, value } => {
                let column = self.protect_column(column);
                match (value, *op) {
                    (Value::Null, "=") => format!("{} IS NULL", column),
                    (Value::Null, "!=") | (Value::Null, "<>") => format!("{} IS NOT NULL", column),
                    _ => format!("{} {} {}", column, op, dialect.escape_value(value)),
                }
            }
            Predicate::In { column, values, not } => {
                let list = values
                    .iter()
                    .map(|v| dialect.escape_value(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                let keyword = if *not { "NOT IN" } else { "IN" };
                format!("{} {} ({})", self.protect_column(column), keyword, list)
            }
            Predicate::Like {
                column,
                value,
                side,
                not,
            } => {
                let escaped = dialect.escape_str(value, true);
                let pattern = match side {
                    LikeSide::Before => format!("%{}", escaped),
                    LikeSide::After => format!("{}%", escaped),
                    LikeSide::Both => format!("%{}%", escaped),
                };
                let keyword = if *not { "NOT LIKE" } else { "LIKE" };
                format!(
                    "{} {} '{}'{}",
                    self.protect_column(column),
                    keyword,
                    pattern,
                    dialect.like_escape_suffix()
                )
            }
        }
    }

    fn render_predicates(&self, predicates: &[(Chain, Predicate)]) -> String {
        let mut sql = String::new();
        for (idx, (chain, predicate)) in predicates.iter().enumerate() {
            if idx > 0 {
                sql.push_str(match chain {
                    Chain::And => " AND ",
                    Chain::Or => " OR ",
                });
            }
            sql.push_str(&self.render_predicate(predicate));
        }
        sql
    }

    fn where_sql(&self) -> String {
        self.render_predicates(&self.state.wheres)
    }

    fn select_sql(&self, select_override: Option<&str>) -> String {
        let mut sql = String::from(if self.state.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        });

        match select_override {
            Some(expr) => sql.push_str(expr),
            None if self.state.select.is_empty() => sql.push('*'),
            None => sql.push_str(&self.state.select.join(", ")),
        }

        if !self.state.from.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&self.state.from.join(", "));
        }
        for join in &self.state.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.state.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_sql());
        }
        if !self.state.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.state.group_by.join(", "));
        }
        if !self.state.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.render_predicates(&self.state.having));
        }
        if select_override.is_none() && !self.state.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.state.order_by.join(", "));
        }
        match self.state.limit {
            Some(limit) if select_override.is_none() => {
                self.conn
                    .dialect()
                    .limit_clause(&sql, limit, self.state.offset)
            }
            _ => sql,
        }
    }

    /// The SELECT this builder would run.
    pub fn compile_select(&self) -> String {
        self.select_sql(None)
    }

    pub fn compile_insert(&self, table: &str) -> Result<String, DbError> {
        let table = self.target_table(table)?;
        if self.state.set.is_empty() {
            return Err(DbError::MustUseSet);
        }
        let (keys, values): (Vec<String>, Vec<String>) = self.state.set.iter().cloned().unzip();
        Ok(self.conn.dialect().insert_sql(&table, &keys, &values))
    }

    pub fn compile_update(&self, table: &str) -> Result<String, DbError> {
        let table = self.target_table(table)?;
        if self.state.set.is_empty() {
            return Err(DbError::MustUseSet);
        }
        Ok(self
            .conn
            .dialect()
            .update_sql(&table, &self.state.set, &self.where_sql()))
    }

    pub fn compile_delete(&self, table: &str) -> Result<String, DbError> {
        let table = self.target_table(table)?;
        if self.state.wheres.is_empty() {
            return Err(DbError::DeleteWithoutWhere);
        }
        Ok(self.conn.dialect().delete_sql(&table, &self.where_sql()))
    }

    // Terminals

    /// Run the accumulated SELECT.
    pub fn get(self) -> Result<ResultCursor, DbError> {
        let sql = self.compile_select();
        self.conn.query(&sql)
    }

    /// SELECT from `table` with equality conditions, optionally limited.
    pub fn get_where<I, K, V>(
        self,
        table: &str,
        conditions: I,
        limit: Option<(u64, u64)>,
    ) -> Result<ResultCursor, DbError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut builder = self.from(table);
        for (key, value) in conditions {
            builder = builder.where_(key.as_ref(), value);
        }
        if let Some((rows, offset)) = limit {
            builder = builder.limit(rows, offset);
        }
        builder.get()
    }

    /// Row count of the accumulated SELECT, ignoring ORDER BY and LIMIT.
    pub fn count_all_results(self) -> Result<i64, DbError> {
        let sql = self.select_sql(Some("COUNT(*) AS numrows"));
        let cursor = self.conn.query(&sql)?;
        Ok(cursor
            .row_array(0)
            .and_then(|row| row.get("numrows"))
            .map(|v| v.as_i64_or(0))
            .unwrap_or(0))
    }

    /// INSERT the pending `set` values.
    pub fn insert(self, table: &str) -> Result<u64, DbError> {
        let sql = self.compile_insert(table)?;
        self.conn.execute(&sql)
    }

    /// REPLACE the pending `set` values, where the engine supports it.
    pub fn replace(self, table: &str) -> Result<u64, DbError> {
        let table = self.target_table(table)?;
        if self.state.set.is_empty() {
            return Err(DbError::MustUseSet);
        }
        let (keys, values): (Vec<String>, Vec<String>) = self.state.set.iter().cloned().unzip();
        let dialect = self.conn.dialect();
        let sql = dialect
            .replace_sql(&table, &keys, &values)
            .ok_or(DbError::Unsupported {
                platform: dialect.platform(),
                feature: "replace",
            })?;
        self.conn.execute(&sql)
    }

    /// INSERT many rows, `BATCH_SIZE` per statement. Every row must have
    /// the same columns.
    pub fn insert_batch(self, table: &str, rows: &[BTreeMap<String, Value>]) -> Result<u64, DbError> {
        let table = self.target_table(table)?;
        let Some(first) = rows.first() else {
            return Err(DbError::MustUseSet);
        };
        let columns: Vec<&String> = first.keys().collect();
        if rows.iter().any(|r| r.keys().ne(columns.iter().copied())) {
            return Err(DbError::BatchKeysMismatch);
        }

        let dialect = self.conn.dialect();
        let keys: Vec<String> = columns
            .iter()
            .map(|c| dialect.protect_identifiers(c))
            .collect();

        let mut affected = 0;
        for chunk in rows.chunks(BATCH_SIZE) {
            let groups: Vec<String> = chunk
                .iter()
                .map(|row| {
                    let values = row
                        .values()
                        .map(|v| dialect.escape_value(v))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({})", values)
                })
                .collect();
            let sql = dialect.insert_batch_sql(&table, &keys, &groups);
            affected += self.conn.execute(&sql)?;
        }
        Ok(affected)
    }

    /// UPDATE with the pending `set` values and WHERE clause.
    pub fn update(self, table: &str) -> Result<u64, DbError> {
        let sql = self.compile_update(table)?;
        self.conn.execute(&sql)
    }

    /// UPDATE many rows matched on `index`, `BATCH_SIZE` per statement.
    pub fn update_batch(
        self,
        table: &str,
        rows: &[BTreeMap<String, Value>],
        index: &str,
    ) -> Result<u64, DbError> {
        let table = self.target_table(table)?;
        if index.trim().is_empty() {
            return Err(DbError::MustUseIndex);
        }
        if rows.is_empty() {
            return Err(DbError::MustUseSet);
        }
        if rows.iter().any(|r| !r.contains_key(index)) {
            return Err(DbError::BatchMissingIndex(index.to_string()));
        }

        let dialect = self.conn.dialect();
        let index_sql = dialect.protect_identifiers(index);
        let where_sql = self.where_sql();

        let mut affected = 0;
        for chunk in rows.chunks(BATCH_SIZE) {
            let rendered: Vec<Vec<(String, String)>> = chunk
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|(k, v)| (dialect.protect_identifiers(k), dialect.escape_value(v)))
                        .collect()
                })
                .collect();
            let sql = dialect.update_batch_sql(&table, &rendered, &index_sql, &where_sql);
            affected += self.conn.execute(&sql)?;
        }
        Ok(affected)
    }

    /// DELETE matching rows. Refuses to run without a WHERE or LIKE.
    pub fn delete(self, table: &str) -> Result<u64, DbError> {
        let sql = self.compile_delete(table)?;
        self.conn.execute(&sql)
    }

    /// DELETE every row.
    pub fn empty_table(self, table: &str) -> Result<u64, DbError> {
        let table = self.target_table(table)?;
        let sql = self.conn.dialect().delete_sql(&table, "");
        self.conn.execute(&sql)
    }

    pub fn truncate(self, table: &str) -> Result<u64, DbError> {
        let table = self.target_table(table)?;
        let sql = self.conn.dialect().truncate_sql(&table);
        self.conn.execute(&sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::config::ConnectionParams;
    use crate::test_utils::RecordingDriver;
    use rstest::rstest;

    fn connection(driver: &RecordingDriver) -> Connection {
        Connection::from_driver(
            "default",
            Box::new(driver.clone()),
            ConnectionParams::sqlite_memory(),
        )
    }

    fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_simple_select() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn)
            .select("username")
            .from("user")
            .where_("uid", 1)
            .compile_select();
        assert_eq!(sql, r#"SELECT "username" FROM "user" WHERE "uid" = 1"#);
    }

    #[test]
    fn test_select_star_without_columns() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn).from("user").compile_select();
        assert_eq!(sql, r#"SELECT * FROM "user""#);
    }

    #[rstest]
    #[case("uid>", r#""uid" > 5"#)]
    #[case("uid >=", r#""uid" >= 5"#)]
    #[case("uid <=", r#""uid" <= 5"#)]
    #[case("uid <", r#""uid" < 5"#)]
    #[case("uid !=", r#""uid" != 5"#)]
    #[case("uid <>", r#""uid" <> 5"#)]
    #[case("uid", r#""uid" = 5"#)]
    fn test_legacy_suffix_operators(#[case] key: &str, #[case] expected: &str) {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn)
            .from("t")
            .where_(key, 5)
            .compile_select();
        assert_eq!(sql, format!(r#"SELECT * FROM "t" WHERE {}"#, expected));
    }

    #[test]
    fn test_explicit_operator_and_null() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn)
            .from("t")
            .where_op("age", Operator::GtEq, 18)
            .where_("deleted_at", Value::Null)
            .or_where("name !=", Value::Null)
            .compile_select();
        assert_eq!(
            sql,
            r#"SELECT * FROM "t" WHERE "age" >= 18 AND "deleted_at" IS NULL OR "name" IS NOT NULL"#
        );
    }

    #[test]
    fn test_where_in_and_empty_list() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn)
            .from("t")
            .where_in("id", [1, 2, 3])
            .where_not_in("name", Vec::<&str>::new())
            .or_where_not_in("name", ["a'b"])
            .compile_select();
        assert_eq!(
            sql,
            r#"SELECT * FROM "t" WHERE "id" IN (1, 2, 3) OR "name" NOT IN ('a''b')"#
        );
    }

    #[rstest]
    #[case(LikeSide::Before, "'%abc'")]
    #[case(LikeSide::After, "'abc%'")]
    #[case(LikeSide::Both, "'%abc%'")]
    fn test_like_sides(#[case] side: LikeSide, #[case] pattern: &str) {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn)
            .from("t")
            .like("title", "abc", side)
            .compile_select();
        assert_eq!(
            sql,
            format!(r#"SELECT * FROM "t" WHERE "title" LIKE {} ESCAPE '!'"#, pattern)
        );
    }

    #[test]
    fn test_like_escapes_wildcards_once() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn)
            .from("t")
            .not_like("title", "50%_off!", LikeSide::After)
            .compile_select();
        assert_eq!(
            sql,
            r#"SELECT * FROM "t" WHERE "title" NOT LIKE '50!%!_off!!%' ESCAPE '!'"#
        );
    }

    #[test]
    fn test_full_select_clause_order() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn)
            .distinct()
            .select("u.name")
            .select_max("p.score", Some("best"))
            .from("user u")
            .join_with("post p", "p.uid = u.uid", JoinType::Left)
            .where_("u.active", true)
            .group_by("u.name")
            .having("best >", 10)
            .order_by("best", OrderDirection::Desc)
            .limit(10, 20)
            .compile_select();
        assert_eq!(
            sql,
            concat!(
                r#"SELECT DISTINCT "u"."name", MAX("p"."score") AS "best" FROM "user" "u" "#,
                r#"LEFT JOIN "post" "p" ON "p"."uid" = "u"."uid" WHERE "u"."active" = 1 "#,
                r#"GROUP BY "u"."name" HAVING "best" > 10 ORDER BY "best" DESC LIMIT 10 OFFSET 20"#
            )
        );
    }

    #[test]
    fn test_limit_without_offset() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn)
            .from("t")
            .limit(5, 0)
            .compile_select();
        assert_eq!(sql, r#"SELECT * FROM "t" LIMIT 5"#);
    }

    #[test]
    fn test_random_order() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let sql = QueryBuilder::new(&mut conn)
            .from("t")
            .order_by("", OrderDirection::Random)
            .compile_select();
        assert_eq!(sql, r#"SELECT * FROM "t" ORDER BY RANDOM()"#);
    }

    #[test]
    fn test_prefix_applied_to_tables_and_dotted_columns() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        conn.set_dbprefix("ci_");
        let sql = QueryBuilder::new(&mut conn)
            .from("user")
            .select("user.name")
            .join("post", "post.uid = user.uid")
            .compile_select();
        assert_eq!(
            sql,
            r#"SELECT "ci_user"."name" FROM "ci_user" JOIN "ci_post" ON "ci_post"."uid" = "ci_user"."uid""#
        );
    }

    #[test]
    fn test_insert_and_update_statements() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        QueryBuilder::new(&mut conn)
            .set("name", "zhj")
            .set("uid", 1)
            .insert("user")
            .unwrap();
        QueryBuilder::new(&mut conn)
            .set("name", "o'neil")
            .set_raw("visits", "visits + 1")
            .where_("uid", 1)
            .update("user")
            .unwrap();
        assert_eq!(
            driver.statements(),
            vec![
                r#"INSERT INTO "user" ("name", "uid") VALUES ('zhj', 1)"#,
                r#"UPDATE "user" SET "name" = 'o''neil', "visits" = visits + 1 WHERE "uid" = 1"#,
            ]
        );
    }

    #[test]
    fn test_update_requires_set() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let err = QueryBuilder::new(&mut conn)
            .where_("uid", 1)
            .update("user")
            .unwrap_err();
        assert_eq!(err.message_key(), "db_must_use_set");
        assert!(driver.statements().is_empty());
    }

    #[test]
    fn test_delete_without_where_is_refused() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let err = QueryBuilder::new(&mut conn).delete("user").unwrap_err();
        assert!(matches!(err, DbError::DeleteWithoutWhere));
        assert!(driver.statements().is_empty());

        QueryBuilder::new(&mut conn)
            .like("name", "tmp", LikeSide::After)
            .delete("user")
            .unwrap();
        assert_eq!(driver.statements().len(), 1);
    }

    #[test]
    fn test_missing_table() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let err = QueryBuilder::new(&mut conn)
            .set("a", 1)
            .insert("")
            .unwrap_err();
        assert_eq!(err.message_key(), "db_must_set_table");
    }

    #[test]
    fn test_state_does_not_leak_between_statements() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let _ = QueryBuilder::new(&mut conn)
            .from("a")
            .where_("x", 1)
            .delete("");
        let sql = QueryBuilder::new(&mut conn).from("b").compile_select();
        assert_eq!(sql, r#"SELECT * FROM "b""#);
    }

    #[test]
    fn test_insert_batch_is_chunked() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let rows: Vec<_> = (0..250)
            .map(|i| row(&[("id", Value::Int(i)), ("name", Value::Text(format!("n{}", i)))]))
            .collect();
        QueryBuilder::new(&mut conn)
            .insert_batch("t", &rows)
            .unwrap();
        let statements = driver.statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with(r#"INSERT INTO "t" ("id", "name") VALUES (0, 'n0'), (1, 'n1')"#));
        assert!(statements[2].ends_with("(249, 'n249')"));
    }

    #[test]
    fn test_insert_batch_rejects_uneven_rows() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let rows = vec![row(&[("a", Value::Int(1))]), row(&[("b", Value::Int(2))])];
        let err = QueryBuilder::new(&mut conn)
            .insert_batch("t", &rows)
            .unwrap_err();
        assert!(matches!(err, DbError::BatchKeysMismatch));
    }

    #[test]
    fn test_update_batch() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let rows = vec![
            row(&[("id", Value::Int(1)), ("name", "a".into())]),
            row(&[("id", Value::Int(2)), ("name", "b".into())]),
        ];
        QueryBuilder::new(&mut conn)
            .update_batch("t", &rows, "id")
            .unwrap();
        assert_eq!(
            driver.statements(),
            vec![concat!(
                r#"UPDATE "t" SET "name" = CASE WHEN "id" = 1 THEN 'a' WHEN "id" = 2 THEN 'b' "#,
                r#"ELSE "name" END WHERE "id" IN (1, 2)"#
            )]
        );
    }

    #[test]
    fn test_update_batch_errors() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        let rows = vec![row(&[("name", "a".into())])];
        let err = QueryBuilder::new(&mut conn)
            .update_batch("t", &rows, "")
            .unwrap_err();
        assert!(matches!(err, DbError::MustUseIndex));
        let err = QueryBuilder::new(&mut conn)
            .update_batch("t", &rows, "id")
            .unwrap_err();
        assert!(matches!(err, DbError::BatchMissingIndex(ref i) if i == "id"));
    }

    #[test]
    fn test_replace_unsupported_on_postgres() {
        let driver = RecordingDriver::postgres();
        let mut conn = connection(&driver);
        let err = QueryBuilder::new(&mut conn)
            .set("a", 1)
            .replace("t")
            .unwrap_err();
        assert_eq!(err.message_key(), "db_unsupported_feature");
    }

    #[test]
    fn test_count_all_results() {
        let driver = RecordingDriver::sqlite();
        driver.respond("SELECT COUNT", &["numrows"], vec![vec![Value::Int(42)]]);
        let mut conn = connection(&driver);
        let count = QueryBuilder::new(&mut conn)
            .from("t")
            .where_("a", 1)
            .order_by("a", OrderDirection::Asc)
            .limit(1, 0)
            .count_all_results()
            .unwrap();
        assert_eq!(count, 42);
        assert_eq!(
            driver.statements(),
            vec![r#"SELECT COUNT(*) AS numrows FROM "t" WHERE "a" = 1"#]
        );
    }

    #[test]
    fn test_truncate_and_empty_table() {
        let driver = RecordingDriver::sqlite();
        let mut conn = connection(&driver);
        QueryBuilder::new(&mut conn).empty_table("t").unwrap();
        QueryBuilder::new(&mut conn).truncate("t").unwrap();
        assert_eq!(driver.statements(), vec![r#"DELETE FROM "t""#, r#"DELETE FROM "t""#]);
    }
}
