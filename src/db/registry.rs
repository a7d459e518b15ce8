//! Named connection groups with lazily created pools.
//!
//! The registry is shared across request handlers. Each group gets a pool
//! on first use; a checkout either reuses an idle connection, opens a new
//! one while the pool is below its size, or waits for a return until the
//! checkout timeout. Returning happens when the handle is dropped.
//!
//! `connection` hands out a `PooledConnection` (raw queries only);
//! `active_record` hands out an `ActiveRecordConnection`, which adds the
//! query builder and is refused for groups with `active_record: false`.

use std::collections::{BTreeMap, HashMap};
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::config::{ConnectionParams, DatabaseConfig};
use super::connection::{ActiveRecord, Connection, Queryable};
use super::driver::DriverKind;
use super::DbError;
use crate::config::ConfigError;

const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn pool_size(params: &ConnectionParams) -> usize {
    let in_memory = matches!(DriverKind::from_name(&params.dbdriver), Ok(DriverKind::Sqlite))
        && matches!(params.database.as_str(), "" | ":memory:");
    if in_memory {
        // Every in-memory connection is its own database.
        return 1;
    }
    params.pool_size.unwrap_or(DEFAULT_POOL_SIZE).max(1)
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Connection>,
    open: usize,
    closed: bool,
}

struct Pool {
    group: String,
    params: ConnectionParams,
    size: usize,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl Pool {
    fn new(group: &str, params: ConnectionParams) -> Self {
        let size = pool_size(&params);
        Self {
            group: group.to_string(),
            params,
            size,
            state: Mutex::new(PoolState::default()),
            returned: Condvar::new(),
        }
    }

    fn checkout(&self, timeout: Duration) -> Result<Connection, DbError> {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.state);
        loop {
            if let Some(mut conn) = state.idle.pop() {
                drop(state);
                return match conn.reconnect() {
                    Ok(()) => Ok(conn),
                    Err(e) => {
                        self.release_slot();
                        Err(e)
                    }
                };
            }
            if state.open < self.size {
                state.open += 1;
                drop(state);
                return Connection::open(&self.group, self.params.clone())
                    .inspect_err(|_| self.release_slot());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DbError::PoolTimeout(self.group.clone()));
            }
            state = self
                .returned
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Forget a connection that failed to open or reconnect.
    fn release_slot(&self) {
        let mut state = lock(&self.state);
        state.open = state.open.saturating_sub(1);
        drop(state);
        self.returned.notify_one();
    }

    fn checkin(&self, mut conn: Connection) {
        let mut state = lock(&self.state);
        if state.closed || !self.params.pconnect || conn.trans_depth() > 0 {
            state.open = state.open.saturating_sub(1);
            drop(state);
            conn.close();
        } else {
            state.idle.push(conn);
        }
        self.returned.notify_one();
    }

    fn close(&self) {
        let idle = {
            let mut state = lock(&self.state);
            state.closed = true;
            state.open = state.open.saturating_sub(state.idle.len());
            std::mem::take(&mut state.idle)
        };
        for mut conn in idle {
            conn.close();
        }
        self.returned.notify_all();
    }
}

/// A connection checked out of a group pool. Returned on drop.
pub struct PooledConnection {
    conn: ManuallyDrop<Connection>,
    pool: Arc<Pool>,
}

impl PooledConnection {
    fn new(conn: Connection, pool: Arc<Pool>) -> Self {
        Self {
            conn: ManuallyDrop::new(conn),
            pool,
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledConnection").field(&*self.conn).finish()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // SAFETY: `conn` is never used again after this point.
        let conn = unsafe { ManuallyDrop::take(&mut self.conn) };
        self.pool.checkin(conn);
    }
}

impl Queryable for PooledConnection {
    fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// A pooled connection from a group with active record enabled.
#[derive(Debug)]
pub struct ActiveRecordConnection(PooledConnection);

impl Deref for ActiveRecordConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.0
    }
}

impl DerefMut for ActiveRecordConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.0
    }
}

impl Queryable for ActiveRecordConnection {
    fn connection(&mut self) -> &mut Connection {
        self.0.connection()
    }
}

impl ActiveRecord for ActiveRecordConnection {}

pub struct ConnectionRegistry {
    active_group: String,
    groups: Mutex<BTreeMap<String, ConnectionParams>>,
    pools: Mutex<HashMap<String, Arc<Pool>>>,
    checkout_timeout: Duration,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("active_group", &self.active_group)
            .field("groups", &self.groups())
            .finish()
    }
}

impl ConnectionRegistry {
    /// Validate every group's driver and build the registry. No connection
    /// is opened until a group is first used.
    pub fn new(config: DatabaseConfig) -> Result<Self, DbError> {
        for params in config.groups.values() {
            DriverKind::from_name(&params.dbdriver)?;
        }
        if !config.groups.contains_key(&config.active_group) {
            return Err(ConfigError::MissingGroup(config.active_group).into());
        }
        Ok(Self {
            active_group: config.active_group,
            groups: Mutex::new(config.groups),
            pools: Mutex::new(HashMap::new()),
            checkout_timeout: DEFAULT_CHECKOUT_TIMEOUT,
        })
    }

    /// A registry with one `default` group from a DSN.
    pub fn from_dsn(dsn: &str) -> Result<Self, DbError> {
        Self::new(DatabaseConfig::from_dsn(dsn)?)
    }

    pub fn with_checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    pub fn active_group(&self) -> &str {
        &self.active_group
    }

    pub fn groups(&self) -> Vec<String> {
        lock(&self.groups).keys().cloned().collect()
    }

    pub fn params(&self, group: &str) -> Result<ConnectionParams, DbError> {
        lock(&self.groups)
            .get(group)
            .cloned()
            .ok_or_else(|| ConfigError::MissingGroup(group.to_string()).into())
    }

    /// Add or replace a group. An existing pool for it is closed.
    pub fn add_group(&self, name: &str, params: ConnectionParams) -> Result<(), DbError> {
        DriverKind::from_name(&params.dbdriver)?;
        lock(&self.groups).insert(name.to_string(), params);
        self.close(name);
        Ok(())
    }

    pub fn register_dsn(&self, name: &str, dsn: &str) -> Result<(), DbError> {
        self.add_group(name, ConnectionParams::from_dsn(dsn)?)
    }

    fn pool(&self, group: &str) -> Result<Arc<Pool>, DbError> {
        let mut pools = lock(&self.pools);
        if let Some(pool) = pools.get(group) {
            return Ok(Arc::clone(pool));
        }
        let params = self.params(group)?;
        debug!(category = "db", group, driver = %params.dbdriver, "creating connection pool");
        let pool = Arc::new(Pool::new(group, params));
        pools.insert(group.to_string(), Arc::clone(&pool));
        Ok(pool)
    }

    /// Check out a connection from `group`.
    pub fn connection(&self, group: &str) -> Result<PooledConnection, DbError> {
        let pool = self.pool(group)?;
        let conn = pool.checkout(self.checkout_timeout)?;
        Ok(PooledConnection::new(conn, pool))
    }

    pub fn default_connection(&self) -> Result<PooledConnection, DbError> {
        self.connection(&self.active_group)
    }

    /// Check out a connection with the query builder.
    pub fn active_record(&self, group: &str) -> Result<ActiveRecordConnection, DbError> {
        if !self.params(group)?.active_record {
            return Err(DbError::ActiveRecordDisabled(group.to_string()));
        }
        Ok(ActiveRecordConnection(self.connection(group)?))
    }

    pub fn default_active_record(&self) -> Result<ActiveRecordConnection, DbError> {
        self.active_record(&self.active_group)
    }

    /// Close a group's pool. Checked-out connections close when returned.
    pub fn close(&self, group: &str) {
        if let Some(pool) = lock(&self.pools).remove(group) {
            info!(category = "db", group, "closing connection pool");
            pool.close();
        }
    }

    pub fn close_all(&self) {
        let pools: Vec<Arc<Pool>> = lock(&self.pools).drain().map(|(_, p)| p).collect();
        for pool in pools {
            pool.close();
        }
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::Value;
    use crate::test_utils::RecordingDriver;

    fn sqlite_registry() -> ConnectionRegistry {
        ConnectionRegistry::new(DatabaseConfig::single(ConnectionParams::sqlite_memory())).unwrap()
    }

    #[test]
    fn test_unknown_driver_fails_at_construction() {
        let config = DatabaseConfig::single(ConnectionParams::new("oracle"));
        let err = ConnectionRegistry::new(config).unwrap_err();
        assert_eq!(err.message_key(), "db_invalid_driver");
    }

    #[test]
    fn test_missing_group() {
        let registry = sqlite_registry();
        let err = registry.connection("reports").unwrap_err();
        assert_eq!(err.message_key(), "db_invalid_group");
    }

    #[test]
    fn test_connection_is_reused_after_return() {
        let registry = sqlite_registry();
        {
            let mut conn = registry.default_connection().unwrap();
            conn.execute("CREATE TABLE t (a INTEGER)").unwrap();
            conn.execute("INSERT INTO t VALUES (1)").unwrap();
        }
        // Same in-memory database, so the table is still there.
        let mut conn = registry.default_connection().unwrap();
        let cursor = conn.query("SELECT a FROM t").unwrap();
        assert_eq!(cursor.row_array(0).and_then(|r| r.get("a")), Some(&Value::Int(1)));
    }

    #[test]
    fn test_checkout_times_out_when_pool_is_exhausted() {
        let registry = sqlite_registry().with_checkout_timeout(Duration::from_millis(20));
        let _held = registry.default_connection().unwrap();
        let err = registry.default_connection().unwrap_err();
        assert!(matches!(err, DbError::PoolTimeout(ref g) if g == "default"));
    }

    #[test]
    fn test_active_record_disabled() {
        let registry = sqlite_registry();
        let mut params = ConnectionParams::sqlite_memory();
        params.active_record = false;
        registry.add_group("raw", params).unwrap();

        let err = registry.active_record("raw").unwrap_err();
        assert_eq!(err.message_key(), "db_active_record_disabled");
        assert!(registry.connection("raw").is_ok());
    }

    #[test]
    fn test_register_dsn_validates_driver() {
        let registry = sqlite_registry();
        let err = registry.register_dsn("x", "oracle://u:p@h/db").unwrap_err();
        assert_eq!(err.message_key(), "db_invalid_driver");
        registry.register_dsn("mem", "sqlite::memory:").unwrap();
        assert_eq!(registry.groups(), vec!["default", "mem"]);
    }

    #[test]
    fn test_close_drops_idle_connections() {
        let registry = sqlite_registry();
        {
            let mut conn = registry.default_connection().unwrap();
            conn.execute("CREATE TABLE t (a INTEGER)").unwrap();
        }
        registry.close("default");
        // A fresh pool opens a fresh in-memory database.
        let mut conn = registry.default_connection().unwrap();
        assert!(conn.query("SELECT a FROM t").is_err());
    }

    fn idle_recording(pool: &Pool, driver: &RecordingDriver) {
        let conn = Connection::from_driver(&pool.group, Box::new(driver.clone()), pool.params.clone());
        let mut state = lock(&pool.state);
        state.open += 1;
        state.idle.push(conn);
    }

    #[test]
    fn test_failed_reconnect_frees_the_slot() {
        let mut params = ConnectionParams::new("postgre");
        params.pool_size = Some(1);
        let pool = Pool::new("default", params);

        let broken = RecordingDriver::postgres();
        broken.fail_reconnect();
        idle_recording(&pool, &broken);

        let err = pool.checkout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.message_key(), "db_unable_to_connect");
        assert_eq!(lock(&pool.state).open, 0);
        assert!(lock(&pool.state).idle.is_empty());

        // The slot is usable again rather than ending in a pool timeout.
        idle_recording(&pool, &RecordingDriver::postgres());
        let conn = pool.checkout(Duration::from_millis(20)).unwrap();
        assert_eq!(conn.platform(), "postgre");
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(pool_size(&ConnectionParams::sqlite_memory()), 1);
        let mut params = ConnectionParams::new("postgre");
        assert_eq!(pool_size(&params), DEFAULT_POOL_SIZE);
        params.pool_size = Some(0);
        assert_eq!(pool_size(&params), 1);
    }
}
