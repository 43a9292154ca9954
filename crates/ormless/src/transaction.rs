//! Retrying transactions.
//!
//! [`transaction`] runs a callback inside `START TRANSACTION ISOLATION LEVEL ...`
//! on one connection. Serialization failures and deadlocks roll back and run the
//! callback again after a random delay, up to a configured number of attempts;
//! every other error rolls back and is returned as-is.
//!
//! The callback may run more than once, so it must not have side effects
//! outside the database.
//!
//! # Example
//!
//! ```ignore
//! use ormless::{Isolation, transaction, select_one, update, Filter, SelectOptions, record};
//!
//! let balance = transaction(&pool, Isolation::Serializable, async |conn| {
//!     let account = select_one("accounts", record! { "id" => 1_i32 }, SelectOptions::new())
//!         .run(conn)
//!         .await?;
//!     let balance = account["balance"].as_i64().unwrap_or(0) - 100;
//!     update("accounts", record! { "balance" => balance }, record! { "id" => 1_i32 })
//!         .run(conn)
//!         .await?;
//!     Ok(balance)
//! })
//! .await?;
//! ```

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use rand::Rng;
use std::marker::PhantomData;
use std::ops::Deref;
use std::time::Duration;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

/// Transaction isolation level and access mode.
///
/// These are the only meaningful combinations in Postgres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    Serializable,
    RepeatableRead,
    ReadCommitted,
    SerializableReadOnly,
    RepeatableReadReadOnly,
    ReadCommittedReadOnly,
    SerializableReadOnlyDeferrable,
}

impl Isolation {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Isolation::Serializable => "SERIALIZABLE",
            Isolation::RepeatableRead => "REPEATABLE READ",
            Isolation::ReadCommitted => "READ COMMITTED",
            Isolation::SerializableReadOnly => "SERIALIZABLE, READ ONLY",
            Isolation::RepeatableReadReadOnly => "REPEATABLE READ, READ ONLY",
            Isolation::ReadCommittedReadOnly => "READ COMMITTED, READ ONLY",
            Isolation::SerializableReadOnlyDeferrable => "SERIALIZABLE, READ ONLY, DEFERRABLE",
        }
    }
}

/// Retry settings for [`transaction_with`].
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    /// Total attempts, including the first. Values below 1 count as 1.
    pub max_attempts: u32,
    /// Lower bound of the random delay before a retry.
    pub min_retry_delay: Duration,
    /// Upper bound of the random delay before a retry.
    pub max_retry_delay: Duration,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_retry_delay: Duration::from_millis(25),
            max_retry_delay: Duration::from_millis(250),
        }
    }
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the range the retry delay is drawn from (inclusive).
    pub fn with_retry_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_retry_delay = min;
        self.max_retry_delay = max;
        self
    }

    /// Draw a delay uniformly from the configured range.
    pub fn retry_delay(&self) -> Duration {
        let lo = self.min_retry_delay.min(self.max_retry_delay).as_micros() as u64;
        let hi = self.min_retry_delay.max(self.max_retry_delay).as_micros() as u64;
        Duration::from_micros(rand::rng().random_range(lo..=hi))
    }
}

/// Supplies the connection a transaction runs on.
///
/// The connection is released when dropped.
pub trait ConnectionSource: Sync {
    type Connection: GenericClient;

    fn acquire(&self) -> impl std::future::Future<Output = OrmResult<Self::Connection>> + Send;
}

/// Run `callback` in a transaction with the default [`TransactionConfig`].
pub async fn transaction<S, T, F>(source: &S, isolation: Isolation, callback: F) -> OrmResult<T>
where
    S: ConnectionSource,
    F: AsyncFnMut(&S::Connection) -> OrmResult<T>,
{
    transaction_with(source, &TransactionConfig::default(), isolation, callback).await
}

/// Run `callback` in a transaction, retrying on serialization failures and deadlocks.
///
/// One connection is held for all attempts and released exactly once, whatever
/// the outcome.
pub async fn transaction_with<S, T, F>(
    source: &S,
    config: &TransactionConfig,
    isolation: Isolation,
    mut callback: F,
) -> OrmResult<T>
where
    S: ConnectionSource,
    F: AsyncFnMut(&S::Connection) -> OrmResult<T>,
{
    let txn_id = Uuid::new_v4();
    let conn = source.acquire().await?;
    tracing::debug!(
        target: "ormless.transaction",
        %txn_id,
        isolation = isolation.as_sql(),
        "transaction started"
    );

    let result = run_attempts(&conn, config, isolation, &mut callback, txn_id).await;

    drop(conn);
    tracing::trace!(target: "ormless.transaction", %txn_id, "connection released");
    result
}

/// Isolation levels as types, for code that needs a guarantee at compile time.
///
/// `L: Satisfies<R>` holds when a transaction at level `L` gives at least the
/// guarantees of `R`: it is as strict or stricter, and read-only only if `R`
/// is read-only.
///
/// ```ignore
/// use ormless::transaction::{level, Txn};
///
/// async fn audit<C, L>(txn: &Txn<'_, C, L>) -> OrmResult<Value>
/// where
///     C: GenericClient,
///     L: level::Satisfies<level::RepeatableRead>,
/// {
///     count("books", Filter::All, CountOptions::new()).run(txn).await
/// }
/// ```
pub mod level {
    use super::Isolation;

    pub trait Level: Send + Sync + 'static {
        const ISOLATION: Isolation;
    }

    pub trait Satisfies<Required: Level>: Level {}

    macro_rules! levels {
        ($($name:ident),+ $(,)?) => {
            $(
                #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
                pub struct $name;

                impl Level for $name {
                    const ISOLATION: Isolation = Isolation::$name;
                }
            )+
        };
    }

    macro_rules! satisfies {
        ($($level:ident => [$($required:ident),+]);+ $(;)?) => {
            $($(impl Satisfies<$required> for $level {})+)+
        };
    }

    levels!(
        Serializable,
        RepeatableRead,
        ReadCommitted,
        SerializableReadOnly,
        RepeatableReadReadOnly,
        ReadCommittedReadOnly,
        SerializableReadOnlyDeferrable,
    );

    satisfies! {
        Serializable => [
            Serializable,
            RepeatableRead,
            ReadCommitted,
            SerializableReadOnly,
            RepeatableReadReadOnly,
            ReadCommittedReadOnly,
            SerializableReadOnlyDeferrable
        ];
        RepeatableRead => [RepeatableRead, ReadCommitted, RepeatableReadReadOnly, ReadCommittedReadOnly];
        ReadCommitted => [ReadCommitted, ReadCommittedReadOnly];
        SerializableReadOnly => [
            SerializableReadOnly,
            RepeatableReadReadOnly,
            ReadCommittedReadOnly,
            SerializableReadOnlyDeferrable
        ];
        RepeatableReadReadOnly => [RepeatableReadReadOnly, ReadCommittedReadOnly];
        ReadCommittedReadOnly => [ReadCommittedReadOnly];
        SerializableReadOnlyDeferrable => [SerializableReadOnlyDeferrable];
    }
}

/// A transaction's connection, tagged with the isolation level it runs at.
///
/// Runs queries like the connection itself and derefs to it for anything
/// [`GenericClient`] does not cover.
pub struct Txn<'a, C, L> {
    conn: &'a C,
    level: PhantomData<L>,
}

impl<'a, C, L: level::Level> Txn<'a, C, L> {
    fn new(conn: &'a C) -> Self {
        Self {
            conn,
            level: PhantomData,
        }
    }

    pub fn isolation(&self) -> Isolation {
        L::ISOLATION
    }

    pub fn connection(&self) -> &'a C {
        self.conn
    }
}

impl<C, L> Deref for Txn<'_, C, L> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn
    }
}

impl<C: GenericClient, L: level::Level> GenericClient for Txn<'_, C, L> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        self.conn.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        self.conn.execute(sql, params).await
    }
}

/// Like [`transaction_with`], at the isolation level `L`, handing the callback
/// a [`Txn`] tagged with that level.
pub async fn transaction_at<L, S, T, F>(
    source: &S,
    config: &TransactionConfig,
    mut callback: F,
) -> OrmResult<T>
where
    L: level::Level,
    S: ConnectionSource,
    F: AsyncFnMut(&Txn<'_, S::Connection, L>) -> OrmResult<T>,
{
    transaction_with(source, config, L::ISOLATION, async |conn| {
        let txn = Txn::<_, L>::new(conn);
        callback(&txn).await
    })
    .await
}

async fn run_attempts<C, T, F>(
    conn: &C,
    config: &TransactionConfig,
    isolation: Isolation,
    callback: &mut F,
    txn_id: Uuid,
) -> OrmResult<T>
where
    C: GenericClient,
    F: AsyncFnMut(&C) -> OrmResult<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let begin = format!("START TRANSACTION ISOLATION LEVEL {}", isolation.as_sql());

    let mut attempt = 1;
    loop {
        if attempt > 1 {
            tracing::debug!(
                target: "ormless.transaction",
                %txn_id,
                attempt,
                max_attempts,
                "retrying transaction"
            );
        }

        let err = match attempt_once(conn, &begin, callback).await {
            Ok(value) => {
                tracing::debug!(target: "ormless.transaction", %txn_id, attempt, "committed");
                return Ok(value);
            }
            Err(err) => err,
        };

        if let Err(rollback_err) = conn.execute("ROLLBACK", &[]).await {
            tracing::warn!(
                target: "ormless.transaction",
                %txn_id,
                error = %rollback_err,
                "rollback failed"
            );
            return Err(OrmError::Other(format!(
                "{err} (rollback failed: {rollback_err})"
            )));
        }

        if !err.is_retryable() {
            return Err(err);
        }

        if attempt >= max_attempts {
            tracing::warn!(
                target: "ormless.transaction",
                %txn_id,
                code = err.sqlstate().unwrap_or("-"),
                attempt,
                max_attempts,
                "transaction rolled back, giving up"
            );
            return Err(OrmError::RetriesExhausted {
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = config.retry_delay();
        tracing::warn!(
            target: "ormless.transaction",
            %txn_id,
            code = err.sqlstate().unwrap_or("-"),
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "transaction rolled back, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

async fn attempt_once<C, T, F>(conn: &C, begin: &str, callback: &mut F) -> OrmResult<T>
where
    C: GenericClient,
    F: AsyncFnMut(&C) -> OrmResult<T>,
{
    conn.execute(begin, &[]).await?;
    let value = callback(conn).await?;
    conn.execute("COMMIT", &[]).await?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::sql;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio_postgres::Row;
    use tokio_postgres::types::ToSql;

    #[derive(Default)]
    struct Log {
        statements: Vec<String>,
        acquired: usize,
        released: usize,
    }

    #[derive(Default)]
    struct MockSource {
        log: Arc<Mutex<Log>>,
        commit_failures: Arc<AtomicU32>,
    }

    struct MockConn {
        log: Arc<Mutex<Log>>,
        commit_failures: Arc<AtomicU32>,
    }

    impl MockConn {
        fn record(&self, sql: &str) {
            self.log.lock().unwrap().statements.push(sql.to_string());
        }
    }

    impl GenericClient for MockConn {
        async fn query(&self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
            self.record(sql);
            Ok(Vec::new())
        }

        async fn execute(&self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
            self.record(sql);
            if sql == "COMMIT"
                && self
                    .commit_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(OrmError::SerializationFailure(
                    "could not serialize access due to read/write dependencies".into(),
                ));
            }
            Ok(0)
        }
    }

    impl Drop for MockConn {
        fn drop(&mut self) {
            self.log.lock().unwrap().released += 1;
        }
    }

    impl ConnectionSource for MockSource {
        type Connection = MockConn;

        async fn acquire(&self) -> OrmResult<MockConn> {
            self.log.lock().unwrap().acquired += 1;
            Ok(MockConn {
                log: self.log.clone(),
                commit_failures: self.commit_failures.clone(),
            })
        }
    }

    impl MockSource {
        fn statements(&self) -> Vec<String> {
            self.log.lock().unwrap().statements.clone()
        }

        fn count(&self, statement: &str) -> usize {
            self.statements().iter().filter(|s| *s == statement).count()
        }

        fn acquired_and_released(&self) -> (usize, usize) {
            let log = self.log.lock().unwrap();
            (log.acquired, log.released)
        }
    }

    fn fast_config(max_attempts: u32) -> TransactionConfig {
        TransactionConfig::new()
            .with_max_attempts(max_attempts)
            .with_retry_delay(Duration::ZERO, Duration::from_millis(1))
    }

    const BEGIN_SERIALIZABLE: &str = "START TRANSACTION ISOLATION LEVEL SERIALIZABLE";

    #[tokio::test]
    async fn commits_once_on_success() {
        let source = MockSource::default();
        let value = transaction_with(&source, &fast_config(5), Isolation::Serializable, async |_conn| {
            Ok("done")
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(source.statements(), vec![BEGIN_SERIALIZABLE, "COMMIT"]);
        assert_eq!(source.acquired_and_released(), (1, 1));
    }

    #[tokio::test]
    async fn retries_a_conflict_then_commits_once() {
        let source = MockSource::default();
        let mut calls = 0;
        let value = transaction_with(&source, &fast_config(5), Isolation::Serializable, async |_conn| {
            calls += 1;
            if calls == 1 {
                Err(OrmError::SerializationFailure("conflict".into()))
            } else {
                Ok(calls * 10)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 20);
        assert_eq!(calls, 2);
        assert_eq!(
            source.statements(),
            vec![BEGIN_SERIALIZABLE, "ROLLBACK", BEGIN_SERIALIZABLE, "COMMIT"]
        );
        assert_eq!(source.count("COMMIT"), 1);
        assert_eq!(source.acquired_and_released(), (1, 1));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let source = MockSource::default();
        let mut calls = 0;
        let err = transaction_with(&source, &fast_config(3), Isolation::Serializable, async |_conn| {
            calls += 1;
            Err::<(), _>(OrmError::DeadlockDetected("deadlock detected".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 3);
        match err {
            OrmError::RetriesExhausted { attempts, source: last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, OrmError::DeadlockDetected(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(source.count("ROLLBACK"), 3);
        assert_eq!(source.count("COMMIT"), 0);
        assert_eq!(source.acquired_and_released(), (1, 1));
    }

    #[tokio::test]
    async fn other_errors_roll_back_and_propagate() {
        let source = MockSource::default();
        let mut calls = 0;
        let err = transaction_with(&source, &fast_config(5), Isolation::ReadCommitted, async |_conn| {
            calls += 1;
            Err::<(), _>(OrmError::UniqueViolation("authors_pkey: duplicate key".into()))
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 1);
        assert!(err.is_unique_violation());
        assert_eq!(
            source.statements(),
            vec!["START TRANSACTION ISOLATION LEVEL READ COMMITTED", "ROLLBACK"]
        );
        assert_eq!(source.acquired_and_released(), (1, 1));
    }

    #[tokio::test]
    async fn conflict_at_commit_is_retried() {
        let source = MockSource::default();
        source.commit_failures.store(1, Ordering::SeqCst);
        let mut calls = 0;
        let value = transaction_with(&source, &fast_config(5), Isolation::Serializable, async |_conn| {
            calls += 1;
            Ok(calls)
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(
            source.statements(),
            vec![
                BEGIN_SERIALIZABLE,
                "COMMIT",
                "ROLLBACK",
                BEGIN_SERIALIZABLE,
                "COMMIT"
            ]
        );
    }

    #[tokio::test]
    async fn callback_queries_run_on_the_transaction_connection() {
        let source = MockSource::default();
        transaction_with(
            &source,
            &fast_config(1),
            Isolation::SerializableReadOnlyDeferrable,
            async |conn| {
                sql("SELECT 1 AS result").run(conn).await?;
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(
            source.statements(),
            vec![
                "START TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY, DEFERRABLE",
                "SELECT 1 AS result",
                "COMMIT"
            ]
        );
    }

    async fn read_consistently<C, L>(txn: &Txn<'_, C, L>) -> OrmResult<serde_json::Value>
    where
        C: GenericClient,
        L: level::Satisfies<level::RepeatableReadReadOnly>,
    {
        sql("SELECT 1 AS result").run(txn).await
    }

    #[tokio::test]
    async fn typed_transaction_runs_at_its_level() {
        let source = MockSource::default();
        let isolation = transaction_at::<level::SerializableReadOnly, _, _, _>(
            &source,
            &fast_config(1),
            async |txn| {
                read_consistently(txn).await?;
                Ok(txn.isolation())
            },
        )
        .await
        .unwrap();

        assert_eq!(isolation, Isolation::SerializableReadOnly);
        assert_eq!(
            source.statements(),
            vec![
                "START TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY",
                "SELECT 1 AS result",
                "COMMIT"
            ]
        );
        assert_eq!(source.acquired_and_released(), (1, 1));
    }

    #[tokio::test]
    async fn typed_transaction_retries_like_the_untyped_one() {
        let source = MockSource::default();
        source.commit_failures.store(2, Ordering::SeqCst);
        let mut calls = 0;
        let value = transaction_at::<level::Serializable, _, _, _>(
            &source,
            &fast_config(5),
            async |_txn| {
                calls += 1;
                Ok(calls)
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(source.count("ROLLBACK"), 2);
        assert_eq!(source.count("COMMIT"), 3);
    }

    fn satisfies<L: level::Satisfies<R>, R: level::Level>() {}

    #[test]
    fn stricter_levels_satisfy_weaker_ones() {
        use level::*;

        satisfies::<Serializable, ReadCommitted>();
        satisfies::<Serializable, SerializableReadOnlyDeferrable>();
        satisfies::<RepeatableRead, ReadCommittedReadOnly>();
        satisfies::<SerializableReadOnly, RepeatableReadReadOnly>();
        satisfies::<ReadCommitted, ReadCommitted>();

        assert_eq!(RepeatableRead::ISOLATION.as_sql(), "REPEATABLE READ");
        assert_eq!(
            SerializableReadOnlyDeferrable::ISOLATION,
            Isolation::SerializableReadOnlyDeferrable
        );
    }

    #[test]
    fn retry_delay_stays_in_range() {
        let config = TransactionConfig::new()
            .with_retry_delay(Duration::from_millis(25), Duration::from_millis(250));
        for _ in 0..200 {
            let delay = config.retry_delay();
            assert!(delay >= Duration::from_millis(25) && delay <= Duration::from_millis(250));
        }

        let fixed = TransactionConfig::new().with_retry_delay(Duration::ZERO, Duration::ZERO);
        assert_eq!(fixed.retry_delay(), Duration::ZERO);
    }

    #[test]
    fn default_config_matches_documented_values() {
        let config = TransactionConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.min_retry_delay, Duration::from_millis(25));
        assert_eq!(config.max_retry_delay, Duration::from_millis(250));
    }
}
