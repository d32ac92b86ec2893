/*!
 * Transaction Helper Utilities
 *
 * Every multi-statement write in the service goes through `with_transaction`:
 * the callback's writes are committed when it returns `Ok` and rolled back when
 * it returns `Err` or when the future is dropped mid-flight. The connection is
 * handed back to the pool on every exit path.
 */

use crate::errors::ServiceError;
use sea_orm::{
    sea_query::{Expr, IntoCondition},
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, EntityTrait, Iterable,
    PrimaryKeyToColumn, QueryFilter, TransactionError, TransactionTrait,
};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// Unlike a bare `DatabaseConnection::transaction`, the callback's
/// `ServiceError` comes back unchanged, so a `NotFound` raised inside the
/// transaction is still a `NotFound` for the handler.
///
/// # Example
///
/// ```rust,ignore
/// use crate::db::with_transaction;
///
/// let order_id = with_transaction(&db, move |txn| {
///     Box::pin(async move {
///         let order = order::ActiveModel { .. }.insert(txn).await?;
///         delivery::ActiveModel { .. }.insert(txn).await?;
///         Ok(order.id)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T>(db: &DatabaseConnection, f: F) -> Result<T, ServiceError>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, ServiceError>> + Send,
    T: Send,
{
    let result = db.transaction::<F, T, ServiceError>(f).await;
    if result.is_err() {
        debug!("Transaction rolled back");
    }

    result.map_err(|e| match e {
        TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        TransactionError::Transaction(err) => err,
    })
}

/// Takes the write lock before the transaction reads anything.
///
/// Postgres gets its row locks from `SELECT ... FOR UPDATE`. SQLite ignores
/// that clause, and a deferred transaction that reads and then writes fails
/// with `SQLITE_BUSY` instead of waiting when another writer got there first.
/// Issuing a no-op `UPDATE <table> SET <pk> = <pk>` over the rows about to be
/// read makes the first statement a write, so competing transactions queue
/// on the busy timeout and each one then reads committed state.
pub async fn claim_rows<E, C, F>(db: &C, filter: F) -> Result<(), ServiceError>
where
    E: EntityTrait,
    C: ConnectionTrait,
    F: IntoCondition,
{
    if db.get_database_backend() != DbBackend::Sqlite {
        return Ok(());
    }
    let Some(key) = E::PrimaryKey::iter().next() else {
        return Ok(());
    };
    let column = key.into_column();

    E::update_many()
        .col_expr(column, Expr::col(column).into())
        .filter(filter)
        .exec(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, DbConfig};
    use sea_orm::{ConnectionTrait, DbBackend, Statement};

    async fn scratch_db() -> DatabaseConnection {
        let db = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("connect");
        db.execute_unprepared("CREATE TABLE scratch (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
            .await
            .expect("create scratch table");
        db
    }

    async fn row_count(db: &DatabaseConnection) -> i64 {
        let row = db
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT COUNT(*) AS n FROM scratch",
            ))
            .await
            .expect("count query")
            .expect("count row");
        row.try_get::<i64>("", "n").expect("count value")
    }

    #[tokio::test]
    async fn commits_on_ok() {
        let db = scratch_db().await;

        let value = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute_unprepared("INSERT INTO scratch (label) VALUES ('kept')")
                    .await?;
                Ok(42)
            })
        })
        .await
        .expect("transaction");

        assert_eq!(value, 42);
        assert_eq!(row_count(&db).await, 1);
    }

    #[tokio::test]
    async fn rolls_back_and_preserves_error_kind() {
        let db = scratch_db().await;

        let result: Result<(), ServiceError> = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute_unprepared("INSERT INTO scratch (label) VALUES ('discarded')")
                    .await?;
                Err(ServiceError::InvalidStatus("Order status: Completed".into()))
            })
        })
        .await;

        assert!(matches!(result, Err(ServiceError::InvalidStatus(_))));
        assert_eq!(row_count(&db).await, 0);
    }
}
