use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, Statement, TransactionTrait, Value,
};
use tracing::{debug, trace};

use crate::config::AdvisoryLockStrategy;
use crate::error::NestedSetError;

/// Transaction wrapping one structural operation.
///
/// Begun on a transaction, this becomes a savepoint, so engine operations
/// compose inside a caller-owned transaction. The advisory lock is
/// transaction-scoped and released by commit or rollback.
pub struct LockedTransaction {
    txn: DatabaseTransaction,
}

impl LockedTransaction {
    pub async fn acquire<C>(
        strategy: &AdvisoryLockStrategy,
        conn: &C,
    ) -> Result<Self, NestedSetError>
    where
        C: TransactionTrait,
    {
        let txn = conn.begin().await?;

        if let Some(key) = strategy.key() {
            if txn.get_database_backend() == DbBackend::Postgres {
                if let Err(err) = acquire_lock(&txn, key.as_str()).await {
                    let _ = txn.rollback().await;
                    return Err(err);
                }
                debug!(key = key.as_str(), "advisory lock acquired");
            } else {
                trace!(key = key.as_str(), "advisory lock skipped on non-PostgreSQL backend");
            }
        }

        Ok(Self { txn })
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<(), NestedSetError> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), NestedSetError> {
        self.txn.rollback().await?;
        Ok(())
    }

    /// Commit when `result` is `Ok`, roll back otherwise.
    pub async fn finish<T>(self, result: Result<T, NestedSetError>) -> Result<T, NestedSetError> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.rollback().await;
                Err(err)
            }
        }
    }
}

async fn acquire_lock(txn: &DatabaseTransaction, key: &str) -> Result<(), NestedSetError> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        vec![Value::from(key)],
    ))
    .await?;
    Ok(())
}
