//! Scoped transaction runner.
//!
//! Commit happens only on the success path. Every error path rolls back
//! before returning; a failed rollback is chained onto the original error.

use super::error::{RepoError, RepoResult};
use log::error;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Runs `f` inside one immediate (write) transaction.
pub(crate) fn write_transaction<T>(
    conn: &Connection,
    operation: &'static str,
    target: &str,
    f: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
) -> RepoResult<T> {
    run(conn, TransactionBehavior::Immediate, operation, target, f)
}

/// Runs `f` inside one deferred transaction for a consistent read snapshot.
pub(crate) fn read_transaction<T>(
    conn: &Connection,
    operation: &'static str,
    target: &str,
    f: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
) -> RepoResult<T> {
    run(conn, TransactionBehavior::Deferred, operation, target, f)
}

fn run<T>(
    conn: &Connection,
    behavior: TransactionBehavior,
    operation: &'static str,
    target: &str,
    f: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
) -> RepoResult<T> {
    let tx = Transaction::new_unchecked(conn, behavior)
        .map_err(|err| RepoError::from(err).in_operation(operation, target))?;

    match f(&tx) {
        Ok(value) => {
            tx.commit()
                .map_err(|err| RepoError::from(err).in_operation(operation, target))?;
            Ok(value)
        }
        Err(err) => {
            let err = err.in_operation(operation, target);
            match tx.rollback() {
                Ok(()) => Err(err),
                Err(rollback) => {
                    error!(
                        "event=tx_rollback module=repo status=error operation={} target={} error={}",
                        operation, target, rollback
                    );
                    Err(RepoError::RollbackFailed {
                        operation,
                        original: Box::new(err),
                        rollback,
                    })
                }
            }
        }
    }
}
