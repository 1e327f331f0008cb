//! Transaction boundaries
//!
//! Writers open the transaction with `BEGIN IMMEDIATE` so the write lock is
//! taken up front. Two editors renumbering the same tree then serialize on
//! the lock instead of both reading a stale arena.

use super::error::{DatabaseError, SqlContext};
use libsql::Connection;

pub async fn begin(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute("BEGIN IMMEDIATE", ())
        .await
        .sql_context("Failed to begin transaction")?;
    Ok(())
}

/// Commit when `result` is `Ok`, roll back otherwise
pub async fn finish<T, E>(conn: &Connection, result: Result<T, E>) -> Result<T, E>
where
    E: From<DatabaseError>,
{
    match result {
        Ok(value) => {
            if let Err(e) = conn.execute("COMMIT", ()).await {
                let _rollback = conn.execute("ROLLBACK", ()).await;
                return Err(DatabaseError::from_libsql("Failed to commit transaction", e).into());
            }
            Ok(value)
        }
        Err(e) => {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            Err(e)
        }
    }
}
