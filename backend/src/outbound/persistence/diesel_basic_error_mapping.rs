//! Shared Diesel error mapping for the ledger, outcome, promo, and style
//! adapters.
//!
//! Each adapter passes its own port error constructors, so the mapping rules
//! live in one place while the error types stay per port.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use super::pool::PoolError;

/// Error raised inside a Diesel transaction closure.
///
/// Row conversion failures abort the transaction as `Corrupt`, so partial
/// writes are rolled back.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TxError {
    /// Diesel or the database rejected a statement.
    #[error(transparent)]
    Diesel(#[from] DieselError),
    /// A row violated a domain invariant.
    #[error("{0}")]
    Corrupt(String),
}

/// Map pool errors into a port-specific connection error constructor.
pub(crate) fn map_basic_pool_error<E, C>(error: PoolError, connection: C) -> E
where
    C: FnOnce(String) -> E,
{
    let message = match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    };
    connection(message)
}

/// Map common Diesel error variants into query/connection constructors.
///
/// `NotFound` and query-builder failures map to query errors; a closed
/// connection maps to a connection error.
pub(crate) fn map_basic_diesel_error<E, Q, C>(error: DieselError, query: Q, connection: C) -> E
where
    Q: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
{
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => query("record not found"),
        DieselError::QueryBuilderError(_) => query("database query error"),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            connection("database connection error")
        }
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            query("unique constraint violated")
        }
        DieselError::DatabaseError(_, _) => query("database error"),
        _ => query("database error"),
    }
}

/// Map a transaction failure, routing conversion failures to `corrupt`.
pub(crate) fn map_basic_tx_error<E, Q, C, K>(error: TxError, query: Q, connection: C, corrupt: K) -> E
where
    Q: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
    K: FnOnce(String) -> E,
{
    match error {
        TxError::Diesel(error) => map_basic_diesel_error(error, query, connection),
        TxError::Corrupt(message) => corrupt(message),
    }
}

/// Whether `error` is a unique-constraint violation, optionally on a named
/// constraint.
pub(crate) fn is_unique_violation(error: &DieselError, constraint: Option<&str>) -> bool {
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => constraint
            .is_none_or(|expected| {
                info.constraint_name() == Some(expected) || info.message().contains(expected)
            }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, PartialEq, Eq)]
    enum Mapped {
        Query(String),
        Connection(String),
        Corrupt(String),
    }

    fn map(error: TxError) -> Mapped {
        map_basic_tx_error(
            error,
            |message| Mapped::Query(message.to_owned()),
            |message| Mapped::Connection(message.to_owned()),
            Mapped::Corrupt,
        )
    }

    #[rstest]
    fn pool_errors_become_connection_errors() {
        let mapped = map_basic_pool_error(PoolError::checkout("timed out"), Mapped::Connection);
        assert_eq!(mapped, Mapped::Connection("timed out".to_owned()));
    }

    #[rstest]
    #[case::not_found(DieselError::NotFound, Mapped::Query("record not found".to_owned()))]
    #[case::rolled_back(DieselError::RollbackTransaction, Mapped::Query("database error".to_owned()))]
    fn diesel_errors_become_query_errors(#[case] error: DieselError, #[case] expected: Mapped) {
        assert_eq!(map(TxError::from(error)), expected);
    }

    #[rstest]
    fn conversion_failures_are_corrupt() {
        assert_eq!(
            map(TxError::Corrupt("negative credits".to_owned())),
            Mapped::Corrupt("negative credits".to_owned())
        );
    }

    #[rstest]
    fn only_database_errors_can_be_unique_violations() {
        assert!(!is_unique_violation(&DieselError::NotFound, None));
    }
}
