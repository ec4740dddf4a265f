use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::{error::BoxDynError, model::account::AccountField, storage::StorageError};

/// The outcome of a failed transaction attempt.
#[derive(Debug)]
pub enum TransactionError {
    /// The transaction was unable to complete, but should be retried.
    Temporary(BoxDynError),
    /// The transaction was unable to complete and should not be retried.
    Permanent(StorageError),
}

impl From<DieselError> for TransactionError {
    fn from(error: DieselError) -> Self {
        match error {
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, information) => {
                Self::Temporary(Box::new(DieselError::DatabaseError(
                    DatabaseErrorKind::SerializationFailure,
                    information,
                )))
            }
            // the users table has a single unique column besides the serial primary key
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                Self::Permanent(StorageError::UniqueViolation {
                    field: AccountField::Username,
                })
            }
            // the only check constraint limits the username length
            DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, information) => {
                Self::Permanent(StorageError::DataError {
                    field: AccountField::Username,
                    message: information.message().to_string(),
                })
            }
            error => Self::Permanent(StorageError::Database {
                source: Box::new(error),
            }),
        }
    }
}

impl From<StorageError> for TransactionError {
    fn from(error: StorageError) -> Self {
        Self::Permanent(error)
    }
}

#[cfg(test)]
mod tests {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    use super::TransactionError;
    use crate::{model::account::AccountField, storage::StorageError};

    fn database_error(kind: DatabaseErrorKind, message: &str) -> DieselError {
        DieselError::DatabaseError(kind, Box::new(String::from(message)))
    }

    #[test]
    fn test_serialization_failure_is_retried() {
        let error = TransactionError::from(database_error(
            DatabaseErrorKind::SerializationFailure,
            "could not serialize access",
        ));
        assert!(matches!(error, TransactionError::Temporary(_)), "{error:?}");
    }

    #[test]
    fn test_unique_violation_maps_to_username() {
        let error = TransactionError::from(database_error(
            DatabaseErrorKind::UniqueViolation,
            "duplicate key value violates unique constraint \"users_username_unique\"",
        ));
        assert!(
            matches!(
                error,
                TransactionError::Permanent(StorageError::UniqueViolation {
                    field: AccountField::Username
                })
            ),
            "{error:?}"
        );
    }

    #[test]
    fn test_check_violation_is_a_data_error() {
        let error = TransactionError::from(database_error(
            DatabaseErrorKind::CheckViolation,
            "new row violates check constraint \"users_username_length\"",
        ));
        match error {
            TransactionError::Permanent(StorageError::DataError { field, message }) => {
                assert_eq!(field, AccountField::Username);
                assert!(message.contains("users_username_length"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_other_errors_are_permanent_database_errors() {
        let error = TransactionError::from(DieselError::NotFound);
        assert!(
            matches!(error, TransactionError::Permanent(StorageError::Database { .. })),
            "{error:?}"
        );
    }
}
