//! Mapeo de errores Diesel a la taxonomía compartida de `retail-core`.
//! Ninguna violación del motor se devuelve atenuada ni se traga.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use retail_core::StorageError;

pub fn map_diesel_error(err: DieselError) -> StorageError {
    match err {
        DieselError::NotFound => StorageError::NotFound,
        DieselError::DatabaseError(kind, info) => match kind {
            DatabaseErrorKind::UniqueViolation => StorageError::UniqueViolation(info.message().to_string()),
            DatabaseErrorKind::CheckViolation => StorageError::CheckViolation(info.message().to_string()),
            DatabaseErrorKind::ForeignKeyViolation => StorageError::ForeignKeyViolation(info.message().to_string()),
            DatabaseErrorKind::NotNullViolation => StorageError::NotNullViolation(info.message().to_string()),
            DatabaseErrorKind::SerializationFailure => StorageError::SerializationConflict,
            DatabaseErrorKind::ClosedConnection => StorageError::TransientIo(info.message().to_string()),
            other => StorageError::Unknown(format!("db error kind {:?}: {}", other, info.message())),
        },
        DieselError::DeserializationError(e) => StorageError::Unknown(format!("deser: {e}")),
        DieselError::SerializationError(e) => StorageError::Unknown(format!("ser: {e}")),
        DieselError::AlreadyInTransaction => StorageError::Unknown("already in transaction".into()),
        DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
            StorageError::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
        }
        DieselError::BrokenTransactionManager => StorageError::TransientIo("broken transaction manager".into()),
        DieselError::QueryBuilderError(e) => StorageError::Unknown(format!("query builder: {e}")),
        DieselError::InvalidCString(e) => StorageError::Unknown(format!("invalid cstring: {e}")),
        DieselError::RollbackTransaction => StorageError::Unknown("rollback transaction".into()),
        DieselError::NotInTransaction => StorageError::Unknown("not in transaction".into()),
        other => StorageError::Unknown(format!("unhandled diesel error: {other:?}")),
    }
}
