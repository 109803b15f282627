use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Query did not return a unique result: {0} rows")]
    NonUniqueResult(usize),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction required: {0}")]
    TransactionRequired(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Persistence context is closed")]
    ContextClosed,

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Subscription cancelled")]
    Cancelled,

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

/// Coarse classification of a [`PersistenceError`].
///
/// Absence of a row is never an error and has no kind: it is an empty completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NonUniqueResult,
    ConstraintViolation,
    PersistenceFailure,
}

impl PersistenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NonUniqueResult(_) => ErrorKind::NonUniqueResult,
            Self::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            _ => ErrorKind::PersistenceFailure,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

impl<T> From<std::sync::PoisonError<T>> for PersistenceError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            PersistenceError::NonUniqueResult(2).kind(),
            ErrorKind::NonUniqueResult
        );
        assert_eq!(
            PersistenceError::ConstraintViolation("dup".into()).kind(),
            ErrorKind::ConstraintViolation
        );
        assert_eq!(
            PersistenceError::QueryError("bad".into()).kind(),
            ErrorKind::PersistenceFailure
        );
        assert_eq!(
            PersistenceError::ContextClosed.kind(),
            ErrorKind::PersistenceFailure
        );
    }

    #[test]
    fn test_poison_error_maps_to_lock_error() {
        let lock = std::sync::Mutex::new(0);
        let _ = std::panic::catch_unwind(|| {
            let _guard = lock.lock().unwrap();
            panic!("poison");
        });
        let err: PersistenceError = lock.lock().unwrap_err().into();
        assert!(matches!(err, PersistenceError::LockError(_)));
    }
}
