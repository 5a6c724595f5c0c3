use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("transaction state error: {0}")]
    TransactionState(#[from] TransactionStateError),
    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("invalid field: {0}")]
    InvalidField(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("inconsistent state: {0}")]
    InconsistentState(String),
}

/// Malformed application schemas, reported by the schema converter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("named type without a name: {0}")]
    MissingName(String),
    #[error("field without a name: {0}")]
    MissingFieldName(String),
    #[error("duplicate definition of named type {0}")]
    DuplicateName(String),
    #[error("unknown named type: {0}")]
    UnknownType(String),
    #[error("reserved name: {0}")]
    ReservedName(String),
    #[error("unsupported default: {0}")]
    UnsupportedDefault(String),
    #[error("unknown type: {0}")]
    UnknownTypeKeyword(String),
    #[error("unknown array semantics: {0}")]
    UnknownSemantics(String),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("the flow schema should have a record type at the root")]
    RootNotRecord,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionStateError {
    #[error("already in a transaction")]
    AlreadyInTransaction,
    #[error("transaction was already entered")]
    AlreadyEntered,
    #[error("transaction was already exited")]
    AlreadyExited,
    #[error("transaction is not entered")]
    NotEntered,
    #[error("current transaction does not match")]
    NotCurrent,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("modifications are only allowed in a transaction")]
    NoTransaction,
    #[error("object {0} is not part of the transaction's tree")]
    NotInTree(String),
    #[error("object {0} is outside transaction scope")]
    OutsideScope(String),
}
