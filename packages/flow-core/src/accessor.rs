//! Generic field access, parameterised by the model's
//! [`RecordDescriptor`](crate::RecordDescriptor).

use std::sync::Arc;

use crate::error::{Error, Result, ScopeError};
use crate::model::{FieldValue, Model};
use crate::transaction::Transaction;

/// Read a field, looking through its envelope.
///
/// Inside a transaction the read sees the transaction's latest version of the object.
pub fn get_field(model: &Arc<Model>, name: &str) -> Result<Option<FieldValue>> {
    let latest = match Transaction::current() {
        Some(txn) => txn.updated(model)?,
        None => Arc::clone(model),
    };
    if latest.descriptor().field(name).is_none() {
        return Err(Error::InvalidField(format!(
            "{} has no field {name}",
            latest.descriptor().name
        )));
    }
    Ok(latest.field(name).map(|value| value.unwrap_versioned().clone()))
}

/// Write a versioned field in the current transaction and return the new instance.
///
/// Fails with [`ScopeError::NoTransaction`] when no transaction is entered on this thread.
pub fn set_field(
    model: &Arc<Model>,
    name: &str,
    value: impl Into<FieldValue>,
) -> Result<Arc<Model>> {
    let txn = Transaction::current().ok_or(ScopeError::NoTransaction)?;
    txn.write_field(model, name, value.into())
}
