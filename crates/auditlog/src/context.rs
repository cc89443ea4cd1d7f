//! Ambient per-execution-context state read by [`AuditLogger::audit`].
//!
//! Two values travel with the unit of work instead of the logger: the
//! account an operation runs on behalf of, and the transaction id of the
//! originating request. Both live in a thread-local slot by default. Inside
//! [`scope`] (or [`with_account_async`]) a tokio task-local slot takes over,
//! so tasks sharing a worker thread never see each other's values.
//!
//! Scoped setters restore the previous value through a drop guard, which
//! also runs on panic and when an async scope is cancelled.
//!
//! Persistent setters refuse to run in a tokio task outside [`scope`]: the
//! thread slot is shared by every task on that worker, so the value would
//! leak into whichever task runs next.
//!
//! [`AuditLogger::audit`]: crate::AuditLogger::audit

use std::cell::RefCell;
use std::fmt::Debug;
use std::future::Future;

use crate::error::{LogError, Result};

#[derive(Debug, Clone, Default)]
struct Ambient {
    account: Option<String>,
    transaction_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Account,
    TransactionId,
}

impl Ambient {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Account => &mut self.account,
            Field::TransactionId => &mut self.transaction_id,
        }
    }
}

thread_local! {
    static THREAD_CONTEXT: RefCell<Ambient> = RefCell::new(Ambient::default());
}

tokio::task_local! {
    static TASK_CONTEXT: RefCell<Ambient>;
}

fn in_task_scope() -> bool {
    TASK_CONTEXT.try_with(|_| ()).is_ok()
}

fn with_ambient<R>(f: impl FnOnce(&mut Ambient) -> R) -> R {
    if in_task_scope() {
        TASK_CONTEXT.with(|cell| f(&mut cell.borrow_mut()))
    } else {
        THREAD_CONTEXT.with(|cell| f(&mut cell.borrow_mut()))
    }
}

fn ensure_persistent_allowed(operation: &'static str) -> Result<()> {
    if tokio::task::try_id().is_some() && !in_task_scope() {
        return Err(LogError::UnscopedTask { operation });
    }
    Ok(())
}

fn replace(field: Field, value: Option<String>) -> Option<String> {
    with_ambient(|ambient| std::mem::replace(ambient.slot(field), value))
}

fn current(field: Field) -> Option<String> {
    with_ambient(|ambient| ambient.slot(field).clone())
}

/// Restores a context field to its previous value when dropped.
#[derive(Debug)]
#[must_use = "the previous value is restored as soon as the guard is dropped"]
pub struct ContextGuard {
    field: Field,
    previous: Option<String>,
}

impl ContextGuard {
    fn set(field: Field, value: Option<String>) -> Self {
        let previous = replace(field, value);
        Self { field, previous }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        replace(self.field, self.previous.take());
    }
}

/// Returns the account of the current execution context.
#[must_use]
pub fn current_account() -> Option<String> {
    current(Field::Account)
}

/// Sets the account until changed again; `None` clears it.
///
/// Returns the previous value.
///
/// # Errors
///
/// Returns [`LogError::UnscopedTask`] when called from a tokio task that is
/// not running inside [`scope`] or [`with_account_async`].
pub fn set_account(account: Option<&str>) -> Result<Option<String>> {
    ensure_persistent_allowed("set_account")?;
    Ok(replace(Field::Account, account.map(str::to_string)))
}

/// Sets the account and returns a guard that restores the previous value.
pub fn account_guard(account: Option<&str>) -> ContextGuard {
    ContextGuard::set(Field::Account, account.map(str::to_string))
}

/// Runs `f` with the account set, restoring the previous value afterwards.
pub fn with_account<T>(account: Option<&str>, f: impl FnOnce() -> T) -> T {
    let _guard = account_guard(account);
    f()
}

/// Returns the transaction id of the current execution context.
///
/// An empty id is reported as absent.
#[must_use]
pub fn current_transaction_id() -> Option<String> {
    current(Field::TransactionId).filter(|id| !id.is_empty())
}

/// Sets the transaction id until changed again; `None` clears it.
///
/// Returns the previous value.
///
/// # Errors
///
/// Returns [`LogError::UnscopedTask`] when called from a tokio task that is
/// not running inside [`scope`].
pub fn set_transaction_id(transaction_id: Option<&str>) -> Result<Option<String>> {
    ensure_persistent_allowed("set_transaction_id")?;
    Ok(replace(Field::TransactionId, transaction_id.map(str::to_string)))
}

/// Runs `f` with the transaction id set, restoring the previous value afterwards.
pub fn with_transaction_id<T>(transaction_id: Option<&str>, f: impl FnOnce() -> T) -> T {
    let _guard = ContextGuard::set(Field::TransactionId, transaction_id.map(str::to_string));
    f()
}

/// Runs `future` in its own task-scoped context.
///
/// The new context starts as a copy of the caller's at the time of this
/// call. Changes made inside, including persistent [`set_account`] calls,
/// are discarded when the future completes or is dropped.
pub fn scope<F: Future>(future: F) -> impl Future<Output = F::Output> {
    let inherited = with_ambient(|ambient| ambient.clone());
    TASK_CONTEXT.scope(RefCell::new(inherited), future)
}

/// Runs `future` in its own task-scoped context with the account set.
pub fn with_account_async<F: Future>(
    account: Option<&str>,
    future: F,
) -> impl Future<Output = F::Output> {
    let mut inherited = with_ambient(|ambient| ambient.clone());
    inherited.account = account.map(str::to_string);
    TASK_CONTEXT.scope(RefCell::new(inherited), future)
}

/// Source of the request-correlation id stamped on audit records.
pub trait TransactionSource: Send + Sync + Debug {
    /// Returns the transaction id for the calling context, if any.
    fn transaction_id(&self) -> Option<String>;
}

/// Reads the transaction id from the ambient context.
#[derive(Debug, Default, Clone, Copy)]
pub struct AmbientTransactionSource;

impl TransactionSource for AmbientTransactionSource {
    fn transaction_id(&self) -> Option<String> {
        current_transaction_id()
    }
}

/// Never reports a transaction id.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransactionSource;

impl TransactionSource for NoTransactionSource {
    fn transaction_id(&self) -> Option<String> {
        None
    }
}
