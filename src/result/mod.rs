//! Result handles produced by daemon calls.
//!
//! A [`ResultHandle`] is a cheap, reference-counted view over a completed
//! call outcome. Cloning it takes a reference, dropping it releases one; the
//! outcome is freed with the last reference. The handle carries no iteration
//! position: cursors built on top of it (see [`crate::list::List`]) keep their
//! own.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::debug;

use crate::models::{Dict, Value, ValueKind};

/// Access primitives a completed call outcome exposes to cursors.
///
/// Every `read_*` returns `None` when the element at `index` is missing or
/// is not stored with the requested type.
pub trait ResultSource: Send + Sync {
    fn declared_kind(&self) -> ValueKind;
    fn len(&self) -> usize;
    fn read_int32(&self, index: usize) -> Option<i32>;
    fn read_uint32(&self, index: usize) -> Option<u32>;
    fn read_string(&self, index: usize) -> Option<String>;
    fn read_dict(&self, index: usize) -> Option<Dict>;
}

#[derive(Clone)]
pub struct ResultHandle {
    source: Arc<dyn ResultSource>,
}

impl ResultHandle {
    pub fn new(source: impl ResultSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Number of live references to the underlying outcome.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.source)
    }

    pub fn kind(&self) -> ValueKind {
        self.source.declared_kind()
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source(&self) -> &dyn ResultSource {
        self.source.as_ref()
    }
}

impl std::fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Owned outcome as it travels over IPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub kind: ValueKind,
    pub items: Vec<Value>,
}

impl ResultPayload {
    pub fn new(kind: ValueKind, items: Vec<Value>) -> Self {
        Self { kind, items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn into_handle(self) -> ResultHandle {
        ResultHandle::new(self)
    }
}

impl ResultSource for ResultPayload {
    fn declared_kind(&self) -> ValueKind {
        self.kind
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn read_int32(&self, index: usize) -> Option<i32> {
        match self.items.get(index)? {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    fn read_uint32(&self, index: usize) -> Option<u32> {
        match self.items.get(index)? {
            Value::Uint32(v) => Some(*v),
            _ => None,
        }
    }

    fn read_string(&self, index: usize) -> Option<String> {
        match self.items.get(index)? {
            Value::String(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn read_dict(&self, index: usize) -> Option<Dict> {
        match self.items.get(index)? {
            Value::Dict(v) => Some(v.clone()),
            _ => None,
        }
    }
}

type Notifier = Box<dyn FnOnce(Result<&ResultHandle, &str>) + Send>;

#[derive(Default)]
struct Completion {
    outcome: Option<Result<ResultHandle, String>>,
    notifiers: Vec<Notifier>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<Completion>,
    done: Condvar,
}

/// Outcome of a call that may not have arrived yet.
///
/// Clones observe the same call. Any number of notifiers can be connected;
/// each runs once, on the thread that completes the call, or immediately on
/// the caller's thread if the outcome is already there.
#[derive(Clone, Default)]
pub struct PendingResult {
    shared: Arc<Shared>,
}

impl PendingResult {
    /// Run `call` on a worker thread; its outcome completes this result.
    pub fn spawn<F>(call: F) -> Self
    where
        F: FnOnce() -> Result<ResultPayload> + Send + 'static,
    {
        let pending = Self::default();
        let worker = pending.clone();
        thread::spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(call))
                .unwrap_or_else(|_| Err(anyhow!("Call ended without delivering a result")));
            worker.complete(outcome);
        });
        pending
    }

    /// An already completed result.
    #[cfg(test)]
    pub fn ready(outcome: Result<ResultPayload>) -> Self {
        let pending = Self::default();
        pending.complete(outcome);
        pending
    }

    /// Block until the outcome arrives.
    pub fn wait(&self) -> Result<ResultHandle> {
        let state = self
            .shared
            .done
            .wait_while(self.lock(), |s| s.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        match &state.outcome {
            Some(Ok(handle)) => Ok(handle.clone()),
            Some(Err(e)) => Err(anyhow!("{e}")).context("Remote call failed"),
            None => Err(anyhow!("Call ended without delivering a result")),
        }
    }

    /// Run `callback` once when the outcome arrives.
    pub fn connect<F>(&self, callback: F)
    where
        F: FnOnce(Result<&ResultHandle, &str>) + Send + 'static,
    {
        let mut state = self.lock();
        if let Some(outcome) = state.outcome.clone() {
            drop(state);
            callback(outcome.as_ref().map_err(String::as_str));
            return;
        }
        state.notifiers.push(Box::new(callback));
    }

    fn complete(&self, outcome: Result<ResultPayload>) {
        let outcome = outcome
            .map(ResultPayload::into_handle)
            .map_err(|e| format!("{e:#}"));

        match &outcome {
            Ok(handle) => debug!(
                "Result completed: kind={}, items={}",
                handle.kind(),
                handle.len()
            ),
            Err(e) => debug!("Result failed: {e}"),
        }

        let notifiers = {
            let mut state = self.lock();
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.notifiers)
        };
        self.shared.done.notify_all();

        for notify in notifiers {
            notify(outcome.as_ref().map_err(String::as_str));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Completion> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
