//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the scheduling core and the
//! external build executor.

use crate::Result;
use crate::dispatch::DispatchRequest;
use std::sync::{Arc, Mutex};

/// Hand-off point for dispatch requests.
///
/// Implementations must not block: the scheduling loop calls `submit` inline
/// and never awaits delivery. An `Err` is reported to the engine's caller and
/// is not retried.
pub trait DispatchSink: Send + Sync {
    fn submit(&self, request: &DispatchRequest) -> Result<()>;
}

impl<T: DispatchSink + ?Sized> DispatchSink for Arc<T> {
    fn submit(&self, request: &DispatchRequest) -> Result<()> {
        (**self).submit(request)
    }
}

/// Sink that keeps every request in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingSink {
    requests: Mutex<Vec<DispatchRequest>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything submitted so far.
    pub fn take(&self) -> Vec<DispatchRequest> {
        match self.requests.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl DispatchSink for RecordingSink {
    fn submit(&self, request: &DispatchRequest) -> Result<()> {
        self.requests
            .lock()
            .map_err(|_| crate::Error::Internal("recording sink poisoned".to_string()))?
            .push(request.clone());
        Ok(())
    }
}
