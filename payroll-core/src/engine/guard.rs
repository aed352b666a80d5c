use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::PayrollError;

/// In-process exclusion for work on a single run.
///
/// Generation, entry edits and status changes on the same run never
/// overlap; a second caller fails fast with [`PayrollError::Conflict`]
/// instead of waiting.
#[derive(Debug, Default)]
pub struct RunGuard {
    busy: Mutex<HashSet<i64>>,
}

impl RunGuard {
    pub fn acquire(
        &self,
        run_id: i64,
    ) -> Result<RunLease<'_>, PayrollError> {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(run_id) {
            tracing::debug!(run_id, "run is busy");
            return Err(PayrollError::Conflict { run_id });
        }
        Ok(RunLease { guard: self, run_id })
    }

    fn release(
        &self,
        run_id: i64,
    ) {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(&run_id);
    }
}

/// Held while a run is being worked on; released on drop.
#[derive(Debug)]
pub struct RunLease<'a> {
    guard: &'a RunGuard,
    run_id: i64,
}

impl Drop for RunLease<'_> {
    fn drop(&mut self) {
        self.guard.release(self.run_id);
    }
}
