//! Orchestration trait driven by the daemon loop.

use async_trait::async_trait;

/// A unit of work fed by table consumers and driven by the daemon loop.
///
/// The loop calls `do_task()` whenever `has_pending_tasks()` reports queued
/// changes; everything runs on the loop's task.
#[async_trait]
pub trait Orch: Send {
    /// Returns the name of this Orch (for logging and debugging).
    fn name(&self) -> &str;

    /// Processes all queued changes.
    async fn do_task(&mut self);

    /// Returns true if this Orch has queued changes.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps queued changes for debugging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}
