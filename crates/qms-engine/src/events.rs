use chrono::NaiveDate;
use qms_core::{Action, ActionId};

/// Calendar/event publication for action due dates. Publishing is
/// best-effort: failures are logged and swallowed, never propagated into the
/// mutation that triggered them.
pub trait EventPublisher: Send + Sync {
    fn due_date_set(&self, action: &Action) -> anyhow::Result<()>;
    fn due_date_changed(&self, action: &Action, previous: NaiveDate) -> anyhow::Result<()>;
    fn due_date_cleared(&self, action_id: &ActionId) -> anyhow::Result<()>;
}

pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn due_date_set(&self, _action: &Action) -> anyhow::Result<()> {
        Ok(())
    }
    fn due_date_changed(&self, _action: &Action, _previous: NaiveDate) -> anyhow::Result<()> {
        Ok(())
    }
    fn due_date_cleared(&self, _action_id: &ActionId) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) fn publish_best_effort(what: &'static str, result: anyhow::Result<()>) {
    if let Err(error) = result {
        tracing::warn!(%error, "calendar publish failed: {what}");
    }
}
