use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use qms_core::{
    action_is_overdue, clamp_percentage, format_number, Action, ActionId, ActionStatus,
    CreateAction, NumberSeries, UserId, VerifyEffectiveness,
};
use qms_store::{DocumentStore, Page};
use qms_validate::Validate;
use serde::Serialize;

use crate::error::{require, WorkflowError, WorkflowResult};
use crate::events::{publish_best_effort, EventPublisher};
use crate::retry::with_retry;

/// An action as read back by callers: overdue is recomputed on every read,
/// never persisted.
#[derive(Clone, Debug, Serialize)]
pub struct ActionView {
    pub is_overdue: bool,
    #[serde(flatten)]
    pub action: Action,
}

/// Corrective action lifecycle. Completion and effectiveness verification
/// are independent: `verify_effectiveness` may run in any status.
pub struct ActionWorkflow {
    store: Arc<dyn DocumentStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl ActionWorkflow {
    pub fn new(store: Arc<dyn DocumentStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    pub fn create_from_finding(
        &self,
        input: CreateAction,
        actor: &UserId,
    ) -> WorkflowResult<Action> {
        input.validate()?;
        require(
            "finding",
            input.finding_id.as_str(),
            self.store.get_finding(&input.finding_id)?,
        )?;
        let now = Utc::now();
        let year = now.year();
        let sequence = self
            .store
            .next_sequence(NumberSeries::Action.collection(), year)?;
        let action = Action {
            id: ActionId::new(),
            action_number: format_number(NumberSeries::Action, year, sequence),
            title: input.title,
            description: input.description,
            finding_id: input.finding_id,
            responsible: input.responsible,
            planned_date: input.planned_date,
            priority: input.priority,
            status: ActionStatus::Planned,
            progress_percentage: 0,
            start_date: None,
            completion_date: None,
            is_effective: None,
            verification_date: None,
            verification_notes: None,
            follow_up_required: false,
            follow_up_description: None,
            evidence: None,
            comments: input.comments.into_iter().collect(),
            created_at: now,
            created_by: actor.clone(),
            updated_by: None,
            version: 1,
            deleted_at: None,
        };
        self.store.insert_action(action.clone())?;
        publish_best_effort("due_date_set", self.publisher.due_date_set(&action));
        Ok(action)
    }

    pub fn get(&self, id: &ActionId) -> WorkflowResult<ActionView> {
        let action = require("action", id.as_str(), self.store.get_action(id)?)?;
        Ok(self.view(action))
    }

    fn view(&self, action: Action) -> ActionView {
        ActionView {
            is_overdue: action_is_overdue(&action, Utc::now().date_naive()),
            action,
        }
    }

    pub fn list(&self, status: Option<ActionStatus>) -> WorkflowResult<Vec<ActionView>> {
        let mut all = Vec::new();
        let mut page = Page::first();
        loop {
            let batch = self.store.list_actions(page)?;
            let done = batch.len() < page.limit;
            all.extend(
                batch
                    .into_iter()
                    .filter(|a| status.map_or(true, |s| a.status == s))
                    .map(|a| self.view(a)),
            );
            if done {
                break;
            }
            page = page.next();
        }
        Ok(all)
    }

    pub fn list_for_finding(
        &self,
        finding_id: &qms_core::FindingId,
    ) -> WorkflowResult<Vec<ActionView>> {
        Ok(self
            .store
            .list_actions_for_finding(finding_id)?
            .into_iter()
            .map(|a| self.view(a))
            .collect())
    }

    /// Completed and cancelled are terminal. Moving into execution stamps
    /// the start date; completing stamps the completion date and forces
    /// progress to 100.
    pub fn update_status(
        &self,
        id: &ActionId,
        new_status: ActionStatus,
        comment: Option<String>,
        actor: &UserId,
    ) -> WorkflowResult<Action> {
        let action = with_retry("action", id.as_str(), || {
            let mut action = self.load(id)?;
            if action.status == new_status {
                // no transition, but a supplied comment still lands
                if let Some(comment) = &comment {
                    action.comments.push(comment.clone());
                    action.updated_by = Some(actor.clone());
                    self.store.update_action(&action)?;
                    action.version += 1;
                }
                return Ok(action);
            }
            if is_terminal(action.status) {
                return Err(invalid_state("update_status", &action));
            }
            let today = Utc::now().date_naive();
            match new_status {
                ActionStatus::InExecution => {
                    action.start_date.get_or_insert(today);
                }
                ActionStatus::Completed => {
                    action.completion_date = Some(today);
                    action.progress_percentage = 100;
                }
                ActionStatus::Planned | ActionStatus::Cancelled => {}
            }
            action.status = new_status;
            if let Some(comment) = &comment {
                action.comments.push(comment.clone());
            }
            action.updated_by = Some(actor.clone());
            self.store.update_action(&action)?;
            action.version += 1;
            Ok(action)
        })?;
        if new_status == ActionStatus::Cancelled {
            publish_best_effort("due_date_cleared", self.publisher.due_date_cleared(id));
        }
        Ok(action)
    }

    /// Clamps into [0, 100]. A planned action with progress above zero is
    /// promoted to in_execution (progress may advance status, never regress
    /// it).
    pub fn track_progress(
        &self,
        id: &ActionId,
        percentage: i64,
        comment: Option<String>,
        actor: &UserId,
    ) -> WorkflowResult<Action> {
        with_retry("action", id.as_str(), || {
            let mut action = self.load(id)?;
            if is_terminal(action.status) {
                return Err(invalid_state("track_progress", &action));
            }
            let clamped = clamp_percentage(percentage);
            action.progress_percentage = clamped;
            if action.status == ActionStatus::Planned && clamped > 0 {
                action.status = ActionStatus::InExecution;
                action.start_date.get_or_insert(Utc::now().date_naive());
            }
            if let Some(comment) = &comment {
                action.comments.push(comment.clone());
            }
            action.updated_by = Some(actor.clone());
            self.store.update_action(&action)?;
            action.version += 1;
            Ok(action)
        })
    }

    /// Not gated by status: effectiveness may be recorded before completion
    /// and the two axes may diverge.
    pub fn verify_effectiveness(
        &self,
        id: &ActionId,
        input: VerifyEffectiveness,
        actor: &UserId,
    ) -> WorkflowResult<Action> {
        input.validate()?;
        with_retry("action", id.as_str(), || {
            let mut action = self.load(id)?;
            action.is_effective = Some(input.is_effective);
            action.verification_date = Some(input.verification_date);
            action.verification_notes = input.notes.clone();
            action.follow_up_required = input.follow_up_required;
            action.follow_up_description = input.follow_up_description.clone();
            action.updated_by = Some(actor.clone());
            self.store.update_action(&action)?;
            action.version += 1;
            Ok(action)
        })
    }

    /// Convenience: completed + progress 100 + closing evidence in one call.
    /// Does not run effectiveness verification.
    pub fn close(
        &self,
        id: &ActionId,
        evidence: String,
        comment: Option<String>,
        actor: &UserId,
    ) -> WorkflowResult<Action> {
        with_retry("action", id.as_str(), || {
            let mut action = self.load(id)?;
            if is_terminal(action.status) {
                return Err(invalid_state("close", &action));
            }
            action.status = ActionStatus::Completed;
            action.progress_percentage = 100;
            action.completion_date = Some(Utc::now().date_naive());
            action.evidence = Some(evidence.clone());
            if let Some(comment) = &comment {
                action.comments.push(comment.clone());
            }
            action.updated_by = Some(actor.clone());
            self.store.update_action(&action)?;
            action.version += 1;
            Ok(action)
        })
    }

    /// Named reschedule so the calendar collaborator sees due-date changes.
    pub fn reschedule(
        &self,
        id: &ActionId,
        new_date: NaiveDate,
        actor: &UserId,
    ) -> WorkflowResult<Action> {
        let mut previous = None;
        let action = with_retry("action", id.as_str(), || {
            let mut action = self.load(id)?;
            if is_terminal(action.status) {
                return Err(invalid_state("reschedule", &action));
            }
            previous = Some(action.planned_date);
            action.planned_date = new_date;
            action.updated_by = Some(actor.clone());
            self.store.update_action(&action)?;
            action.version += 1;
            Ok(action)
        })?;
        if let Some(previous) = previous {
            publish_best_effort(
                "due_date_changed",
                self.publisher.due_date_changed(&action, previous),
            );
        }
        Ok(action)
    }

    pub fn delete(&self, id: &ActionId) -> WorkflowResult<()> {
        self.load(id)?;
        self.store.delete_action(id, Utc::now())?;
        publish_best_effort("due_date_cleared", self.publisher.due_date_cleared(id));
        Ok(())
    }

    fn load(&self, id: &ActionId) -> WorkflowResult<Action> {
        require("action", id.as_str(), self.store.get_action(id)?)
    }
}

fn is_terminal(status: ActionStatus) -> bool {
    matches!(status, ActionStatus::Completed | ActionStatus::Cancelled)
}

fn invalid_state(operation: &'static str, action: &Action) -> WorkflowError {
    WorkflowError::InvalidState {
        entity: "action",
        operation,
        status: format!("{:?}", action.status).to_lowercase(),
    }
}
