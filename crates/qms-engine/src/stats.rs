use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use qms_core::{
    action_is_overdue, audit_conformity, rounded_percentage, ActionStatus, Audit, AuditConformity,
    AuditId, AuditStatus, Finding, FindingStatus,
};
use qms_store::{DocumentStore, Page};
use serde::Serialize;

use crate::error::{require, WorkflowResult};

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct AuditStats {
    pub total: usize,
    pub planned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub completion_rate: u32,
    pub average_conformity: u32,
    pub non_conformities: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub audits: usize,
    pub non_conformities: usize,
    pub completion_rate: u32,
    completed: usize,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct FindingStats {
    pub total: usize,
    pub registered: usize,
    pub action_planned: usize,
    pub action_executed: usize,
    pub analysis_completed: usize,
    pub closed: usize,
    pub average_progress: u32,
    pub requires_action: usize,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ActionStats {
    pub total: usize,
    pub planned: usize,
    pub in_execution: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub average_progress: u32,
    pub overdue: usize,
    pub verified_effective: usize,
    pub verified_not_effective: usize,
}

/// Read-side reductions over the entity collections. Nothing here persists
/// state; every figure is recomputed from a paged scan.
pub struct StatsEngine {
    store: Arc<dyn DocumentStore>,
}

impl StatsEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn audit_conformity(&self, id: &AuditId) -> WorkflowResult<AuditConformity> {
        let audit = require("audit", id.as_str(), self.store.get_audit(id)?)?;
        Ok(audit_conformity(&audit))
    }

    pub fn audit_stats(&self) -> WorkflowResult<AuditStats> {
        let mut stats = AuditStats::default();
        let mut weight_sum = 0u64;
        let mut verified = 0u64;
        self.scan_audits(|audit| {
            stats.total += 1;
            match audit.status {
                AuditStatus::Planned => stats.planned += 1,
                AuditStatus::InProgress => stats.in_progress += 1,
                AuditStatus::Completed => stats.completed += 1,
            }
            for v in &audit.verifications {
                if let Some(code) = v.conformity_status {
                    verified += 1;
                    weight_sum += u64::from(code.weight());
                    if code.is_non_conformity() {
                        stats.non_conformities += 1;
                    }
                }
            }
        })?;
        stats.completion_rate = rounded_percentage(stats.completed as u64, stats.total as u64);
        stats.average_conformity = if verified == 0 {
            0
        } else {
            ((weight_sum + verified / 2) / verified) as u32
        };
        Ok(stats)
    }

    /// Month-over-month buckets for a trailing window ending at `today`'s
    /// month. Audits are bucketed by planned date; empty buckets report a
    /// completion rate of 0.
    pub fn audit_trends(&self, months: u32, today: NaiveDate) -> WorkflowResult<Vec<MonthBucket>> {
        let months = months.max(1);
        let end = month_index(today.year(), today.month());
        let start = end + 1 - months as i64;
        let mut buckets: Vec<MonthBucket> = (start..=end)
            .map(|idx| {
                let (year, month) = from_month_index(idx);
                MonthBucket {
                    year,
                    month,
                    audits: 0,
                    non_conformities: 0,
                    completion_rate: 0,
                    completed: 0,
                }
            })
            .collect();
        self.scan_audits(|audit| {
            let idx = month_index(audit.planned_date.year(), audit.planned_date.month());
            if idx < start || idx > end {
                return;
            }
            let bucket = &mut buckets[(idx - start) as usize];
            bucket.audits += 1;
            if audit.status == AuditStatus::Completed {
                bucket.completed += 1;
            }
            bucket.non_conformities += audit_conformity(audit).non_conformities;
        })?;
        for bucket in &mut buckets {
            bucket.completion_rate =
                rounded_percentage(bucket.completed as u64, bucket.audits as u64);
        }
        Ok(buckets)
    }

    pub fn finding_stats(&self) -> WorkflowResult<FindingStats> {
        let mut stats = FindingStats::default();
        let mut progress_sum = 0u64;
        let mut visit = |finding: &Finding| {
            stats.total += 1;
            progress_sum += u64::from(finding.progress);
            match finding.status {
                FindingStatus::Registered => stats.registered += 1,
                FindingStatus::ActionPlanned => stats.action_planned += 1,
                FindingStatus::ActionExecuted => stats.action_executed += 1,
                FindingStatus::AnalysisCompleted => stats.analysis_completed += 1,
                FindingStatus::Closed => stats.closed += 1,
            }
            if finding
                .root_cause_analysis
                .as_ref()
                .is_some_and(|rca| rca.requires_action)
            {
                stats.requires_action += 1;
            }
        };
        let mut page = Page::first();
        loop {
            let batch = self.store.list_findings(page)?;
            let done = batch.len() < page.limit;
            for finding in &batch {
                visit(finding);
            }
            if done {
                break;
            }
            page = page.next();
        }
        stats.average_progress = if stats.total == 0 {
            0
        } else {
            ((progress_sum + stats.total as u64 / 2) / stats.total as u64) as u32
        };
        Ok(stats)
    }

    pub fn action_stats(&self, today: NaiveDate) -> WorkflowResult<ActionStats> {
        let mut stats = ActionStats::default();
        let mut progress_sum = 0u64;
        let mut page = Page::first();
        loop {
            let batch = self.store.list_actions(page)?;
            let done = batch.len() < page.limit;
            for action in &batch {
                stats.total += 1;
                progress_sum += u64::from(action.progress_percentage);
                match action.status {
                    ActionStatus::Planned => stats.planned += 1,
                    ActionStatus::InExecution => stats.in_execution += 1,
                    ActionStatus::Completed => stats.completed += 1,
                    ActionStatus::Cancelled => stats.cancelled += 1,
                }
                if action_is_overdue(action, today) {
                    stats.overdue += 1;
                }
                match action.is_effective {
                    Some(true) => stats.verified_effective += 1,
                    Some(false) => stats.verified_not_effective += 1,
                    None => {}
                }
            }
            if done {
                break;
            }
            page = page.next();
        }
        stats.average_progress = if stats.total == 0 {
            0
        } else {
            ((progress_sum + stats.total as u64 / 2) / stats.total as u64) as u32
        };
        Ok(stats)
    }

    fn scan_audits(&self, mut visit: impl FnMut(&Audit)) -> WorkflowResult<()> {
        let mut page = Page::first();
        loop {
            let batch = self.store.list_audits(page)?;
            let done = batch.len() < page.limit;
            for audit in &batch {
                visit(audit);
            }
            if done {
                return Ok(());
            }
            page = page.next();
        }
    }
}

fn month_index(year: i32, month: u32) -> i64 {
    i64::from(year) * 12 + i64::from(month) - 1
}

fn from_month_index(idx: i64) -> (i32, u32) {
    ((idx.div_euclid(12)) as i32, (idx.rem_euclid(12)) as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_index_round_trips() {
        assert_eq!(from_month_index(month_index(2026, 1)), (2026, 1));
        assert_eq!(from_month_index(month_index(2026, 12)), (2026, 12));
        assert_eq!(from_month_index(month_index(2025, 11) + 2), (2026, 1));
    }

    #[test]
    fn trailing_window_spans_year_boundary() {
        let end = month_index(2026, 2);
        let start = end + 1 - 4;
        let months: Vec<(i32, u32)> = (start..=end).map(from_month_index).collect();
        assert_eq!(months, vec![(2025, 11), (2025, 12), (2026, 1), (2026, 2)]);
    }
}
