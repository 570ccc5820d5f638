use std::sync::Arc;

use chrono::Utc;
use qms_core::{
    rounded_percentage, ComplianceRelation, ComplianceStatus, NormPointId, RecordRelation,
    RelationId, SubjectType, UserId,
};
use qms_store::{DocumentStore, Page};
use qms_validate::{FieldErrors, Validate};
use serde::Serialize;

use crate::error::{require, WorkflowResult};
use crate::registry::NormPointRegistry;
use crate::retry::with_retry;

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ComplianceCounts {
    pub total: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub partial: usize,
    pub not_applicable: usize,
}

impl ComplianceCounts {
    fn add(&mut self, status: ComplianceStatus) {
        self.total += 1;
        match status {
            ComplianceStatus::Compliant => self.compliant += 1,
            ComplianceStatus::NonCompliant => self.non_compliant += 1,
            ComplianceStatus::Partial => self.partial += 1,
            ComplianceStatus::NotApplicable => self.not_applicable += 1,
        }
    }

    /// Zero relations yields 0, not a division error.
    pub fn compliance_percentage(&self) -> u32 {
        rounded_percentage(self.compliant as u64, self.total as u64)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SubjectTypeBreakdown {
    pub subject_type: SubjectType,
    pub counts: ComplianceCounts,
    pub compliance_percentage: u32,
}

/// Aggregated rollup of the whole ledger, computed on read.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ComplianceMatrix {
    pub counts: ComplianceCounts,
    pub compliance_percentage: u32,
    pub by_subject_type: Vec<SubjectTypeBreakdown>,
}

/// Records, per (norm point, subject) pair, a compliance classification with
/// evidence and verification metadata. One live relation per pair.
pub struct RelationLedger {
    store: Arc<dyn DocumentStore>,
    registry: NormPointRegistry,
}

impl RelationLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let registry = NormPointRegistry::new(store.clone());
        Self { store, registry }
    }

    pub fn record(&self, input: RecordRelation, actor: &UserId) -> WorkflowResult<ComplianceRelation> {
        input.validate()?;
        let point = self.registry.by_code(input.norm_point_code.trim())?;
        if self
            .store
            .find_relation(&point.id, input.subject_type, &input.subject_id)?
            .is_some()
        {
            let mut errors = FieldErrors::new();
            errors.push(
                "subject_id",
                format!(
                    "{} {} already has a relation for norm point {}; reclassify it instead",
                    input.subject_type.as_str(),
                    input.subject_id,
                    point.code()
                ),
            );
            return Err(errors.into());
        }
        let now = Utc::now();
        let relation = ComplianceRelation {
            id: RelationId::new(),
            norm_point_id: point.id,
            subject_type: input.subject_type,
            subject_id: input.subject_id,
            compliance_status: input.compliance_status,
            evidence: input.evidence,
            notes: input.notes,
            last_verified_at: Some(now),
            verified_by: Some(actor.clone()),
            created_at: now,
            created_by: actor.clone(),
            version: 1,
            deleted_at: None,
        };
        self.store.insert_relation(relation.clone())?;
        Ok(relation)
    }

    pub fn get(&self, id: &RelationId) -> WorkflowResult<ComplianceRelation> {
        require("compliance_relation", id.as_str(), self.store.get_relation(id)?)
    }

    /// Re-verification of an existing relation: new classification, fresh
    /// evidence, and a new verification stamp.
    pub fn reclassify(
        &self,
        id: &RelationId,
        status: ComplianceStatus,
        evidence: Vec<String>,
        notes: Option<String>,
        actor: &UserId,
    ) -> WorkflowResult<ComplianceRelation> {
        with_retry("compliance_relation", id.as_str(), || {
            let mut relation = self.get(id)?;
            relation.compliance_status = status;
            if !evidence.is_empty() {
                relation.evidence.extend(evidence.iter().cloned());
            }
            if notes.is_some() {
                relation.notes = notes.clone();
            }
            relation.last_verified_at = Some(Utc::now());
            relation.verified_by = Some(actor.clone());
            self.store.update_relation(&relation)?;
            relation.version += 1;
            Ok(relation)
        })
    }

    pub fn delete(&self, id: &RelationId) -> WorkflowResult<()> {
        self.get(id)?;
        self.store.delete_relation(id, Utc::now())?;
        Ok(())
    }

    pub fn list_for_subject(
        &self,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> WorkflowResult<Vec<ComplianceRelation>> {
        let mut out = Vec::new();
        self.scan(|relation| {
            if relation.subject_type == subject_type && relation.subject_id == subject_id {
                out.push(relation.clone());
            }
        })?;
        Ok(out)
    }

    pub fn list_for_norm_point(
        &self,
        norm_point_id: &NormPointId,
    ) -> WorkflowResult<Vec<ComplianceRelation>> {
        let mut out = Vec::new();
        self.scan(|relation| {
            if relation.norm_point_id == *norm_point_id {
                out.push(relation.clone());
            }
        })?;
        Ok(out)
    }

    /// Page-by-page accumulation; the matrix never materializes the ledger.
    pub fn matrix(&self) -> WorkflowResult<ComplianceMatrix> {
        let mut overall = ComplianceCounts::default();
        let mut per_type: [ComplianceCounts; 4] = Default::default();
        self.scan(|relation| {
            overall.add(relation.compliance_status);
            let slot = SubjectType::ALL
                .iter()
                .position(|t| *t == relation.subject_type)
                .unwrap_or(0);
            per_type[slot].add(relation.compliance_status);
        })?;
        Ok(ComplianceMatrix {
            compliance_percentage: overall.compliance_percentage(),
            counts: overall,
            by_subject_type: SubjectType::ALL
                .iter()
                .zip(per_type.iter())
                .map(|(subject_type, counts)| SubjectTypeBreakdown {
                    subject_type: *subject_type,
                    counts: *counts,
                    compliance_percentage: counts.compliance_percentage(),
                })
                .collect(),
        })
    }

    fn scan(&self, mut visit: impl FnMut(&ComplianceRelation)) -> WorkflowResult<()> {
        let mut page = Page::first();
        loop {
            let batch = self.store.list_relations(page)?;
            let done = batch.len() < page.limit;
            for relation in &batch {
                visit(relation);
            }
            if done {
                return Ok(());
            }
            page = page.next();
        }
    }
}
