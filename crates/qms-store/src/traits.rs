use chrono::{DateTime, Utc};
use qms_core::{
    Action, ActionId, Audit, AuditId, ComplianceRelation, Finding, FindingId, NormPoint,
    NormPointId, RelationId, SubjectType,
};

use crate::error::StoreResult;

/// Offset/limit window for list scans. Aggregations walk pages rather than
/// materializing whole collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 200;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn first() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }

    pub fn next(&self) -> Self {
        Self::new(self.offset + self.limit, self.limit)
    }
}

/// Document-store access for the workflow engine. Every collection is
/// soft-delete aware: `get_*` returns `None` for tombstoned records and
/// `list_*`/`count_*` exclude them.
///
/// `update_*` is compare-and-swap: the entity is persisted with
/// `version + 1` only if the stored version still equals the version the
/// caller read; otherwise `StoreError::VersionConflict`.
pub trait DocumentStore: Send + Sync {
    // --- norm points ---
    fn insert_norm_point(&self, point: NormPoint) -> StoreResult<()>;
    fn get_norm_point(&self, id: &NormPointId) -> StoreResult<Option<NormPoint>>;
    fn get_norm_point_by_code(&self, code: &str) -> StoreResult<Option<NormPoint>>;
    fn list_norm_points(&self, page: Page) -> StoreResult<Vec<NormPoint>>;
    fn count_norm_points(&self) -> StoreResult<usize>;

    // --- compliance relations ---
    fn insert_relation(&self, relation: ComplianceRelation) -> StoreResult<()>;
    fn get_relation(&self, id: &RelationId) -> StoreResult<Option<ComplianceRelation>>;
    fn find_relation(
        &self,
        norm_point_id: &NormPointId,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> StoreResult<Option<ComplianceRelation>>;
    fn update_relation(&self, relation: &ComplianceRelation) -> StoreResult<()>;
    fn list_relations(&self, page: Page) -> StoreResult<Vec<ComplianceRelation>>;
    fn delete_relation(&self, id: &RelationId, at: DateTime<Utc>) -> StoreResult<()>;

    // --- audits ---
    fn insert_audit(&self, audit: Audit) -> StoreResult<()>;
    fn get_audit(&self, id: &AuditId) -> StoreResult<Option<Audit>>;
    fn update_audit(&self, audit: &Audit) -> StoreResult<()>;
    fn list_audits(&self, page: Page) -> StoreResult<Vec<Audit>>;
    fn delete_audit(&self, id: &AuditId, at: DateTime<Utc>) -> StoreResult<()>;

    // --- findings ---
    fn insert_finding(&self, finding: Finding) -> StoreResult<()>;
    fn get_finding(&self, id: &FindingId) -> StoreResult<Option<Finding>>;
    fn update_finding(&self, finding: &Finding) -> StoreResult<()>;
    fn list_findings(&self, page: Page) -> StoreResult<Vec<Finding>>;
    fn delete_finding(&self, id: &FindingId, at: DateTime<Utc>) -> StoreResult<()>;

    // --- actions ---
    fn insert_action(&self, action: Action) -> StoreResult<()>;
    fn get_action(&self, id: &ActionId) -> StoreResult<Option<Action>>;
    fn update_action(&self, action: &Action) -> StoreResult<()>;
    fn list_actions(&self, page: Page) -> StoreResult<Vec<Action>>;
    fn list_actions_for_finding(&self, finding_id: &FindingId) -> StoreResult<Vec<Action>>;
    fn delete_action(&self, id: &ActionId, at: DateTime<Utc>) -> StoreResult<()>;

    // --- numbering ---
    /// Next value of the monotonic per-collection-per-year sequence,
    /// starting at 1. Backends must make this safe against concurrent
    /// callers (no clock-derived suffixes).
    fn next_sequence(&self, collection: &str, year: i32) -> StoreResult<u64>;
}
