use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use qms_core::{
    Action, ActionId, Audit, AuditId, ComplianceRelation, Finding, FindingId, NormPoint,
    NormPointId, RelationId, SubjectType,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{DocumentStore, Page};

/// In-memory store for tests. Not durable, but implements the full
/// soft-delete and compare-and-swap contract of the trait.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    norm_points: HashMap<String, NormPoint>,
    relations: HashMap<String, ComplianceRelation>,
    audits: HashMap<String, Audit>,
    findings: HashMap<String, Finding>,
    actions: HashMap<String, Action>,
    sequences: HashMap<(String, i32), u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page_of<T: Clone>(
    items: impl Iterator<Item = T>,
    page: Page,
    key: impl Fn(&T) -> (DateTime<Utc>, String),
) -> Vec<T> {
    let mut all: Vec<T> = items.collect();
    all.sort_by_key(|item| key(item));
    all.into_iter().skip(page.offset).take(page.limit).collect()
}

fn cas_update<T>(
    slot: Option<&mut T>,
    collection: &'static str,
    id: &str,
    read_version: u64,
    stored_version: impl Fn(&T) -> u64,
    apply: impl FnOnce(&mut T),
) -> StoreResult<()> {
    let entity = slot.ok_or_else(|| StoreError::MissingRow {
        collection,
        id: id.to_string(),
    })?;
    if stored_version(entity) != read_version {
        return Err(StoreError::VersionConflict {
            collection,
            id: id.to_string(),
            expected: read_version,
        });
    }
    apply(entity);
    Ok(())
}

impl DocumentStore for InMemoryStore {
    fn insert_norm_point(&self, point: NormPoint) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.norm_points.contains_key(point.id.as_str()) {
            return Err(StoreError::DuplicateKey {
                collection: "norm_points",
                key: point.id.to_string(),
            });
        }
        inner.norm_points.insert(point.id.0.clone(), point);
        Ok(())
    }

    fn get_norm_point(&self, id: &NormPointId) -> StoreResult<Option<NormPoint>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .norm_points
            .get(id.as_str())
            .filter(|p| p.deleted_at.is_none())
            .cloned())
    }

    fn get_norm_point_by_code(&self, code: &str) -> StoreResult<Option<NormPoint>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .norm_points
            .values()
            .find(|p| p.deleted_at.is_none() && p.code() == code)
            .cloned())
    }

    fn list_norm_points(&self, page: Page) -> StoreResult<Vec<NormPoint>> {
        let inner = self.inner.lock().unwrap();
        Ok(page_of(
            inner.norm_points.values().filter(|p| p.deleted_at.is_none()).cloned(),
            page,
            |p| (p.created_at, p.id.to_string()),
        ))
    }

    fn count_norm_points(&self) -> StoreResult<usize> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.norm_points.values().filter(|p| p.deleted_at.is_none()).count())
    }

    fn insert_relation(&self, relation: ComplianceRelation) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.relations.contains_key(relation.id.as_str()) {
            return Err(StoreError::DuplicateKey {
                collection: "relations",
                key: relation.id.to_string(),
            });
        }
        inner.relations.insert(relation.id.0.clone(), relation);
        Ok(())
    }

    fn get_relation(&self, id: &RelationId) -> StoreResult<Option<ComplianceRelation>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .relations
            .get(id.as_str())
            .filter(|r| r.deleted_at.is_none())
            .cloned())
    }

    fn find_relation(
        &self,
        norm_point_id: &NormPointId,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> StoreResult<Option<ComplianceRelation>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .relations
            .values()
            .find(|r| {
                r.deleted_at.is_none()
                    && r.norm_point_id == *norm_point_id
                    && r.subject_type == subject_type
                    && r.subject_id == subject_id
            })
            .cloned())
    }

    fn update_relation(&self, relation: &ComplianceRelation) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = relation.id.0.clone();
        let mut next = relation.clone();
        next.version += 1;
        cas_update(
            inner.relations.get_mut(&id),
            "relations",
            &id,
            relation.version,
            |r| r.version,
            |r| *r = next,
        )
    }

    fn list_relations(&self, page: Page) -> StoreResult<Vec<ComplianceRelation>> {
        let inner = self.inner.lock().unwrap();
        Ok(page_of(
            inner.relations.values().filter(|r| r.deleted_at.is_none()).cloned(),
            page,
            |r| (r.created_at, r.id.to_string()),
        ))
    }

    fn delete_relation(&self, id: &RelationId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.relations.get_mut(id.as_str()) {
            r.deleted_at = Some(at);
        }
        Ok(())
    }

    fn insert_audit(&self, audit: Audit) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.audits.contains_key(audit.id.as_str()) {
            return Err(StoreError::DuplicateKey {
                collection: "audits",
                key: audit.id.to_string(),
            });
        }
        inner.audits.insert(audit.id.0.clone(), audit);
        Ok(())
    }

    fn get_audit(&self, id: &AuditId) -> StoreResult<Option<Audit>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .audits
            .get(id.as_str())
            .filter(|a| a.deleted_at.is_none())
            .cloned())
    }

    fn update_audit(&self, audit: &Audit) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = audit.id.0.clone();
        let mut next = audit.clone();
        next.version += 1;
        cas_update(
            inner.audits.get_mut(&id),
            "audits",
            &id,
            audit.version,
            |a| a.version,
            |a| *a = next,
        )
    }

    fn list_audits(&self, page: Page) -> StoreResult<Vec<Audit>> {
        let inner = self.inner.lock().unwrap();
        Ok(page_of(
            inner.audits.values().filter(|a| a.deleted_at.is_none()).cloned(),
            page,
            |a| (a.created_at, a.id.to_string()),
        ))
    }

    fn delete_audit(&self, id: &AuditId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.audits.get_mut(id.as_str()) {
            a.deleted_at = Some(at);
        }
        Ok(())
    }

    fn insert_finding(&self, finding: Finding) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.findings.contains_key(finding.id.as_str()) {
            return Err(StoreError::DuplicateKey {
                collection: "findings",
                key: finding.id.to_string(),
            });
        }
        inner.findings.insert(finding.id.0.clone(), finding);
        Ok(())
    }

    fn get_finding(&self, id: &FindingId) -> StoreResult<Option<Finding>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .findings
            .get(id.as_str())
            .filter(|f| f.deleted_at.is_none())
            .cloned())
    }

    fn update_finding(&self, finding: &Finding) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = finding.id.0.clone();
        let mut next = finding.clone();
        next.version += 1;
        cas_update(
            inner.findings.get_mut(&id),
            "findings",
            &id,
            finding.version,
            |f| f.version,
            |f| *f = next,
        )
    }

    fn list_findings(&self, page: Page) -> StoreResult<Vec<Finding>> {
        let inner = self.inner.lock().unwrap();
        Ok(page_of(
            inner.findings.values().filter(|f| f.deleted_at.is_none()).cloned(),
            page,
            |f| (f.created_at, f.id.to_string()),
        ))
    }

    fn delete_finding(&self, id: &FindingId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(f) = inner.findings.get_mut(id.as_str()) {
            f.deleted_at = Some(at);
        }
        Ok(())
    }

    fn insert_action(&self, action: Action) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.actions.contains_key(action.id.as_str()) {
            return Err(StoreError::DuplicateKey {
                collection: "actions",
                key: action.id.to_string(),
            });
        }
        inner.actions.insert(action.id.0.clone(), action);
        Ok(())
    }

    fn get_action(&self, id: &ActionId) -> StoreResult<Option<Action>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .actions
            .get(id.as_str())
            .filter(|a| a.deleted_at.is_none())
            .cloned())
    }

    fn update_action(&self, action: &Action) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let id = action.id.0.clone();
        let mut next = action.clone();
        next.version += 1;
        cas_update(
            inner.actions.get_mut(&id),
            "actions",
            &id,
            action.version,
            |a| a.version,
            |a| *a = next,
        )
    }

    fn list_actions(&self, page: Page) -> StoreResult<Vec<Action>> {
        let inner = self.inner.lock().unwrap();
        Ok(page_of(
            inner.actions.values().filter(|a| a.deleted_at.is_none()).cloned(),
            page,
            |a| (a.created_at, a.id.to_string()),
        ))
    }

    fn list_actions_for_finding(&self, finding_id: &FindingId) -> StoreResult<Vec<Action>> {
        let inner = self.inner.lock().unwrap();
        let mut actions: Vec<Action> = inner
            .actions
            .values()
            .filter(|a| a.deleted_at.is_none() && a.finding_id == *finding_id)
            .cloned()
            .collect();
        actions.sort_by_key(|a| (a.created_at, a.id.to_string()));
        Ok(actions)
    }

    fn delete_action(&self, id: &ActionId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.actions.get_mut(id.as_str()) {
            a.deleted_at = Some(at);
        }
        Ok(())
    }

    fn next_sequence(&self, collection: &str, year: i32) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let counter = inner
            .sequences
            .entry((collection.to_string(), year))
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use qms_core::{AuditStatus, AuditType, UserId};

    fn audit(id: &str) -> Audit {
        Audit {
            id: AuditId::from_str(id),
            audit_number: "AUD-2026-00001".into(),
            title: "t".into(),
            audit_type: AuditType::Partial,
            scope: "s".into(),
            planned_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            lead_auditor: UserId::from_str("u1"),
            selected_norm_points: vec!["4.4".into()],
            status: AuditStatus::Planned,
            verifications: vec![],
            opening_meeting: None,
            closing_meeting: None,
            report_delivery: None,
            previous_actions_verification: None,
            observations: None,
            execution_started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            created_by: UserId::from_str("u1"),
            updated_by: None,
            version: 1,
            deleted_at: None,
        }
    }

    #[test]
    fn insert_and_get_audit() {
        let store = InMemoryStore::new();
        store.insert_audit(audit("a1")).unwrap();
        let got = store.get_audit(&AuditId::from_str("a1")).unwrap().unwrap();
        assert_eq!(got.id.as_str(), "a1");
    }

    #[test]
    fn duplicate_insert_rejected() {
        let store = InMemoryStore::new();
        store.insert_audit(audit("a1")).unwrap();
        let err = store.insert_audit(audit("a1")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn cas_update_bumps_version_and_detects_stale_reads() {
        let store = InMemoryStore::new();
        store.insert_audit(audit("a1")).unwrap();

        let read = store.get_audit(&AuditId::from_str("a1")).unwrap().unwrap();
        let mut first = read.clone();
        first.title = "first writer".into();
        store.update_audit(&first).unwrap();

        // second writer still holds the old version
        let mut second = read;
        second.title = "second writer".into();
        let err = store.update_audit(&second).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        let current = store.get_audit(&AuditId::from_str("a1")).unwrap().unwrap();
        assert_eq!(current.title, "first writer");
        assert_eq!(current.version, 2);
    }

    #[test]
    fn soft_deleted_records_are_invisible() {
        let store = InMemoryStore::new();
        store.insert_audit(audit("a1")).unwrap();
        store.delete_audit(&AuditId::from_str("a1"), Utc::now()).unwrap();
        assert!(store.get_audit(&AuditId::from_str("a1")).unwrap().is_none());
        assert!(store.list_audits(Page::first()).unwrap().is_empty());
    }

    #[test]
    fn paging_walks_the_collection() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.insert_audit(audit(&format!("a{i}"))).unwrap();
        }
        let p1 = store.list_audits(Page::new(0, 2)).unwrap();
        let p2 = store.list_audits(Page::new(2, 2)).unwrap();
        let p3 = store.list_audits(Page::new(4, 2)).unwrap();
        assert_eq!(p1.len(), 2);
        assert_eq!(p2.len(), 2);
        assert_eq!(p3.len(), 1);
    }

    #[test]
    fn sequences_are_monotonic_per_collection_year() {
        let store = InMemoryStore::new();
        assert_eq!(store.next_sequence("audits", 2026).unwrap(), 1);
        assert_eq!(store.next_sequence("audits", 2026).unwrap(), 2);
        assert_eq!(store.next_sequence("audits", 2025).unwrap(), 1);
        assert_eq!(store.next_sequence("findings", 2026).unwrap(), 1);
    }
}
