use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use qms_core::{
    Action, ActionId, Audit, AuditId, ComplianceRelation, Finding, FindingId, NormPoint,
    NormPointId, RelationId, SubjectType,
};
use qms_store::{DocumentStore, Page, StoreError, StoreResult};

/// Durable backend. One connection behind a mutex; entities live as JSON
/// documents next to the columns queries need.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).map_err(backend)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(backend)?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert_doc<T: Serialize>(
        &self,
        collection: &'static str,
        sql: &str,
        id: &str,
        created_at: DateTime<Utc>,
        version: u64,
        extra: &[&dyn rusqlite::ToSql],
        entity: &T,
    ) -> StoreResult<()> {
        let doc = serde_json::to_string(entity)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        let created = created_at.to_rfc3339();
        let version = version as i64;
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&id, &doc, &created, &version];
        values.extend_from_slice(extra);
        match conn.execute(sql, values.as_slice()) {
            Ok(_) => Ok(()),
            Err(e) if is_constraint(&e) => Err(StoreError::DuplicateKey {
                collection,
                key: id.to_string(),
            }),
            Err(e) => Err(backend(e)),
        }
    }

    fn get_doc<T: DeserializeOwned>(&self, table: &str, id: &str) -> StoreResult<Option<T>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT doc FROM {table} WHERE id=?1 AND deleted_at IS NULL");
        let doc: Option<String> = conn
            .query_row(&sql, params![id], |r| r.get(0))
            .map(Some)
            .or_else(not_found_as_none)?;
        doc.map(|d| parse_doc(&d)).transpose()
    }

    fn list_docs<T: DeserializeOwned>(&self, table: &str, page: Page) -> StoreResult<Vec<T>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT doc FROM {table} WHERE deleted_at IS NULL \
             ORDER BY created_at, id LIMIT ?1 OFFSET ?2"
        );
        let mut stmt = conn.prepare(&sql).map_err(backend)?;
        let rows = stmt
            .query_map(params![page.limit as i64, page.offset as i64], |r| {
                r.get::<_, String>(0)
            })
            .map_err(backend)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(parse_doc(&row.map_err(backend)?)?);
        }
        Ok(out)
    }

    /// Compare-and-swap: writes `entity` with version + 1 only while the
    /// stored row still carries the version the caller read.
    fn update_doc<T: Serialize>(
        &self,
        collection: &'static str,
        table: &str,
        id: &str,
        read_version: u64,
        next: &T,
    ) -> StoreResult<()> {
        let doc = serde_json::to_string(next)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {table} SET doc=?1, version=version+1 \
             WHERE id=?2 AND version=?3 AND deleted_at IS NULL"
        );
        let changed = conn
            .execute(&sql, params![doc, id, read_version as i64])
            .map_err(backend)?;
        if changed == 1 {
            return Ok(());
        }
        let exists_sql = format!("SELECT COUNT(1) FROM {table} WHERE id=?1 AND deleted_at IS NULL");
        let exists: i64 = conn
            .query_row(&exists_sql, params![id], |r| r.get(0))
            .map_err(backend)?;
        if exists == 0 {
            Err(StoreError::MissingRow {
                collection,
                id: id.to_string(),
            })
        } else {
            Err(StoreError::VersionConflict {
                collection,
                id: id.to_string(),
                expected: read_version,
            })
        }
    }

    fn tombstone(&self, table: &str, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("UPDATE {table} SET deleted_at=?1 WHERE id=?2 AND deleted_at IS NULL");
        conn.execute(&sql, params![at.to_rfc3339(), id]).map_err(backend)?;
        Ok(())
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn not_found_as_none<T>(e: rusqlite::Error) -> StoreResult<Option<T>> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(backend(other)),
    }
}

fn parse_doc<T: DeserializeOwned>(doc: &str) -> StoreResult<T> {
    serde_json::from_str(doc).map_err(|e| StoreError::Backend(format!("corrupt document: {e}")))
}

impl DocumentStore for SqliteStore {
    fn insert_norm_point(&self, point: NormPoint) -> StoreResult<()> {
        let code = point.code();
        self.insert_doc(
            "norm_points",
            "INSERT INTO norm_points(id, doc, created_at, version, code) VALUES (?1, ?2, ?3, ?4, ?5)",
            point.id.as_str(),
            point.created_at,
            point.version,
            &[&code],
            &point,
        )
    }

    fn get_norm_point(&self, id: &NormPointId) -> StoreResult<Option<NormPoint>> {
        self.get_doc("norm_points", id.as_str())
    }

    fn get_norm_point_by_code(&self, code: &str) -> StoreResult<Option<NormPoint>> {
        let conn = self.conn.lock().unwrap();
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM norm_points WHERE code=?1 AND deleted_at IS NULL",
                params![code],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(not_found_as_none)?;
        doc.map(|d| parse_doc(&d)).transpose()
    }

    fn list_norm_points(&self, page: Page) -> StoreResult<Vec<NormPoint>> {
        self.list_docs("norm_points", page)
    }

    fn count_norm_points(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(1) FROM norm_points WHERE deleted_at IS NULL",
                [],
                |r| r.get(0),
            )
            .map_err(backend)?;
        Ok(n as usize)
    }

    fn insert_relation(&self, relation: ComplianceRelation) -> StoreResult<()> {
        self.insert_doc(
            "relations",
            "INSERT INTO relations(id, doc, created_at, version, norm_point_id, subject_type, subject_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            relation.id.as_str(),
            relation.created_at,
            relation.version,
            &[
                &relation.norm_point_id.as_str(),
                &relation.subject_type.as_str(),
                &relation.subject_id,
            ],
            &relation,
        )
    }

    fn get_relation(&self, id: &RelationId) -> StoreResult<Option<ComplianceRelation>> {
        self.get_doc("relations", id.as_str())
    }

    fn find_relation(
        &self,
        norm_point_id: &NormPointId,
        subject_type: SubjectType,
        subject_id: &str,
    ) -> StoreResult<Option<ComplianceRelation>> {
        let conn = self.conn.lock().unwrap();
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM relations \
                 WHERE norm_point_id=?1 AND subject_type=?2 AND subject_id=?3 AND deleted_at IS NULL",
                params![norm_point_id.as_str(), subject_type.as_str(), subject_id],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(not_found_as_none)?;
        doc.map(|d| parse_doc(&d)).transpose()
    }

    fn update_relation(&self, relation: &ComplianceRelation) -> StoreResult<()> {
        let mut next = relation.clone();
        next.version += 1;
        self.update_doc("relations", "relations", relation.id.as_str(), relation.version, &next)
    }

    fn list_relations(&self, page: Page) -> StoreResult<Vec<ComplianceRelation>> {
        self.list_docs("relations", page)
    }

    fn delete_relation(&self, id: &RelationId, at: DateTime<Utc>) -> StoreResult<()> {
        self.tombstone("relations", id.as_str(), at)
    }

    fn insert_audit(&self, audit: Audit) -> StoreResult<()> {
        self.insert_doc(
            "audits",
            "INSERT INTO audits(id, doc, created_at, version) VALUES (?1, ?2, ?3, ?4)",
            audit.id.as_str(),
            audit.created_at,
            audit.version,
            &[],
            &audit,
        )
    }

    fn get_audit(&self, id: &AuditId) -> StoreResult<Option<Audit>> {
        self.get_doc("audits", id.as_str())
    }

    fn update_audit(&self, audit: &Audit) -> StoreResult<()> {
        let mut next = audit.clone();
        next.version += 1;
        self.update_doc("audits", "audits", audit.id.as_str(), audit.version, &next)
    }

    fn list_audits(&self, page: Page) -> StoreResult<Vec<Audit>> {
        self.list_docs("audits", page)
    }

    fn delete_audit(&self, id: &AuditId, at: DateTime<Utc>) -> StoreResult<()> {
        self.tombstone("audits", id.as_str(), at)
    }

    fn insert_finding(&self, finding: Finding) -> StoreResult<()> {
        self.insert_doc(
            "findings",
            "INSERT INTO findings(id, doc, created_at, version) VALUES (?1, ?2, ?3, ?4)",
            finding.id.as_str(),
            finding.created_at,
            finding.version,
            &[],
            &finding,
        )
    }

    fn get_finding(&self, id: &FindingId) -> StoreResult<Option<Finding>> {
        self.get_doc("findings", id.as_str())
    }

    fn update_finding(&self, finding: &Finding) -> StoreResult<()> {
        let mut next = finding.clone();
        next.version += 1;
        self.update_doc("findings", "findings", finding.id.as_str(), finding.version, &next)
    }

    fn list_findings(&self, page: Page) -> StoreResult<Vec<Finding>> {
        self.list_docs("findings", page)
    }

    fn delete_finding(&self, id: &FindingId, at: DateTime<Utc>) -> StoreResult<()> {
        self.tombstone("findings", id.as_str(), at)
    }

    fn insert_action(&self, action: Action) -> StoreResult<()> {
        self.insert_doc(
            "actions",
            "INSERT INTO actions(id, doc, created_at, version, finding_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            action.id.as_str(),
            action.created_at,
            action.version,
            &[&action.finding_id.as_str()],
            &action,
        )
    }

    fn get_action(&self, id: &ActionId) -> StoreResult<Option<Action>> {
        self.get_doc("actions", id.as_str())
    }

    fn update_action(&self, action: &Action) -> StoreResult<()> {
        let mut next = action.clone();
        next.version += 1;
        self.update_doc("actions", "actions", action.id.as_str(), action.version, &next)
    }

    fn list_actions(&self, page: Page) -> StoreResult<Vec<Action>> {
        self.list_docs("actions", page)
    }

    fn list_actions_for_finding(&self, finding_id: &FindingId) -> StoreResult<Vec<Action>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT doc FROM actions WHERE finding_id=?1 AND deleted_at IS NULL \
                 ORDER BY created_at, id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![finding_id.as_str()], |r| r.get::<_, String>(0))
            .map_err(backend)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(parse_doc(&row.map_err(backend)?)?);
        }
        Ok(out)
    }

    fn delete_action(&self, id: &ActionId, at: DateTime<Utc>) -> StoreResult<()> {
        self.tombstone("actions", id.as_str(), at)
    }

    fn next_sequence(&self, collection: &str, year: i32) -> StoreResult<u64> {
        let conn = self.conn.lock().unwrap();
        let value: i64 = conn
            .query_row(
                "INSERT INTO sequences(collection, year, value) VALUES (?1, ?2, 1) \
                 ON CONFLICT(collection, year) DO UPDATE SET value = value + 1 \
                 RETURNING value",
                params![collection, year],
                |r| r.get(0),
            )
            .map_err(backend)?;
        Ok(value as u64)
    }
}
