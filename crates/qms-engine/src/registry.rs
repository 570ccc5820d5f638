use std::sync::Arc;

use chrono::Utc;
use qms_core::{NormPoint, NormPointId, RegisterNormPoint, UserId};
use qms_store::{DocumentStore, Page};
use qms_validate::{FieldErrors, Validate};

use crate::error::{require, WorkflowResult};

/// Catalog of normative requirement clauses. Read-mostly leaf dependency of
/// the audit planner and the relation ledger.
pub struct NormPointRegistry {
    store: Arc<dyn DocumentStore>,
}

impl NormPointRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn register(&self, input: RegisterNormPoint, actor: &UserId) -> WorkflowResult<NormPoint> {
        input.validate()?;
        let code = format!("{}.{}", input.chapter.trim(), input.section.trim());
        if self.store.get_norm_point_by_code(&code)?.is_some() {
            let mut errors = FieldErrors::new();
            errors.push("section", format!("norm point {code} is already registered"));
            return Err(errors.into());
        }
        let point = NormPoint {
            id: NormPointId::new(),
            chapter: input.chapter.trim().to_string(),
            section: input.section.trim().to_string(),
            requirement_text: input.requirement_text,
            category: input.category,
            is_mandatory: input.is_mandatory,
            related_processes: input.related_processes,
            related_documents: input.related_documents,
            created_at: Utc::now(),
            created_by: actor.clone(),
            version: 1,
            deleted_at: None,
        };
        self.store.insert_norm_point(point.clone())?;
        Ok(point)
    }

    pub fn get(&self, id: &NormPointId) -> WorkflowResult<NormPoint> {
        require("norm_point", id.as_str(), self.store.get_norm_point(id)?)
    }

    pub fn by_code(&self, code: &str) -> WorkflowResult<NormPoint> {
        require("norm_point", code, self.store.get_norm_point_by_code(code)?)
    }

    pub fn list(&self) -> WorkflowResult<Vec<NormPoint>> {
        let mut all = Vec::new();
        let mut page = Page::first();
        loop {
            let batch = self.store.list_norm_points(page)?;
            let done = batch.len() < page.limit;
            all.extend(batch);
            if done {
                break;
            }
            page = page.next();
        }
        Ok(all)
    }

    /// The organization's fixed mandatory-clause set, used as the selection
    /// for complete audits. Sorted in clause order (chapter 10 after
    /// chapter 4, not lexicographically) for a stable verification order.
    pub fn mandatory_codes(&self) -> WorkflowResult<Vec<String>> {
        let mut points: Vec<NormPoint> = self
            .list()?
            .into_iter()
            .filter(|p| p.is_mandatory)
            .collect();
        points.sort_by_key(|p| clause_key(&p.chapter, &p.section));
        Ok(points.into_iter().map(|p| p.code()).collect())
    }
}

/// Numeric where the clause parses as a number, literal text otherwise, so
/// "10.1" orders after "4.4" while non-numeric clauses still sort stably.
fn clause_key(chapter: &str, section: &str) -> (u32, String, u32, String) {
    let numeric = |s: &str| s.parse::<u32>().unwrap_or(u32::MAX);
    (
        numeric(chapter),
        chapter.to_string(),
        numeric(section),
        section.to_string(),
    )
}
