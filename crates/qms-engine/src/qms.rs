use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use qms_store::DocumentStore;
use qms_store_sqlite::SqliteStore;

use crate::action::ActionWorkflow;
use crate::audit::AuditWorkflow;
use crate::config::QmsConfig;
use crate::events::{EventPublisher, NoopPublisher};
use crate::finding::FindingWorkflow;
use crate::registry::NormPointRegistry;
use crate::relations::RelationLedger;
use crate::stats::StatsEngine;

/// One engine instance per process: the store and the collaborators are
/// constructed once and injected into each workflow (no module-level state).
pub struct Qms {
    pub root: PathBuf,
    pub cfg: QmsConfig,
    pub registry: NormPointRegistry,
    pub audits: AuditWorkflow,
    pub findings: FindingWorkflow,
    pub actions: ActionWorkflow,
    pub relations: RelationLedger,
    pub stats: StatsEngine,
}

impl Qms {
    pub fn open(root: PathBuf) -> Result<Self> {
        let cfg_path = QmsConfig::config_path(&root);
        let cfg = if cfg_path.exists() {
            QmsConfig::load_from(&cfg_path)?
        } else {
            let org = root
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("organization");
            let cfg = QmsConfig::default_for(org);
            cfg.save_to(&cfg_path)?;
            cfg
        };
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&cfg.db_path(&root))?);
        Ok(Self::assemble(root, cfg, store, Arc::new(NoopPublisher)))
    }

    pub fn init(root: &Path) -> Result<()> {
        let cfg_path = QmsConfig::config_path(root);
        if !cfg_path.exists() {
            let org = root
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("organization");
            QmsConfig::default_for(org).save_to(&cfg_path)?;
        }
        let cfg = QmsConfig::load_from(&cfg_path)?;
        let _ = SqliteStore::open(&cfg.db_path(root))?;
        Ok(())
    }

    /// Test/embedding constructor over any backend and publisher.
    pub fn with_store(
        store: Arc<dyn DocumentStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::assemble(
            PathBuf::new(),
            QmsConfig::default_for("test"),
            store,
            publisher,
        )
    }

    fn assemble(
        root: PathBuf,
        cfg: QmsConfig,
        store: Arc<dyn DocumentStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            root,
            cfg,
            registry: NormPointRegistry::new(store.clone()),
            audits: AuditWorkflow::new(store.clone()),
            findings: FindingWorkflow::new(store.clone()),
            actions: ActionWorkflow::new(store.clone(), publisher),
            relations: RelationLedger::new(store.clone()),
            stats: StatsEngine::new(store),
        }
    }
}
