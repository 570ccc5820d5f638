/// Storage-layer errors. `VersionConflict` is the contract the engine's
/// compare-and-swap retry loop is built on.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key in {collection}: {key}")]
    DuplicateKey { collection: &'static str, key: String },

    #[error("version conflict on {collection} {id}: expected {expected}")]
    VersionConflict {
        collection: &'static str,
        id: String,
        expected: u64,
    },

    #[error("no row in {collection} for id {id}")]
    MissingRow { collection: &'static str, id: String },

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
