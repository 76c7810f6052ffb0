use thiserror::Error;

/// Configuration problems detected eagerly at construction time.
///
/// Every variant carries a human-readable reason and, where one exists, a
/// suggested fix. A validation failure always blocks the simulation from
/// starting; results are never degraded silently.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid optical properties: {reason} (fix: {fix})")]
    InvalidOpticalProperties { reason: String, fix: String },

    #[error("invalid tissue geometry: {reason} (fix: {fix})")]
    InvalidTissue { reason: String, fix: String },

    #[error("invalid simulation input: {reason} (fix: {fix})")]
    InvalidInput { reason: String, fix: String },
}

/// Failure constructing a detector or source from its descriptor.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("no factory registered for type tag \"{0}\"")]
    NoFactoryRegistered(String),

    #[error("detector input for \"{tag}\" is malformed: {reason}")]
    MalformedInput { tag: String, reason: String },
}

/// I/O-layer failures while reading or writing the photon databases or
/// serialized detectors. The live transport run never depends on these.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad header in {path}: {reason}")]
    BadHeader { path: String, reason: String },

    #[error("truncated stream in {path}: expected {expected} records, got {actual}")]
    Truncated { path: String, expected: u64, actual: u64 },

    #[error("record streams disagree: photon database has {photons} records, collision database has {collisions}")]
    Mismatched { photons: u64, collisions: u64 },

    #[error("descriptor error: {0}")]
    Descriptor(#[from] serde_json::Error),
}

/// Top-level error for simulation construction and post-processing.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
