use thiserror::Error;

/// Invalid or missing configuration. Fatal, surfaced before any evaluation.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be set")]
    Missing { name: &'static str },

    #[error("{name}: cannot parse {value:?}")]
    Unparsable { name: &'static str, value: String },

    #[error("{name} = {value} is out of range ({expected})")]
    OutOfRange {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid DEX router address {0:?}")]
    InvalidRouter(String),

    #[error("no evaluators registered")]
    NoEvaluators,
}

/// A statistic for one address is missing or malformed. Recoverable: the
/// affected evaluator is skipped for that address and the run continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("{address}: missing {field}")]
    MissingField { address: String, field: &'static str },

    #[error("{address}: invalid {field}: {reason}")]
    InvalidValue {
        address: String,
        field: &'static str,
        reason: String,
    },

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("{0}: duplicate record in snapshot")]
    DuplicateAddress(String),
}

/// Statistics source failure.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid source URL: {0}")]
    Url(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Label sink failure.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed evidence: {0}")]
    Evidence(#[from] serde_json::Error),

    #[error("malformed stored label: {0}")]
    Malformed(String),
}

/// Run-level failure handed back to the caller, which owns retry/abort policy.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("statistics source error: {0}")]
    Source(#[from] SourceError),

    #[error("label sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("evaluation worker failed: {0}")]
    Worker(String),
}
