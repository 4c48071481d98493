use connectors::error::ConnectorError;
use engine_config::error::ConfigError;
use engine_core::error::{AuthorizationError, EngineError, PolicyError};
use planner::error::PlanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to deserialize the request file: {0}")]
    RequestDeserialize(#[from] serde_json::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(serde_json::Error),

    #[error("Invalid engine settings: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to open the store: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Failed to load the policy file: {0}")]
    Policy(#[from] PolicyError),

    #[error("Failed to resolve permissions: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Failed to compile the request: {0}")]
    Plan(#[from] PlanError),

    #[error("Query failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    #[error("Unsupported connection URL: {0}")]
    UnsupportedUrl(String),

    #[error("Either --url or --fixture is required")]
    MissingSource,

    #[error("Shutdown requested")]
    ShutdownRequested,
}
