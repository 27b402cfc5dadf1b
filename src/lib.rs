mod db;
mod errors;
mod models;
mod probe;
mod redaction;
mod registry;
mod secret;

pub use db::Database;
pub use errors::{CryptoError, RegistryError, RegistryResult};
pub use models::{
    ConnectionConfig, DataSource, EngineType, MemberRole, Membership, NewConnectionConfig,
    NewDataSource, Organization, SourceStatus, TestOutcome,
};
pub use probe::{EngineProbe, PostgresProbe, ProbeFailure, ProbeRegistry, PROBE_TIMEOUT};
pub use registry::DataSourceRegistry;
pub use secret::{EncryptedPayload, KeyMaterial, SecretCodec};
