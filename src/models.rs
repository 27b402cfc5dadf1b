use crate::errors::{RegistryError, RegistryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Postgresql,
    Mysql,
    Sqlserver,
    Oracle,
    Api,
    Csv,
}

impl EngineType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
            Self::Sqlserver => "sqlserver",
            Self::Oracle => "oracle",
            Self::Api => "api",
            Self::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Pending,
    Connected,
    Error,
    Disabled,
}

impl SourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }

    pub fn can_manage_sources(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

/// Validated connection parameters. The `password` field holds plaintext on
/// the way in and the encrypted payload once the row store has it; the struct
/// never leaves the registry boundary either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

/// Raw creation input. Port is accepted as a wide integer so an out-of-range
/// value surfaces as a `ValidationError` naming the field rather than a
/// deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConnectionConfig {
    pub host: String,
    pub port: u32,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDataSource {
    pub name: String,
    pub description: Option<String>,
    pub engine: EngineType,
    pub connection: NewConnectionConfig,
}

impl NewDataSource {
    /// Field-by-field validation; the first invalid field wins.
    pub fn validate(&self) -> RegistryResult<ConnectionConfig> {
        if self.name.trim().len() < 2 {
            return Err(RegistryError::Validation(
                "name: must be at least 2 characters".to_string(),
            ));
        }
        if self.connection.host.trim().is_empty() {
            return Err(RegistryError::Validation("connection.host: is required".to_string()));
        }
        if self.connection.port < 1 || self.connection.port > 65535 {
            return Err(RegistryError::Validation(
                "connection.port: must be between 1 and 65535".to_string(),
            ));
        }
        if self.connection.database.trim().is_empty() {
            return Err(RegistryError::Validation(
                "connection.database: is required".to_string(),
            ));
        }
        if self.connection.username.trim().is_empty() {
            return Err(RegistryError::Validation(
                "connection.username: is required".to_string(),
            ));
        }
        if self.connection.password.is_empty() {
            return Err(RegistryError::Validation(
                "connection.password: is required".to_string(),
            ));
        }

        Ok(ConnectionConfig {
            host: self.connection.host.clone(),
            port: self.connection.port as u16,
            database: self.connection.database.clone(),
            username: self.connection.username.clone(),
            password: self.connection.password.clone(),
            ssl: self.connection.ssl,
        })
    }
}

/// A data source as callers outside the registry see it: no connection
/// config, encrypted or otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub id: String,
    pub organization_id: String,
    pub created_by: String,
    pub name: String,
    pub description: Option<String>,
    pub engine: EngineType,
    pub status: SourceStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a connectivity test. `Unsupported` means the probe was never
/// attempted; callers must be able to tell that apart from a genuine failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum TestOutcome {
    Connected,
    Failed { message: String },
    Unsupported { engine: EngineType },
}

#[cfg(test)]
mod tests {
    use super::{EngineType, NewConnectionConfig, NewDataSource};
    use crate::errors::RegistryError;

    fn valid_payload() -> NewDataSource {
        NewDataSource {
            name: "Sales warehouse".to_string(),
            description: None,
            engine: EngineType::Postgresql,
            connection: NewConnectionConfig {
                host: "prod-db.example.com".to_string(),
                port: 5432,
                database: "sales".to_string(),
                username: "app".to_string(),
                password: "secret123".to_string(),
                ssl: false,
            },
        }
    }

    #[test]
    fn valid_payload_passes() {
        let config = valid_payload().validate().expect("valid");
        assert_eq!(config.port, 5432);
        assert!(!config.ssl);
    }

    #[test]
    fn out_of_range_port_names_the_field() {
        let mut payload = valid_payload();
        payload.connection.port = 70000;
        let err = payload.validate().expect_err("port should be rejected");
        match err {
            RegistryError::Validation(message) => assert!(message.contains("port")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn short_name_names_the_field() {
        let mut payload = valid_payload();
        payload.name = "x".to_string();
        let err = payload.validate().expect_err("name should be rejected");
        match err {
            RegistryError::Validation(message) => assert!(message.starts_with("name")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn empty_password_names_the_field() {
        let mut payload = valid_payload();
        payload.connection.password = String::new();
        let err = payload.validate().expect_err("password should be rejected");
        match err {
            RegistryError::Validation(message) => assert!(message.contains("password")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
