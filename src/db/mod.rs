use crate::errors::{RegistryError, RegistryResult};
use crate::models::{
    ConnectionConfig, DataSource, EngineType, MemberRole, Membership, Organization, SourceStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Row store backing the registry. Writes are serialized behind the
/// connection mutex; concurrent connectivity tests still race at the
/// operation level and the last writer wins.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> RegistryResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| RegistryError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(RegistryError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(RegistryError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn create_organization(&self, name: &str) -> RegistryResult<Organization> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO organizations (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id, name, now.to_rfc3339()],
        )?;
        Ok(Organization {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }

    pub fn add_membership(
        &self,
        organization_id: &str,
        user_id: &str,
        role: MemberRole,
    ) -> RegistryResult<Membership> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO memberships (id, organization_id, user_id, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, organization_id, user_id, role.as_str(), now.to_rfc3339()],
        )?;
        Ok(Membership {
            id,
            organization_id: organization_id.to_string(),
            user_id: user_id.to_string(),
            role,
            created_at: now,
        })
    }

    /// A user can hold memberships in several organizations; the lookup is
    /// always scoped to the organization being operated on.
    pub fn membership_for(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> RegistryResult<Option<Membership>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, organization_id, user_id, role, created_at
             FROM memberships WHERE user_id = ?1 AND organization_id = ?2",
            [user_id, organization_id],
            |row| {
                Ok(Membership {
                    id: row.get(0)?,
                    organization_id: row.get(1)?,
                    user_id: row.get(2)?,
                    role: parse_role(&row.get::<_, String>(3)?)?,
                    created_at: parse_time(&row.get::<_, String>(4)?)?,
                })
            },
        )
        .optional()
        .map_err(RegistryError::from)
    }

    /// Persists a new source with `pending` status. `config` must already
    /// carry the encrypted password; this layer stores it verbatim.
    pub fn insert_data_source(
        &self,
        organization_id: &str,
        created_by: &str,
        name: &str,
        description: Option<&str>,
        engine: EngineType,
        config: &ConnectionConfig,
    ) -> RegistryResult<DataSource> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let config_json = serde_json::to_string(config)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO data_sources (
               id, organization_id, created_by, name, description, engine,
               connection_config_json, status, last_sync_at, last_error,
               created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, ?9, ?9)",
            params![
                id,
                organization_id,
                created_by,
                name,
                description,
                engine.as_str(),
                config_json,
                SourceStatus::Pending.as_str(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(DataSource {
            id,
            organization_id: organization_id.to_string(),
            created_by: created_by.to_string(),
            name: name.to_string(),
            description: description.map(ToString::to_string),
            engine,
            status: SourceStatus::Pending,
            last_sync_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_data_source(&self, id: &str) -> RegistryResult<Option<DataSource>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, organization_id, created_by, name, description, engine,
                    status, last_sync_at, last_error, created_at, updated_at
             FROM data_sources WHERE id = ?1",
            [id],
            parse_data_source_row,
        )
        .optional()
        .map_err(RegistryError::from)
    }

    /// Loads the stored connection config (password still encrypted). Only
    /// the registry calls this; the config never reaches list/get results.
    pub fn get_connection_config(&self, id: &str) -> RegistryResult<Option<ConnectionConfig>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT connection_config_json FROM data_sources WHERE id = ?1",
                [id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn mark_test_success(&self, id: &str, at: DateTime<Utc>) -> RegistryResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE data_sources
             SET status = ?1, last_sync_at = ?2, last_error = NULL, updated_at = ?2
             WHERE id = ?3",
            params![SourceStatus::Connected.as_str(), at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Records a failed test. `last_sync_at` is left untouched: it tracks
    /// the last successful sync only.
    pub fn mark_test_failure(&self, id: &str, message: &str) -> RegistryResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE data_sources
             SET status = ?1, last_error = ?2, updated_at = ?3
             WHERE id = ?4",
            params![
                SourceStatus::Error.as_str(),
                message,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    pub fn set_status(&self, id: &str, status: SourceStatus) -> RegistryResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE data_sources SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn delete_data_source(&self, id: &str) -> RegistryResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM data_sources WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    pub fn list_data_sources(&self, organization_id: &str) -> RegistryResult<Vec<DataSource>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT id, organization_id, created_by, name, description, engine,
                    status, last_sync_at, last_error, created_at, updated_at
             FROM data_sources WHERE organization_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = statement
            .query_map([organization_id], parse_data_source_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn lock(&self) -> RegistryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RegistryError::Internal("database mutex poisoned".to_string()))
    }
}

fn parse_data_source_row(row: &Row<'_>) -> rusqlite::Result<DataSource> {
    Ok(DataSource {
        id: row.get(0)?,
        organization_id: row.get(1)?,
        created_by: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        engine: parse_engine(&row.get::<_, String>(5)?)?,
        status: parse_status(&row.get::<_, String>(6)?)?,
        last_sync_at: row
            .get::<_, Option<String>>(7)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
        last_error: row.get(8)?,
        created_at: parse_time(&row.get::<_, String>(9)?)?,
        updated_at: parse_time(&row.get::<_, String>(10)?)?,
    })
}

fn parse_engine(raw: &str) -> rusqlite::Result<EngineType> {
    match raw {
        "postgresql" => Ok(EngineType::Postgresql),
        "mysql" => Ok(EngineType::Mysql),
        "sqlserver" => Ok(EngineType::Sqlserver),
        "oracle" => Ok(EngineType::Oracle),
        "api" => Ok(EngineType::Api),
        "csv" => Ok(EngineType::Csv),
        other => Err(conversion_error(format!("Unknown engine '{}'", other))),
    }
}

fn parse_status(raw: &str) -> rusqlite::Result<SourceStatus> {
    match raw {
        "pending" => Ok(SourceStatus::Pending),
        "connected" => Ok(SourceStatus::Connected),
        "error" => Ok(SourceStatus::Error),
        "disabled" => Ok(SourceStatus::Disabled),
        other => Err(conversion_error(format!("Unknown status '{}'", other))),
    }
}

fn parse_role(raw: &str) -> rusqlite::Result<MemberRole> {
    match raw {
        "owner" => Ok(MemberRole::Owner),
        "admin" => Ok(MemberRole::Admin),
        "member" => Ok(MemberRole::Member),
        "viewer" => Ok(MemberRole::Viewer),
        other => Err(conversion_error(format!("Unknown role '{}'", other))),
    }
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(error.to_string()))
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}
