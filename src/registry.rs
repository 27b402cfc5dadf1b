use crate::db::Database;
use crate::errors::{RegistryError, RegistryResult};
use crate::models::{DataSource, Membership, NewDataSource, SourceStatus, TestOutcome};
use crate::probe::{EngineProbe, ProbeRegistry};
use crate::redaction::Scrubber;
use crate::secret::{EncryptedPayload, KeyMaterial, SecretCodec};
use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;

/// Lifecycle owner for data-source records: create, test, disable, delete,
/// list. Stateless between calls; everything durable lives in the row store.
/// Stored credentials stay encrypted except for the transient plaintext
/// handed to a connectivity probe.
pub struct DataSourceRegistry {
    db: Arc<Database>,
    codec: SecretCodec,
    probes: ProbeRegistry,
    scrubber: Scrubber,
}

impl DataSourceRegistry {
    pub fn new(db: Arc<Database>, key: KeyMaterial) -> Self {
        Self::with_probes(db, key, ProbeRegistry::with_default_engines())
    }

    pub fn with_probes(db: Arc<Database>, key: KeyMaterial, probes: ProbeRegistry) -> Self {
        Self {
            db,
            codec: SecretCodec::new(key),
            probes,
            scrubber: Scrubber::new(),
        }
    }

    /// Creates a data source with `pending` status. Owner/admin only; the
    /// password is encrypted before anything is written.
    pub fn create(
        &self,
        organization_id: &str,
        actor_id: &str,
        payload: NewDataSource,
    ) -> RegistryResult<DataSource> {
        let membership = self.require_membership(organization_id, actor_id)?;
        if !membership.role.can_manage_sources() {
            return Err(RegistryError::Permission(
                "role is not allowed to manage data sources".to_string(),
            ));
        }

        let mut config = payload.validate()?;
        config.password = self.codec.encrypt(&config.password)?.to_string();

        let record = self.db.insert_data_source(
            organization_id,
            actor_id,
            &payload.name,
            payload.description.as_deref(),
            payload.engine,
            &config,
        )?;
        tracing::info!(
            data_source_id = %record.id,
            engine = record.engine.as_str(),
            "data source created"
        );
        Ok(record)
    }

    /// Runs the engine's connectivity probe and applies the outcome to the
    /// record. Engines without a working probe report `Unsupported` and leave
    /// the record exactly as it was.
    pub async fn test_connection(&self, id: &str, actor_id: &str) -> RegistryResult<TestOutcome> {
        let record = self
            .db
            .get_data_source(id)?
            .ok_or_else(|| RegistryError::NotFound(format!("data source {id}")))?;
        self.require_membership(&record.organization_id, actor_id)?;
        if record.status == SourceStatus::Disabled {
            return Err(RegistryError::Validation(
                "data source is disabled".to_string(),
            ));
        }

        let probe = match self.probes.lookup(record.engine) {
            Some(EngineProbe::Postgres(probe)) => probe,
            Some(EngineProbe::Unimplemented) | None => {
                tracing::info!(
                    data_source_id = %id,
                    engine = record.engine.as_str(),
                    "no connectivity probe for engine"
                );
                return Ok(TestOutcome::Unsupported {
                    engine: record.engine,
                });
            }
        };

        let mut config = self
            .db
            .get_connection_config(id)?
            .ok_or_else(|| RegistryError::NotFound(format!("data source {id}")))?;
        let sealed = EncryptedPayload::from_str(&config.password)?;
        config.password = self.codec.decrypt(&sealed)?;

        match probe.run(&config).await {
            Ok(()) => {
                self.db.mark_test_success(id, Utc::now())?;
                tracing::info!(data_source_id = %id, "connectivity test succeeded");
                Ok(TestOutcome::Connected)
            }
            Err(failure) => {
                let message = self
                    .scrubber
                    .scrub(&failure.to_string(), &[&config.password]);
                self.db.mark_test_failure(id, &message)?;
                tracing::warn!(data_source_id = %id, "connectivity test failed");
                Ok(TestOutcome::Failed { message })
            }
        }
    }

    /// Unconditional hard delete, valid from any status. Referential cleanup
    /// of rows pointing at this id is the store's concern, not ours.
    pub fn delete(&self, id: &str, actor_id: &str) -> RegistryResult<()> {
        let record = self
            .db
            .get_data_source(id)?
            .ok_or_else(|| RegistryError::NotFound(format!("data source {id}")))?;
        self.require_membership(&record.organization_id, actor_id)?;

        if !self.db.delete_data_source(id)? {
            return Err(RegistryError::NotFound(format!("data source {id}")));
        }
        tracing::info!(data_source_id = %id, "data source deleted");
        Ok(())
    }

    /// Newest first. Results never carry connection config, encrypted or not.
    pub fn list(&self, organization_id: &str) -> RegistryResult<Vec<DataSource>> {
        self.db.list_data_sources(organization_id)
    }

    /// Administrative toggle. Disabling parks the source outside the test
    /// lifecycle; re-enabling returns it to `pending` so the next test
    /// decides its real state.
    pub fn set_disabled(
        &self,
        id: &str,
        actor_id: &str,
        disabled: bool,
    ) -> RegistryResult<DataSource> {
        let record = self
            .db
            .get_data_source(id)?
            .ok_or_else(|| RegistryError::NotFound(format!("data source {id}")))?;
        let membership = self.require_membership(&record.organization_id, actor_id)?;
        if !membership.role.can_manage_sources() {
            return Err(RegistryError::Permission(
                "role is not allowed to manage data sources".to_string(),
            ));
        }

        let status = if disabled {
            SourceStatus::Disabled
        } else {
            SourceStatus::Pending
        };
        self.db.set_status(id, status)?;
        self.db
            .get_data_source(id)?
            .ok_or_else(|| RegistryError::NotFound(format!("data source {id}")))
    }

    fn require_membership(
        &self,
        organization_id: &str,
        actor_id: &str,
    ) -> RegistryResult<Membership> {
        self.db
            .membership_for(organization_id, actor_id)?
            .ok_or_else(|| {
                RegistryError::Permission(
                    "actor does not belong to this organization".to_string(),
                )
            })
    }
}
