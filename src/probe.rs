use crate::models::{ConnectionConfig, EngineType};
use std::collections::HashMap;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tokio_postgres::config::SslMode;
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;

/// Hard bound on the whole probe: connect, liveness query, done.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a probe that actually ran did not come back healthy. Distinct from
/// "no probe exists for this engine", which never reaches this type.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("connection timed out after {} seconds", PROBE_TIMEOUT.as_secs())]
    Timeout,
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("host unreachable: {0}")]
    Unreachable(String),
}

/// Probe capability for one engine. Adding an engine is a registration in
/// `ProbeRegistry`, not a branch edit.
#[derive(Debug, Clone)]
pub enum EngineProbe {
    Postgres(PostgresProbe),
    /// Declared engine with no working probe yet. Callers must be able to
    /// tell "never tried" apart from "tried and failed".
    Unimplemented,
}

#[derive(Debug, Default)]
pub struct ProbeRegistry {
    probes: HashMap<EngineType, EngineProbe>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine set the product currently ships: a live postgresql probe,
    /// explicit placeholders for the engines on the roadmap, nothing for
    /// api/csv (no network probe is defined for those).
    pub fn with_default_engines() -> Self {
        let mut registry = Self::new();
        registry.register(
            EngineType::Postgresql,
            EngineProbe::Postgres(PostgresProbe::new(PROBE_TIMEOUT)),
        );
        registry.register(EngineType::Mysql, EngineProbe::Unimplemented);
        registry.register(EngineType::Sqlserver, EngineProbe::Unimplemented);
        registry.register(EngineType::Oracle, EngineProbe::Unimplemented);
        registry
    }

    pub fn register(&mut self, engine: EngineType, probe: EngineProbe) {
        self.probes.insert(engine, probe);
    }

    pub fn lookup(&self, engine: EngineType) -> Option<&EngineProbe> {
        self.probes.get(&engine)
    }
}

/// Opens a real connection, runs `SELECT 1`, closes. Single attempt, no
/// retry; a slow or dead host costs at most the configured timeout.
#[derive(Debug, Clone)]
pub struct PostgresProbe {
    timeout: Duration,
}

impl PostgresProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// `config.password` must be the decrypted plaintext; it exists only for
    /// the duration of this call. The timeout bounds the whole probe,
    /// connect and liveness query together.
    pub async fn run(&self, config: &ConnectionConfig) -> Result<(), ProbeFailure> {
        timeout(self.timeout, self.attempt(config))
            .await
            .map_err(|_| ProbeFailure::Timeout)?
    }

    async fn attempt(&self, config: &ConnectionConfig) -> Result<(), ProbeFailure> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.username)
            .password(&config.password)
            .ssl_mode(if config.ssl { SslMode::Prefer } else { SslMode::Disable })
            .connect_timeout(self.timeout);

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(classify_postgres_error)?;

        // The connection task must be polled for the client to make progress.
        let driver = tokio::spawn(async move {
            let _ = connection.await;
        });

        let result = client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(classify_postgres_error);

        driver.abort();
        result
    }
}

fn classify_postgres_error(error: tokio_postgres::Error) -> ProbeFailure {
    if let Some(db_error) = error.as_db_error() {
        let code = db_error.code();
        if code == &SqlState::INVALID_PASSWORD
            || code == &SqlState::INVALID_AUTHORIZATION_SPECIFICATION
        {
            return ProbeFailure::AuthRejected(db_error.message().to_string());
        }
    }
    ProbeFailure::Unreachable(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::{EngineProbe, PostgresProbe, ProbeFailure, ProbeRegistry};
    use crate::models::{ConnectionConfig, EngineType};
    use tokio::time::Duration;

    #[test]
    fn default_registry_covers_declared_engines() {
        let registry = ProbeRegistry::with_default_engines();
        assert!(matches!(
            registry.lookup(EngineType::Postgresql),
            Some(EngineProbe::Postgres(_))
        ));
        assert!(matches!(
            registry.lookup(EngineType::Mysql),
            Some(EngineProbe::Unimplemented)
        ));
        assert!(registry.lookup(EngineType::Csv).is_none());
        assert!(registry.lookup(EngineType::Api).is_none());
    }

    #[tokio::test]
    async fn refused_connection_is_a_probe_failure() {
        let probe = PostgresProbe::new(Duration::from_secs(2));
        let config = ConnectionConfig {
            host: "127.0.0.1".to_string(),
            // Nothing listens on port 1.
            port: 1,
            database: "sales".to_string(),
            username: "app".to_string(),
            password: "secret123".to_string(),
            ssl: false,
        };

        let failure = probe.run(&config).await.expect_err("probe must fail");
        match failure {
            ProbeFailure::Unreachable(message) => assert!(!message.is_empty()),
            ProbeFailure::Timeout => {}
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn whole_probe_is_bounded_by_one_timeout() {
        let probe = PostgresProbe::new(Duration::from_millis(250));
        let config = ConnectionConfig {
            // TEST-NET-1 black-holes the SYN, so the connect phase stalls.
            host: "192.0.2.1".to_string(),
            port: 5432,
            database: "sales".to_string(),
            username: "app".to_string(),
            password: "secret123".to_string(),
            ssl: false,
        };

        let started = tokio::time::Instant::now();
        let failure = probe.run(&config).await.expect_err("probe must fail");
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "probe must cost at most one timeout, took {:?}",
            started.elapsed()
        );
        assert!(matches!(
            failure,
            ProbeFailure::Timeout | ProbeFailure::Unreachable(_)
        ));
    }
}
