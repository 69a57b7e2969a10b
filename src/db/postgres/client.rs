use std::time::Duration;

use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{debug, info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

/// Ledger schema, bundled so the binary does not depend on its working directory.
const SCHEMA: &str = include_str!("../../../schema/postgres.sql");

/// Statements of a SQL script.
///
/// `--` comments are dropped, and `;` inside `$$` bodies does not end a statement.
fn schema_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_dollar_quote = false;

    for line in sql.lines() {
        let line = if in_dollar_quote {
            line
        } else {
            line.split("--").next().unwrap_or_default()
        };

        let mut rest = line;
        while !rest.is_empty() {
            let next_quote = rest.find("$$");
            let next_end = if in_dollar_quote { None } else { rest.find(';') };

            match (next_quote, next_end) {
                (Some(q), Some(e)) if e < q => {
                    current.push_str(&rest[..e]);
                    push_statement(&mut statements, &mut current);
                    rest = &rest[e + 1..];
                },
                (_, Some(e)) if next_quote.is_none() => {
                    current.push_str(&rest[..e]);
                    push_statement(&mut statements, &mut current);
                    rest = &rest[e + 1..];
                },
                (Some(q), _) => {
                    current.push_str(&rest[..q + 2]);
                    in_dollar_quote = !in_dollar_quote;
                    rest = &rest[q + 2..];
                },
                (None, _) => {
                    current.push_str(rest);
                    rest = "";
                },
            }
        }
        current.push('\n');
    }
    push_statement(&mut statements, &mut current);

    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

fn build_pool(settings: &PostgresSettings) -> anyhow::Result<Pool> {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(&settings.host)
        .port(settings.port)
        .user(&settings.user)
        .password(&settings.password)
        .dbname(&settings.database)
        .application_name("hypledger");

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(mgr)
        .max_size(settings.pool_size)
        .build()
        .context("Failed to create ledger connection pool")
}

/// Pooled PostgreSQL connection backing every ledger collaborator:
/// operations, user ledger, prices, vault metadata, vault snapshots and
/// rewarders.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

impl PostgresClient {
    /// Open the pool and wait until one connection succeeds, backing off
    /// exponentially between `connect_retries` attempts.
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        info!(
            "Connecting ledger store to {}@{}:{}/{}",
            settings.user, settings.host, settings.port, settings.database
        );

        let pool = build_pool(&settings)?;
        let attempts = settings.connect_retries.max(1);

        for attempt in 1..=attempts {
            match pool.get().await {
                Ok(_conn) => {
                    info!(
                        "Ledger store connected (pool size {})",
                        settings.pool_size
                    );
                    return Ok(Self { pool });
                },
                Err(e) if attempt < attempts => {
                    let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                    warn!(
                        "Ledger store unreachable (attempt {}/{}): {}; retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                },
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "Ledger store unreachable after {} attempts: {}",
                        attempts,
                        e
                    ));
                },
            }
        }

        Err(anyhow::anyhow!("Ledger store unreachable: no connection attempt made"))
    }

    /// Create the `ledger` schema and its tables in one transaction.
    /// Every statement is `IF NOT EXISTS`, so this runs on every start.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        let statements = schema_statements(SCHEMA);
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        for stmt in &statements {
            debug!("Applying ledger schema statement: {}", stmt);
            tx.batch_execute(stmt)
                .await
                .with_context(|| format!("Failed to apply ledger schema statement: {}", stmt))?;
        }
        tx.commit().await.context("Failed to commit ledger schema")?;

        info!("Ledger schema ready ({} statements)", statements.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_drop_comments() {
        let sql = "-- header; not a statement\nCREATE SCHEMA a;\n\nCREATE TABLE a.t (x INT); -- trailing;\n  \nSELECT 1";
        assert_eq!(
            schema_statements(sql),
            vec!["CREATE SCHEMA a", "CREATE TABLE a.t (x INT)", "SELECT 1"]
        );
    }

    #[test]
    fn test_statements_keep_dollar_quoted_bodies() {
        let sql = "CREATE FUNCTION f() RETURNS INT AS $$ SELECT 1; $$ LANGUAGE sql;\nSELECT 2;";
        let statements = schema_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("SELECT 1; $$"));
    }

    #[test]
    fn test_bundled_schema() {
        let statements = schema_statements(SCHEMA);
        assert_eq!(statements.len(), 9);
        assert!(statements.iter().all(|s| s.starts_with("CREATE")));
        assert!(statements.iter().any(|s| s.contains("ledger.user_ledger")));
    }
}
