use ::duckdb::Connection;

use crate::duckdb::escape_sql_string;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_ticks",
        sql: r#"
CREATE TABLE IF NOT EXISTS ticks (
    symbol VARCHAR NOT NULL,
    timestamp_ms BIGINT NOT NULL,
    bid DOUBLE NOT NULL,
    ask DOUBLE NOT NULL,
    spread DOUBLE NOT NULL,
    volume BIGINT NOT NULL DEFAULT 0,
    lp_source VARCHAR,
    flags INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(symbol, timestamp_ms),
    CHECK (ask >= bid),
    CHECK (abs(spread - (ask - bid)) < 0.000001)
);

CREATE TABLE IF NOT EXISTS partition_settings (
    name VARCHAR PRIMARY KEY,
    value VARCHAR NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_ticks_symbol_ts ON ticks(symbol, timestamp_ms);
CREATE INDEX IF NOT EXISTS idx_ticks_ts ON ticks(timestamp_ms);
"#,
    },
];

/// Apply the built-in partition schema, recording each version once.
pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let query = format!(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = '{}'",
            escape_sql_string(migration.version)
        );
        let applied_count: i64 = connection.query_row(query.as_str(), [], |row| row.get(0))?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            let insert = format!(
                "INSERT INTO schema_migrations (version) VALUES ('{}')",
                escape_sql_string(migration.version)
            );
            connection.execute_batch(insert.as_str())?;
        }
    }

    Ok(())
}

/// Versions of the built-in migrations, oldest first.
pub fn migration_versions() -> impl Iterator<Item = &'static str> {
    MIGRATIONS.iter().map(|migration| migration.version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let connection = Connection::open_in_memory().expect("in-memory db");
        apply_migrations(&connection).expect("first apply");
        apply_migrations(&connection).expect("second apply");

        let applied: i64 = connection
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count");
        assert_eq!(applied, migration_versions().count() as i64);
    }

    #[test]
    fn schema_rejects_crossed_quotes() {
        let connection = Connection::open_in_memory().expect("in-memory db");
        apply_migrations(&connection).expect("apply");

        let result = connection.execute_batch(
            "INSERT INTO ticks (symbol, timestamp_ms, bid, ask, spread) VALUES ('EURUSD', 1, 1.2, 1.1, -0.1)",
        );
        assert!(result.is_err(), "ask < bid must violate the schema");
    }
}
