//! Database views over a partition's ticks.

use ::duckdb::Connection;

/// Create the partition views.
///
/// Creates the following views:
/// - `v_symbol_stats`: first/last tick and tick count per symbol
/// - `v_lp_activity`: tick count and average spread per liquidity provider
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW v_symbol_stats AS
SELECT
    symbol,
    MIN(timestamp_ms) AS first_tick_at,
    MAX(timestamp_ms) AS last_tick_at,
    COUNT(*) AS total_ticks
FROM ticks
GROUP BY symbol;

CREATE OR REPLACE VIEW v_lp_activity AS
SELECT
    COALESCE(lp_source, 'unknown') AS lp_source,
    COUNT(*) AS total_ticks,
    AVG(spread)::DOUBLE AS avg_spread
FROM ticks
GROUP BY COALESCE(lp_source, 'unknown');
",
    )?;

    Ok(())
}
