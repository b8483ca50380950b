//! Database module
//!
//! Database connection and schema checks.

use sqlx::PgPool;

/// Tables created by `migrations/001_compliance.sql`
const REQUIRED_TABLES: [&str; 2] = ["compliance_checks", "compliance_outbox"];

/// Verify database connectivity
/// Note: We use raw SQL files in migrations/ directory
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables and the append-only trigger exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    let trigger_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_trigger WHERE tgname = 'trg_compliance_checks_immutable')",
    )
    .fetch_one(pool)
    .await?;

    if !trigger_exists {
        tracing::error!("Append-only trigger on compliance_checks is missing. Please run migrations.");
        return Ok(false);
    }

    Ok(true)
}
