use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use crate::error::ApiError;

/// Type alias for the PostgreSQL connection pool
pub type DbPool = PgPool;

/// Creates and configures a PostgreSQL connection pool
///
/// # Arguments
/// * `database_url` - PostgreSQL connection string
///
/// # Returns
/// * `Result<DbPool>` - Configured connection pool or error
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    tracing::debug!("Creating database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;

    tracing::info!("Database connection pool created successfully");
    Ok(pool)
}

/// Check if a service offering with the given name already exists
///
/// # Arguments
/// * `pool` - Database connection pool
/// * `name` - Offering name to check for duplicates
///
/// # Returns
/// * `Result<bool, ApiError>` - True if duplicate exists, false otherwise
pub async fn check_duplicate_offering(
    pool: &PgPool,
    name: &str,
) -> Result<bool, ApiError> {
    tracing::debug!("Checking for duplicate offering: {}", name);

    let exists: Option<bool> = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM service_offerings WHERE name = $1)"
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    let is_duplicate = exists.unwrap_or(false);
    if is_duplicate {
        tracing::debug!("Duplicate offering found: {}", name);
    }

    Ok(is_duplicate)
}

/// Check if a service offering with the given name already exists, excluding
/// a specific ID. Used by update operations so an offering can keep its name.
pub async fn check_duplicate_offering_excluding_id(
    pool: &PgPool,
    name: &str,
    exclude_id: i32,
) -> Result<bool, ApiError> {
    let exists: Option<bool> = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM service_offerings WHERE name = $1 AND id != $2)"
    )
    .bind(name)
    .bind(exclude_id)
    .fetch_one(pool)
    .await?;

    Ok(exists.unwrap_or(false))
}

/// Check whether any booking still references the given offering.
/// Referenced offerings are protected from deletion.
pub async fn offering_is_referenced(
    pool: &PgPool,
    offering_id: i32,
) -> Result<bool, ApiError> {
    let exists: Option<bool> = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM bookings WHERE offering_id = $1)"
    )
    .bind(offering_id)
    .fetch_one(pool)
    .await?;

    Ok(exists.unwrap_or(false))
}
