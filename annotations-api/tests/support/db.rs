use annotations_api::db::{DbClient, DbConfig};
use rand::Rng;

const SCHEMA: &str = include_str!("../../migrations/001_init.sql");

pub async fn test_db_client() -> DbClient {
    let config = DbConfig::from_env();
    let db = DbClient::from_config(&config).expect("Failed to create database client");
    db.writer()
        .await
        .expect("Failed to get writer connection")
        .batch_execute(SCHEMA)
        .await
        .expect("Failed to apply schema");
    db
}

/// A user id no other test run is likely to share.
pub fn fresh_user_id() -> i64 {
    rand::rng().random_range(1_000_000_000..i64::MAX / 2)
}
