//! Embedded schema migrations, applied on startup when `auto_migrate` is set
//! and by the `migration` binary.

use sea_orm_migration::prelude::*;

mod m20250101_000001_create_identity_tables;
mod m20250101_000002_create_catalog_tables;
mod m20250101_000003_create_social_tables;
mod m20250101_000004_create_commerce_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_identity_tables::Migration),
            Box::new(m20250101_000002_create_catalog_tables::Migration),
            Box::new(m20250101_000003_create_social_tables::Migration),
            Box::new(m20250101_000004_create_commerce_tables::Migration),
        ]
    }
}

/// Renders the boolean literal the backend stores for `true` in partial index predicates.
pub(crate) fn sql_true(backend: sea_orm::DbBackend) -> &'static str {
    match backend {
        sea_orm::DbBackend::Postgres => "TRUE",
        _ => "1",
    }
}
