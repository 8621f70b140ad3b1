pub use sea_orm_migration::prelude::*;

mod m20240101_000001_executors;
mod m20240101_000002_deals;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_executors::Migration),
            Box::new(m20240101_000002_deals::Migration),
        ]
    }
}
