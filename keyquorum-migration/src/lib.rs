pub use sea_orm_migration::prelude::*;

mod m20250902_000001_create_approval_tasks_table;
mod m20250902_000002_create_ballots_table;
mod m20250902_000003_create_deliveries_table;
mod m20250902_000004_create_approval_requests_table;
mod m20250915_000005_create_root_keys_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250902_000001_create_approval_tasks_table::Migration),
            Box::new(m20250902_000002_create_ballots_table::Migration),
            Box::new(m20250902_000003_create_deliveries_table::Migration),
            Box::new(m20250902_000004_create_approval_requests_table::Migration),
            Box::new(m20250915_000005_create_root_keys_table::Migration),
        ]
    }
}

#[cfg(feature = "testing")]
pub mod testing {
    use super::{Migrator, MigratorTrait};
    use sea_orm::{Database, DatabaseConnection};

    use keyquorum_core::{anyhow, sea_orm};

    pub async fn setup_testdb(database: &DatabaseConnection) -> anyhow::Result<()> {
        Migrator::up(database, None).await?;
        Ok(())
    }

    pub async fn testdb() -> anyhow::Result<DatabaseConnection> {
        let database = Database::connect("sqlite::memory:").await?;
        setup_testdb(&database).await?;
        Ok(database)
    }
}
