pub mod approval_request;
pub mod approval_task;
pub mod ballot;
pub mod delivery;
pub mod key_type;
pub mod root_key;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use keyquorum_core::{anyhow, sea_orm};

pub async fn database_connection_pool(url: &str) -> anyhow::Result<DatabaseConnection> {
    let mut opts = ConnectOptions::from(url);
    opts.max_connections(10);
    Ok(Database::connect(opts).await?)
}
