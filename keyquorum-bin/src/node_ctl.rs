use std::sync::Arc;

use anyhow::anyhow;
use log::{debug, error, info};
use sea_orm::DatabaseConnection;
use tokio::time::Duration;

use keyquorum_approver::{ApprovalServer, ApproverHttpServer, HttpVoteForwarder};
use keyquorum_coordinator::{
    Coordinator, CoordinatorHttpServer, DatabaseApprovalStore, HttpApprovalNotifier,
};
use keyquorum_core::{anyhow, log, sea_orm, tokio, ApproverId};
use keyquorum_gate::{
    EnvelopeService, GateHttpServer, KeyReleaseGate, OutcomeSource, RemoteOutcomeSource,
    StoreOutcomeSource,
};
use keyquorum_kms::{CustodianKms, KeyManagementClient, VaultConfig, VaultTransitClient};
use keyquorum_migration::{Migrator, MigratorTrait};

async fn open_database(db_url: &str, migrate: bool) -> anyhow::Result<DatabaseConnection> {
    let database = keyquorum_entity::database_connection_pool(db_url).await?;
    if migrate {
        info!("Applying pending migrations");
        Migrator::up(&database, None).await?;
    }
    Ok(database)
}

pub struct CoordinatorNodeCtl {
    http_addr: String,
    advertise_url: String,
    notify_timeout: Duration,
    database: DatabaseConnection,
}

impl CoordinatorNodeCtl {
    pub async fn new(
        http_addr: String,
        advertise_url: String,
        notify_timeout: Duration,
        db_url: String,
        migrate: bool,
    ) -> anyhow::Result<Self> {
        Ok(CoordinatorNodeCtl {
            http_addr,
            advertise_url,
            notify_timeout,
            database: open_database(&db_url, migrate).await?,
        })
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        debug!("Creating coordinator service");
        let coordinator = Arc::new(Coordinator::new(
            Arc::new(DatabaseApprovalStore::new(self.database.clone())),
            Arc::new(HttpApprovalNotifier::new(self.notify_timeout)),
            self.advertise_url.clone(),
        ));
        let resumed = coordinator.resume_deliveries().await?;
        if resumed > 0 {
            info!("Resumed {} queued notifications", resumed);
        }
        let coordinator_http = CoordinatorHttpServer::new(coordinator, &self.http_addr).await?;
        let handle = coordinator_http.handle();

        info!("Coordinator listening on {}", self.http_addr);
        tokio::spawn(async move {
            let res = coordinator_http.listen().await;
            error!("Coordinator HTTP exited {:?}", res);
        });

        tokio::signal::ctrl_c().await?;
        handle.stop(true).await;
        Ok(())
    }
}

pub struct ApproverNodeCtl {
    http_addr: String,
    approver_id: ApproverId,
    callback_timeout: Duration,
    database: DatabaseConnection,
}

impl ApproverNodeCtl {
    pub async fn new(
        http_addr: String,
        approver_id: ApproverId,
        callback_timeout: Duration,
        db_url: String,
        migrate: bool,
    ) -> anyhow::Result<Self> {
        Ok(ApproverNodeCtl {
            http_addr,
            approver_id,
            callback_timeout,
            database: open_database(&db_url, migrate).await?,
        })
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        debug!("Creating approval server for {}", self.approver_id);
        let server = Arc::new(ApprovalServer::new(
            self.approver_id.clone(),
            self.database.clone(),
            Arc::new(HttpVoteForwarder::new(self.callback_timeout)),
        ));
        let approver_http = ApproverHttpServer::new(server, &self.http_addr).await?;
        let handle = approver_http.handle();

        info!("Approver listening on {}", self.http_addr);
        tokio::spawn(async move {
            let res = approver_http.listen().await;
            error!("Approver HTTP exited {:?}", res);
        });

        tokio::signal::ctrl_c().await?;
        handle.stop(true).await;
        Ok(())
    }
}

/// Which KMS backs the gate's root keys
#[derive(Clone, Debug)]
pub enum KmsConfig {
    Local { master_key: Vec<u8> },
    Vault(VaultConfig),
}

pub struct GateNodeCtl {
    http_addr: String,
    kms: Arc<dyn KeyManagementClient>,
    outcomes: Arc<dyn OutcomeSource>,
}

impl GateNodeCtl {
    pub async fn new(
        http_addr: String,
        db_url: String,
        kms: KmsConfig,
        coordinator_url: Option<String>,
        outcome_timeout: Duration,
        migrate: bool,
    ) -> anyhow::Result<Self> {
        let database = open_database(&db_url, migrate).await?;

        let kms: Arc<dyn KeyManagementClient> = match kms {
            KmsConfig::Local { master_key } => {
                Arc::new(CustodianKms::new(master_key, database.clone())?)
            }
            KmsConfig::Vault(config) => {
                if config.token.is_empty() {
                    return Err(anyhow!("A vault token is required with --kms vault"));
                }
                Arc::new(VaultTransitClient::new(config))
            }
        };

        // Without a coordinator url the gate shares the coordinator's database
        let outcomes: Arc<dyn OutcomeSource> = match coordinator_url {
            Some(url) => Arc::new(RemoteOutcomeSource::new(url, outcome_timeout)),
            None => Arc::new(StoreOutcomeSource::new(Arc::new(
                DatabaseApprovalStore::new(database),
            ))),
        };

        Ok(GateNodeCtl {
            http_addr,
            kms,
            outcomes,
        })
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        debug!("Creating key release gate");
        let gate = Arc::new(KeyReleaseGate::new(self.outcomes.clone(), self.kms.clone()));
        let envelopes = Arc::new(EnvelopeService::new(self.kms.clone()));
        let gate_http = GateHttpServer::new(gate, envelopes, &self.http_addr).await?;
        let handle = gate_http.handle();

        info!("Gate listening on {}", self.http_addr);
        tokio::spawn(async move {
            let res = gate_http.listen().await;
            error!("Gate HTTP exited {:?}", res);
        });

        tokio::signal::ctrl_c().await?;
        handle.stop(true).await;
        Ok(())
    }
}
