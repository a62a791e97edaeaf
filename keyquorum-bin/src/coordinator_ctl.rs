use std::time::Duration;

use anyhow::anyhow;
use clap::Subcommand;
use serde::{Deserialize, Serialize};

use keyquorum_core::{anyhow, awc, serde, serde_json, url::Url};
use keyquorum_entity::ballot::Decision;
use keyquorum_http::{endpoint_url, StartApprovalRequest, VoteRequest};

#[derive(clap::ArgEnum, Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub enum DecisionOpt {
    Approve,
    Reject,
}

impl From<DecisionOpt> for Decision {
    fn from(val: DecisionOpt) -> Decision {
        match val {
            DecisionOpt::Approve => Decision::Approve,
            DecisionOpt::Reject => Decision::Reject,
        }
    }
}

#[derive(Subcommand)]
pub enum CoordinatorSubcommand {
    StartApproval {
        #[clap(short, long)]
        client_id: String,

        /// Approver endpoint, repeat for every approver
        #[clap(short, long = "approver", required = true)]
        approvers: Vec<String>,

        #[clap(short = 'C', long)]
        content: String,

        #[clap(short, long)]
        threshold: Option<u32>,
    },
    Vote {
        #[clap(short, long)]
        client_id: String,

        #[clap(short, long)]
        approver: String,

        #[clap(short, long, arg_enum)]
        decision: DecisionOpt,
    },
    Outcome {
        #[clap(short, long)]
        client_id: String,
    },
    Deliveries {
        #[clap(short, long)]
        client_id: String,
    },
    Redeliver {
        #[clap(short, long)]
        client_id: String,
    },
    Version {},
}

pub struct CoordinatorCtl {
    verbose: bool,
    endpoint: String,
}

impl CoordinatorCtl {
    pub fn new(verbose: bool, endpoint: String) -> Self {
        CoordinatorCtl {
            verbose,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub async fn start_approval(&self, req: StartApprovalRequest) -> anyhow::Result<()> {
        self.send(self.url(&["start_approval"])?, Some(serde_json::to_value(&req)?))
            .await
    }

    pub async fn vote(&self, req: VoteRequest) -> anyhow::Result<()> {
        self.send(self.url(&["vote"])?, Some(serde_json::to_value(&req)?)).await
    }

    pub async fn outcome(&self, client_id: &str) -> anyhow::Result<()> {
        self.send(self.url(&["outcome", client_id])?, None).await
    }

    pub async fn deliveries(&self, client_id: &str) -> anyhow::Result<()> {
        self.send(self.url(&["deliveries", client_id])?, None).await
    }

    pub async fn redeliver(&self, client_id: &str) -> anyhow::Result<()> {
        self.send(
            self.url(&["redeliver", client_id])?,
            Some(serde_json::Value::Null),
        )
        .await
    }

    pub async fn version(&self) -> anyhow::Result<()> {
        self.send(self.url(&["version"])?, None).await
    }

    fn url(&self, segments: &[&str]) -> anyhow::Result<Url> {
        endpoint_url(&self.endpoint, segments)
    }

    /// POST when a body is given, GET otherwise
    async fn send(&self, url: Url, body: Option<serde_json::Value>) -> anyhow::Result<()> {

        if self.verbose {
            println!("*****************************");
            println!("********** REQUEST **********");
            println!("*****************************");
            println!("{}", url);
            if let Some(body) = &body {
                println!("{}", serde_json::to_string_pretty(body)?);
            }
        }

        let client = awc::Client::default();
        let req = match body {
            Some(_) => client.post(url.as_str()),
            None => client.get(url.as_str()),
        }
        .insert_header((
            "User-Agent",
            format!("keyquorum-cli/v{}", env!("CARGO_PKG_VERSION")),
        ))
        .timeout(Duration::from_secs(60));
        let mut response = match body {
            Some(body) => req.send_json(&body).await,
            None => req.send().await,
        }
        .map_err(|err| anyhow!("{}", err))?;

        let response_json: serde_json::Value = response.json().await?;
        if self.verbose {
            println!("******************************");
            println!("********** RESPONSE **********");
            println!("******************************");
            println!("{:?}", response);
        }
        println!("{}", serde_json::to_string_pretty(&response_json)?);
        Ok(())
    }
}
