use std::time::Duration;

use anyhow::anyhow;
use clap::Subcommand;
use serde::{Deserialize, Serialize};

use keyquorum_core::{anyhow, awc, serde, serde_json, url::Url};
use keyquorum_http::{endpoint_url, ApprovalNotice, DecisionRequest, RequestFilter};

use crate::coordinator_ctl::DecisionOpt;

#[derive(clap::ArgEnum, Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub enum FilterOpt {
    Pending,
    Decided,
}

impl From<FilterOpt> for RequestFilter {
    fn from(val: FilterOpt) -> RequestFilter {
        match val {
            FilterOpt::Pending => RequestFilter::Pending,
            FilterOpt::Decided => RequestFilter::Decided,
        }
    }
}

#[derive(Subcommand)]
pub enum ApproverSubcommand {
    /// Hand an approval task to the approver, as a coordinator would
    Notify {
        #[clap(short, long)]
        client_id: String,

        #[clap(short = 'C', long)]
        content: String,

        #[clap(short = 'b', long)]
        callback_address: String,
    },
    Decide {
        #[clap(short, long)]
        client_id: String,

        #[clap(short, long, arg_enum)]
        decision: DecisionOpt,
    },
    List {
        #[clap(short, long, arg_enum)]
        filter: Option<FilterOpt>,
    },
    Redeliver {
        #[clap(short, long)]
        client_id: String,
    },
    Version {},
}

pub struct ApproverCtl {
    verbose: bool,
    endpoint: String,
}

impl ApproverCtl {
    pub fn new(verbose: bool, endpoint: String) -> Self {
        ApproverCtl {
            verbose,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub async fn notify(&self, notice: ApprovalNotice) -> anyhow::Result<()> {
        self.send(self.url(&["approval"])?, Some(serde_json::to_value(&notice)?))
            .await
    }

    pub async fn decide(&self, req: DecisionRequest) -> anyhow::Result<()> {
        self.send(self.url(&["decision"])?, Some(serde_json::to_value(&req)?))
            .await
    }

    pub async fn list(&self, filter: Option<RequestFilter>) -> anyhow::Result<()> {
        let mut url = self.url(&["approvals"])?;
        match filter {
            Some(RequestFilter::Pending) => url.set_query(Some("type=pending")),
            Some(RequestFilter::Decided) => url.set_query(Some("type=decided")),
            None => {}
        }
        self.send(url, None).await
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
