use clap::{Parser, Subcommand};
use env_logger::Env;
use log::trace;

use keyquorum::approver_ctl::{ApproverCtl, ApproverSubcommand};
use keyquorum::coordinator_ctl::{CoordinatorCtl, CoordinatorSubcommand};
use keyquorum::gate_ctl::{GateCtl, GateSubcommand};
use keyquorum_core::{actix_rt, anyhow, log, ApproverId};
use keyquorum_http::{ApprovalNotice, DecisionRequest, StartApprovalRequest, VoteRequest};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short = 'v', long)]
    verbose: bool,

    #[clap(short, long, default_value_t = String::from("http://127.0.0.1:7000"))]
    coordinator_endpoint: String,

    #[clap(short, long, default_value_t = String::from("http://127.0.0.1:7100"))]
    approver_endpoint: String,

    #[clap(short, long, default_value_t = String::from("http://127.0.0.1:7200"))]
    gate_endpoint: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[clap(subcommand)]
    Coordinator(CoordinatorSubcommand),
    #[clap(subcommand)]
    Approver(ApproverSubcommand),
    #[clap(subcommand)]
    Gate(GateSubcommand),
}

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    let env_level = Env::default().default_filter_or("keyquorum=info");
    env_logger::Builder::from_env(env_level).init();

    let cli = Cli::parse();

    trace!("keyquorumctl {:?}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Coordinator(subcommand) => {
            let coordinator = CoordinatorCtl::new(cli.verbose, cli.coordinator_endpoint);
            match subcommand {
                CoordinatorSubcommand::StartApproval {
                    client_id,
                    approvers,
                    content,
                    threshold,
                } => {
                    coordinator
                        .start_approval(StartApprovalRequest {
                            client_id,
                            approvers: approvers.into_iter().map(ApproverId::from).collect(),
                            content,
                            threshold,
                        })
                        .await?;
                }
                CoordinatorSubcommand::Vote {
                    client_id,
                    approver,
                    decision,
                } => {
                    coordinator
                        .vote(VoteRequest {
                            client_id,
                            approver: approver.into(),
                            decision: decision.into(),
                        })
                        .await?;
                }
                CoordinatorSubcommand::Outcome { client_id } => {
                    coordinator.outcome(&client_id).await?;
                }
                CoordinatorSubcommand::Deliveries { client_id } => {
                    coordinator.deliveries(&client_id).await?;
                }
                CoordinatorSubcommand::Redeliver { client_id } => {
                    coordinator.redeliver(&client_id).await?;
                }
                CoordinatorSubcommand::Version {} => {
                    coordinator.version().await?;
                }
            }
        }
        Commands::Approver(subcommand) => {
            let approver = ApproverCtl::new(cli.verbose, cli.approver_endpoint);
            match subcommand {
                ApproverSubcommand::Notify {
                    client_id,
                    content,
                    callback_address,
                } => {
                    approver
                        .notify(ApprovalNotice {
                            client_id,
                            content,
                            callback_address,
                        })
                        .await?;
                }
                ApproverSubcommand::Decide {
                    client_id,
                    decision,
                } => {
                    approver
                        .decide(DecisionRequest {
                            client_id,
                            decision: decision.into(),
                        })
                        .await?;
                }
                ApproverSubcommand::List { filter } => {
                    approver.list(filter.map(Into::into)).await?;
                }
                ApproverSubcommand::Redeliver { client_id } => {
                    approver.redeliver(&client_id).await?;
                }
                ApproverSubcommand::Version {} => {
                    approver.version().await?;
                }
            }
        }
        Commands::Gate(subcommand) => {
            let gate = GateCtl::new(cli.verbose, cli.gate_endpoint);
            match subcommand {
                GateSubcommand::Seal {
                    key_name,
                    cipher,
                    input,
                    output,
                } => {
                    gate.seal(&key_name, cipher.into(), input, output).await?;
                }
                GateSubcommand::Release { client_id, input } => {
                    gate.release(&client_id, input).await?;
                }
                GateSubcommand::Open {
                    client_id,
                    input,
                    output,
                } => {
                    gate.open(&client_id, input, output).await?;
                }
                GateSubcommand::Version {} => {
                    gate.version().await?;
                }
            }
        }
    }
    Ok(())
}
