//! presence-ctl - operator CLI for the coordinator
//!
//! Usage:
//!   presence-ctl mode                      # Show current mode
//!   presence-ctl mode set attendance       # Switch devices to attendance
//!   presence-ctl enroll 584190023411 "Ada Lovelace"
//!   presence-ctl scan 584190023411 --action checkout --timestamp "2024-01-01 17:00:00"
//!   presence-ctl history
//!   presence-ctl users
//!   presence-ctl rename 584190023411 "Ada King"

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use presence_gateway::domain::wire::{EnrollRequest, ModeReply, RenameRequest, ScanRequest};
use presence_gateway::domain::{IdentityId, ScanAction, Timestamp};
use presence_gateway::io::{ClientError, CoordinatorApi, HttpCoordinatorClient};
use serde::Serialize;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "presence-ctl", version, about = "Operator CLI for the presence coordinator")]
struct Args {
    /// Coordinator base URL
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    url: String,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show or change the operating mode
    Mode {
        #[command(subcommand)]
        action: Option<ModeAction>,
    },
    /// Register a token under a name
    Enroll { identity_id: String, name: String },
    /// Submit a scan as a device would
    Scan {
        identity_id: String,
        /// Event time (YYYY-MM-DD HH:MM:SS); coordinator time when omitted
        #[arg(long)]
        timestamp: Option<Timestamp>,
        /// Force a check-in or check-out instead of toggling
        #[arg(long, value_enum)]
        action: Option<ActionArg>,
    },
    /// Session history, newest first
    History,
    /// Enrolled identities and who is checked in
    Users,
    /// Change the display name of an identity
    Rename { identity_id: String, name: String },
}

#[derive(Subcommand, Debug)]
enum ModeAction {
    Get,
    Set { mode: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ActionArg {
    Checkin,
    Checkout,
}

impl From<ActionArg> for ScanAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Checkin => ScanAction::Checkin,
            ActionArg::Checkout => ScanAction::Checkout,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(client: &HttpCoordinatorClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Mode { action: None | Some(ModeAction::Get) } => {
            let mode = client.fetch_mode().await?;
            print_json(&ModeReply { mode })
        }
        Command::Mode { action: Some(ModeAction::Set { mode }) } => {
            print_json(&client.set_mode(&mode).await?)
        }
        Command::Enroll { identity_id, name } => {
            let req = EnrollRequest { identity_id: IdentityId::new(identity_id), name };
            print_json(&client.enroll(&req).await?)
        }
        Command::Scan { identity_id, timestamp, action } => {
            let mut req = ScanRequest::new(IdentityId::new(identity_id));
            req.timestamp = timestamp;
            req.action_type = action.map(ScanAction::from);
            print_json(&client.scan(&req).await?)
        }
        Command::History => print_json(&client.history().await?),
        Command::Users => print_json(&client.users().await?),
        Command::Rename { identity_id, name } => {
            let req = RenameRequest { identity_id: IdentityId::new(identity_id), name };
            print_json(&client.rename(&req).await?)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let timeout = Duration::from_millis(args.timeout_ms);
    let client = HttpCoordinatorClient::new(&args.url, timeout, timeout)
        .context("Failed to build HTTP client")?;

    let result = run(&client, args.command).await;
    // Rejections carry a JSON body worth showing as-is
    if let Some(ClientError::Status { body, .. }) =
        result.as_ref().err().and_then(|e| e.downcast_ref::<ClientError>())
    {
        println!("{}", body);
    }
    result.with_context(|| format!("Request to {} failed", client.base_url()))
}
