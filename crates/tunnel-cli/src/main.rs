//! tunnel-cli — interactive entry point for the UDP tunnel.
//!
//! Selects Offerer or Responder, walks the operator through the
//! invitation/response token exchange, installs any `--forward` rules, and
//! blocks until the session ends.

mod forward;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{Input, Select};
use tracing::{error, info};
use tunnel_session::{Invitation, Response, Session, SessionConfig, DEFAULT_STUN_SERVER};

use forward::ForwardRule;

/// tunnel-cli — peer-to-peer UDP tunnel over a negotiated data channel
#[derive(Parser)]
#[command(name = "tunnel-cli", version, about)]
struct Cli {
    /// STUN server used for ICE candidate gathering
    #[arg(long = "stun", default_value = DEFAULT_STUN_SERVER)]
    stun_server: String,

    /// Forward LOCAL:HOST:PORT — bind LOCAL, relay to HOST:PORT on the peer.
    /// Repeatable; may be given on either role's invocation.
    #[arg(short = 'L', long = "forward", value_name = "LOCAL:HOST:PORT")]
    forward: Vec<ForwardRule>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("tunnel_cli=debug,tunnel_session=debug,tunnel_core=debug")
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("tunnel_cli=info,tunnel_session=warn,tunnel_core=warn")
            .with_target(false)
            .init();
    }

    if let Err(err) = run(cli).await {
        error!("{err:#}");
        eprintln!("tunnel-cli: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = SessionConfig {
        ice_servers: vec![cli.stun_server],
        ..SessionConfig::default()
    };

    let roles = ["Offerer (start a new invitation)", "Responder (answer an invitation)"];
    let role = Select::new()
        .with_prompt("Select a role")
        .items(&roles)
        .default(0)
        .interact()
        .context("failed to read role selection")?;

    let mut session = match role {
        0 => run_offerer(config).await?,
        _ => run_responder(config).await?,
    };

    for rule in cli.forward {
        match session
            .forward_to_remote(rule.local_port, rule.remote_host.clone(), rule.remote_port)
            .await
        {
            Ok(()) => info!(%rule, "forwarding rule installed"),
            Err(err) => error!(%rule, error = %err, "failed to install forwarding rule, skipping it"),
        }
    }

    info!("tunnel established, running until the session closes");
    session.run_until_closed().await;
    info!("session closed");

    Ok(())
}

async fn run_offerer(config: SessionConfig) -> Result<Session> {
    let invitation = Invitation::new(config)
        .await
        .context("failed to build the invitation")?;

    println!("Send this invitation token to your peer:\n");
    println!("{}\n", invitation.invitation_token());

    let response_token: String = Input::new()
        .with_prompt("Paste the peer's response token")
        .interact_text()
        .context("failed to read the response token")?;

    invitation
        .connect(response_token.trim())
        .await
        .context("failed to complete bring-up")
}

async fn run_responder(config: SessionConfig) -> Result<Session> {
    let invitation_token: String = Input::new()
        .with_prompt("Paste the peer's invitation token")
        .interact_text()
        .context("failed to read the invitation token")?;

    let response = Response::new(invitation_token.trim(), config)
        .await
        .context("failed to build the response")?;

    println!("Send this response token back to your peer:\n");
    println!("{}\n", response.response_token());

    response.connect().await.context("failed to complete bring-up")
}
