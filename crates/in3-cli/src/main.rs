//! # in3 CLI
//!
//! Thin command-line front end over `in3-client`, for manual/interactive
//! dispatch of JSON-RPC requests through the trust-minimized engine.

mod transport;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use in3_client::Client;
use in3_context::RpcRequest;

use transport::HttpTransport;

#[derive(Parser)]
#[command(name = "in3")]
#[command(about = "in3 request-execution engine CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Dispatch a single JSON-RPC call through the engine.
    Call {
        /// Chain id or well-known name (mainnet, kovan, goerli, ipfs, local).
        #[arg(short, long, default_value = "mainnet")]
        chain: String,

        /// RPC method name, e.g. eth_blockNumber.
        #[arg(short, long)]
        method: String,

        /// JSON array of params, e.g. '["0x1", false]'.
        #[arg(short, long, default_value = "[]")]
        params: String,

        /// Path to a JSON configuration document (§4.8) applied before dispatch.
        #[arg(long)]
        config: Option<String>,
    },

    /// Validate a configuration document against a fresh client without
    /// dispatching anything.
    CheckConfig {
        /// Path to a JSON configuration document.
        config: String,
    },
}

fn load_config_doc(path: &str) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config file {path} as JSON"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Call { chain, method, params, config } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("params must be a JSON array")?;

            let client = Client::new(0).context("constructing client")?;
            if let Some(path) = config {
                let doc = load_config_doc(&path)?;
                in3_client::configure(&client, &doc).context("applying config document")?;
            }
            client.set_transport(Arc::new(HttpTransport::default()));

            let chain_id = in3_client::config::parse_chain_id(&serde_json::Value::String(chain))
                .context("resolving chain")?;

            let request = RpcRequest { id: None, method, params };
            let responses = client
                .execute_rpc(chain_id, vec![request])
                .map_err(|e| anyhow::anyhow!("{e}"))?;

            for response in responses {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            Ok(())
        }
        Commands::CheckConfig { config } => {
            let client = Client::new(0).context("constructing client")?;
            let doc = load_config_doc(&config)?;
            in3_client::configure(&client, &doc).map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("config document is valid");
            Ok(())
        }
    }
}
