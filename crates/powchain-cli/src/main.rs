use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use powchain_core::{Block, ChainView};
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powchain-cli")]
#[command(about = "CLI client for the powchain ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction to the mempool
    Submit {
        /// Sender
        #[arg(long)]
        from: String,
        /// Recipient
        #[arg(long)]
        to: String,
        /// Amount
        #[arg(long)]
        amount: f64,
    },
    /// Print the chain and the next difficulty
    Chain,
    /// Print pending transactions
    Mempool,
    /// Mine the pending transactions into a new block
    Mine,
    /// Validate a chain snapshot
    Validate {
        /// JSON file holding `[Block, ...]` or `{"chain": [Block, ...]}`; the live chain when omitted
        #[arg(long)]
        file: Option<PathBuf>,
        /// Edit the first transaction of this block before validating
        #[arg(long, requires = "tamper_amount")]
        tamper_index: Option<usize>,
        #[arg(long)]
        tamper_amount: Option<f64>,
    },
}

#[derive(Serialize)]
struct Tx {
    from: String,
    to: String,
    amount: f64,
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    chain: &'a [Block],
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new();
    let node = cli.node.trim_end_matches('/');

    let res = match cli.cmd {
        Command::Submit { from, to, amount } => {
            let tx = Tx { from, to, amount };
            client.post(format!("{node}/tx")).json(&tx).send().await?
        }
        Command::Chain => client.get(format!("{node}/chain")).send().await?,
        Command::Mempool => client.get(format!("{node}/mempool")).send().await?,
        Command::Mine => client.post(format!("{node}/mine")).send().await?,
        Command::Validate {
            file,
            tamper_index,
            tamper_amount,
        } => {
            let mut chain = match file {
                Some(path) => read_snapshot(&path)?,
                None => {
                    let view: ChainView = client
                        .get(format!("{node}/chain"))
                        .send()
                        .await?
                        .error_for_status()?
                        .json()
                        .await?;
                    view.chain
                }
            };
            if let (Some(index), Some(amount)) = (tamper_index, tamper_amount) {
                tamper(&mut chain, index, amount)?;
            }
            client
                .post(format!("{node}/chain/validate"))
                .json(&ValidateRequest { chain: &chain })
                .send()
                .await?
        }
    };
    print_response(res).await
}

fn read_snapshot(path: &Path) -> Result<Vec<Block>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)?;
    let chain = match value {
        Value::Object(mut obj) => obj.remove("chain").context("object has no `chain` field")?,
        other => other,
    };
    Ok(serde_json::from_value(chain)?)
}

/// Change one transaction without re-mining, the way a hand edit would.
fn tamper(chain: &mut [Block], index: usize, amount: f64) -> Result<()> {
    let Some(block) = chain.get_mut(index) else {
        bail!("chain has no block {index}");
    };
    let Some(tx) = block.transactions.first_mut() else {
        bail!("block {index} has no transactions to edit");
    };
    debug!(index, from = tx.amount, to = amount, "tampering with block");
    tx.amount = amount;
    Ok(())
}

async fn print_response(res: Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
