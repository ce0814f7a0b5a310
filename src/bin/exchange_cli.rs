use anyhow::{Context as _, Result};
use clap::{Parser as _, Subcommand};
use serde_json::json;
use swap_exchange_core::proto::v1::exchange_service_client::ExchangeServiceClient;
use swap_exchange_core::proto::v1::{
    AcceptZeroConfRequest, GetPairsRequest, GetSwapStatusRequest, MinerFees,
    StreamSwapStatusRequest, SwapStatusUpdate, VerifyPairHashRequest,
};

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    grpc_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    GetPairs,
    VerifyHash {
        #[arg(long)]
        pair_id: String,

        #[arg(long)]
        hash: String,
    },
    AcceptZeroConf {
        #[arg(long)]
        currency: String,

        #[arg(long)]
        amount: u64,
    },
    GetStatus {
        #[arg(long)]
        swap_id: String,
    },
    /// Prints one JSON line per status update until the server closes the stream.
    StreamStatus {
        #[arg(long)]
        swap_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    swap_exchange_core::logging::init().ok();
    let args = Args::parse();

    let mut client = ExchangeServiceClient::connect(args.grpc_url)
        .await
        .context("connect gRPC")?;

    let out = match args.command {
        Command::GetPairs => {
            let resp = client
                .get_pairs(GetPairsRequest {})
                .await
                .context("GetPairs")?
                .into_inner();

            let pairs: Vec<_> = resp
                .pairs
                .into_iter()
                .map(|p| {
                    json!({
                      "id": p.id,
                      "hash": p.hash,
                      "rate": p.rate,
                      "limits": p.limits.map(|l| json!({
                        "minimal": l.minimal,
                        "maximal": l.maximal,
                        "maximal_zero_conf_base": l.maximal_zero_conf_base,
                        "maximal_zero_conf_quote": l.maximal_zero_conf_quote,
                      })),
                      "fees": p.fees.map(|f| json!({
                        "percentage": f.percentage,
                        "base_asset": f.base_asset.map(miner_fees_json),
                        "quote_asset": f.quote_asset.map(miner_fees_json),
                      })),
                    })
                })
                .collect();
            json!({ "pairs": pairs })
        }
        Command::VerifyHash { pair_id, hash } => {
            client
                .verify_pair_hash(VerifyPairHashRequest {
                    pair_id: pair_id.clone(),
                    hash,
                })
                .await
                .context("VerifyPairHash")?;

            json!({ "pair_id": pair_id, "valid": true })
        }
        Command::AcceptZeroConf { currency, amount } => {
            let resp = client
                .accept_zero_conf(AcceptZeroConfRequest {
                    currency: currency.clone(),
                    amount,
                })
                .await
                .context("AcceptZeroConf")?
                .into_inner();

            json!({
              "currency": currency,
              "amount": amount,
              "accepted": resp.accepted,
            })
        }
        Command::GetStatus { swap_id } => {
            let update = client
                .get_swap_status(GetSwapStatusRequest { swap_id })
                .await
                .context("GetSwapStatus")?
                .into_inner();

            update_json(update)
        }
        Command::StreamStatus { swap_id } => {
            let mut stream = client
                .stream_swap_status(StreamSwapStatusRequest { swap_id })
                .await
                .context("StreamSwapStatus")?
                .into_inner();

            while let Some(update) = stream.message().await.context("read status stream")? {
                println!("{}", serde_json::to_string(&update_json(update))?);
            }
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn miner_fees_json(fees: MinerFees) -> serde_json::Value {
    json!({
      "normal": fees.normal,
      "reverse_lockup": fees.reverse_lockup,
      "reverse_claim": fees.reverse_claim,
    })
}

fn update_json(update: SwapStatusUpdate) -> serde_json::Value {
    json!({
      "swap_id": update.swap_id,
      "status": update.status,
      "zero_conf_rejected": update.zero_conf_rejected,
      "failure_reason": update.failure_reason,
      "channel": update.channel.map(|c| json!({
        "funding_transaction_id": c.funding_transaction_id,
        "funding_transaction_vout": c.funding_transaction_vout,
      })),
      "transaction": update.transaction.map(|t| json!({
        "id": t.id,
        "hex": t.hex,
        "eta": t.eta,
      })),
    })
}
