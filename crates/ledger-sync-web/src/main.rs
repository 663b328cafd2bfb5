use clap::Parser;
use ledger_sync::AutoRunConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ledger-sync-web")]
#[command(about = "Background service holding the ledger for ledger-sync")]
struct Args {
    /// Ledger file, created on first write
    #[arg(short, long)]
    ledger: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value_t = ledger_sync_web::DEFAULT_PORT)]
    port: u16,

    /// The bank lists several accounts
    #[arg(long)]
    multi_account: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let auto_run = AutoRunConfig {
        single_account_bank: !args.multi_account,
        ..AutoRunConfig::default()
    };
    ledger_sync_web::run(args.ledger, auto_run, args.port).await
}
