#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledger_sync_cli::run(std::env::args()).await
}
