use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = relay_router::cli::Cli::parse();
    if let Err(e) = relay_router::cmd::dispatch(cli).await {
        tracing::error!(error = %e, "relay-router failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
