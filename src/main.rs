use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = fanfetch::cli::Cli::parse();
    if let Err(e) = fanfetch::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
