use anyhow::Result;
use clap::Parser;
use mailsift::app;
use mailsift::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    app::run(cli).await
}
