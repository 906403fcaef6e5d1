use colored::*;

use songchain::config::TrackerConfig;
use songchain::net::tracker::Tracker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!();
    println!(
        "{}",
        "  SONGCHAIN TRACKER :: rendezvous service  "
            .bright_cyan()
            .bold()
    );
    println!();

    let cfg = TrackerConfig::from_env();
    println!(
        "{} peers will be contacted on port {}",
        "[init]".bright_blue().bold(),
        cfg.peer_port
    );

    let tracker = Tracker::bind(cfg).await?;
    tracker.run().await;
    Ok(())
}
