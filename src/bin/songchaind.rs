use std::time::Duration;

use colored::*;

use songchain::config::PeerConfig;
use songchain::net::peer::Peer;

fn banner() {
    println!();
    println!(
        "{}",
        " ███████╗ ██████╗ ███╗   ██╗ ██████╗  ██████╗██╗  ██╗ █████╗ ██╗███╗   ██╗".bright_cyan()
    );
    println!(
        "{}",
        " ██╔════╝██╔═══██╗████╗  ██║██╔════╝ ██╔════╝██║  ██║██╔══██╗██║████╗  ██║".bright_cyan()
    );
    println!(
        "{}",
        " ███████╗██║   ██║██╔██╗ ██║██║  ███╗██║     ███████║███████║██║██╔██╗ ██║"
            .bright_cyan()
            .bold()
    );
    println!(
        "{}",
        " ╚════██║██║   ██║██║╚██╗██║██║   ██║██║     ██╔══██║██╔══██║██║██║╚██╗██║"
            .bright_cyan()
            .bold()
    );
    println!(
        "{}",
        " ███████║╚██████╔╝██║ ╚████║╚██████╔╝╚██████╗██║  ██║██║  ██║██║██║ ╚████║".blue()
    );
    println!(
        "{}",
        " ╚══════╝ ╚═════╝ ╚═╝  ╚═══╝ ╚═════╝  ╚═════╝╚═╝  ╚═╝╚═╝  ╚═╝╚═╝╚═╝  ╚═══╝".blue()
    );
    println!();
    println!(
        "{}",
        "        Peer-to-peer song ownership ledger        "
            .bright_green()
            .bold()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    banner();

    // Single positional argument: seconds to stay in the mesh. Without
    // it the peer stays until killed.
    let stay = match std::env::args().nth(1) {
        Some(arg) => match arg.parse::<u64>() {
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(_) => {
                eprintln!("usage: songchaind [stay_seconds]");
                std::process::exit(2);
            }
        },
        None => None,
    };

    let cfg = PeerConfig::from_env();
    println!(
        "{} host: {}  tracker: {}",
        "[init]".bright_blue().bold(),
        cfg.host_ip,
        cfg.tracker_addr
    );
    match stay {
        Some(duration) => println!(
            "{} staying for {} seconds",
            "[init]".bright_blue().bold(),
            duration.as_secs()
        ),
        None => println!(
            "{} staying until interrupted",
            "[init]".bright_blue().bold()
        ),
    }

    let peer = Peer::new(cfg);
    println!(
        "{} genesis block mined, signature {}",
        "[init]".bright_blue().bold(),
        &peer.signature()[..16]
    );

    peer.start().await?;
    peer.run_for(stay).await;
    Ok(())
}
