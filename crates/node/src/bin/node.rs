//! Single-node daemon: bind, optionally join a ring, tick-print status
//! until SIGINT, then leave gracefully.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mailring_core::dht::PeerInfo;
use mailring_node::logging::init_logging;
use mailring_node::logging::LogLevel;
use mailring_node::Node;
use mailring_node::NodeConfig;

#[derive(Parser, Debug)]
#[command(name = "mailring-node", about = "Run a single mailring node")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// Port to bind.
    #[arg(long)]
    port: u16,

    /// Entry-point address to join through.
    #[arg(long, requires = "entry_port")]
    entry_address: Option<String>,

    /// Entry-point port.
    #[arg(long, requires = "entry_address")]
    entry_port: Option<u16>,

    /// Directory holding the dump file.
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Milliseconds between stabilization rounds.
    #[arg(long, default_value_t = 1000)]
    stabilize_interval: u64,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> mailring_node::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let config = NodeConfig {
        stabilize_interval: Duration::from_millis(args.stabilize_interval),
        data_dir: args.data_dir,
    };
    let node = Node::start_with_config(&args.address, args.port, config).await?;

    if let (Some(address), Some(port)) = (args.entry_address, args.entry_port) {
        node.join(&PeerInfo::new(address, port)).await?;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                println!(
                    "{}  {} @ {} managing {} mailboxes",
                    chrono::Local::now().format("%a %b %e %T %Y"),
                    node.info().id,
                    node.info().conn_string(),
                    node.mailbox_count().unwrap_or(0)
                );
            }
        }
    }

    node.stop().await;
    Ok(())
}
