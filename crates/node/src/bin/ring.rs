//! Fleet console: spawn every node of a bootstrap file in-process, print
//! the ring until SIGINT, then stop the nodes in sequence.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mailring_node::logging::init_logging;
use mailring_node::logging::LogLevel;
use mailring_node::Ring;

#[derive(Parser, Debug)]
#[command(name = "mailring-ring", about = "Run a whole mailring in one process")]
struct Args {
    /// Bootstrap file with the nodes to spawn.
    #[arg(long, default_value = "cfg.json")]
    config: PathBuf,

    /// Also write a Graphviz digraph of the ring here.
    #[arg(long)]
    dot: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> mailring_node::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let mut ring = Ring::bootstrap(&args.config).await?;
    if let Some(path) = &args.dot {
        ring.dot(path)?;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                println!("{}", chrono::Local::now().format("%a %b %e %T %Y"));
                print!("{ring}");
            }
        }
    }

    for node in ring.nodes().to_vec() {
        println!("Stopping node {}...", node.info().id);
        node.stop().await;
    }
    ring.shutdown().await;
    Ok(())
}
