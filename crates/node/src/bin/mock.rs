//! Mock-data loader: register the sample accounts against a live ring and
//! spray some randomized mail between them.

use std::path::PathBuf;

use clap::Parser;
use mailring_core::mail::Message;
use mailring_node::logging::init_logging;
use mailring_node::logging::LogLevel;
use mailring_node::Client;
use mailring_node::MockData;

#[derive(Parser, Debug)]
#[command(name = "mailring-mock", about = "Load mock accounts and mail into a ring")]
struct Args {
    /// Connection string of any live node.
    #[arg(long)]
    connect: String,

    /// Mock-data archive.
    #[arg(long, default_value = "mock_data.json")]
    mock: PathBuf,

    /// Messages to send per account.
    #[arg(long, default_value_t = 3)]
    messages: usize,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

fn pick(pool: &[String]) -> Option<&str> {
    if pool.is_empty() {
        return None;
    }
    Some(pool[rand::random::<usize>() % pool.len()].as_str())
}

#[tokio::main]
async fn main() -> mailring_node::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let data = MockData::load(&args.mock)?;
    let mut client = Client::connect(&args.connect).await?;

    for (user, password) in data.users.iter().zip(&data.passwords) {
        match client.account_register(user, password).await {
            Ok(node) => tracing::info!(%user, node = %node, "account registered"),
            Err(e) => tracing::warn!(%user, error = %e, "registration failed"),
        }
    }

    for (user, password) in data.users.iter().zip(&data.passwords) {
        if client.account_login(user, password).await.is_err() {
            continue;
        }
        for _ in 0..args.messages {
            let (Some(to), Some(subject), Some(body)) = (
                pick(&data.users),
                pick(&data.subjects),
                pick(&data.bodies),
            ) else {
                break;
            };
            let msg = Message::new(to, user.as_str(), subject, body);
            if let Err(e) = client.send(msg).await {
                tracing::warn!(from = %user, %to, error = %e, "send failed");
            }
        }
    }

    Ok(())
}
