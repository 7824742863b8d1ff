use anyhow::Context;
use pharmacy_bi::assistant::{AskClient, AssistantPanel, ChatRole};
use pharmacy_bi::config::AssistantConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AssistantConfig::from_env();
    let client = AskClient::new(&config).context("Failed to build HTTP client")?;
    let mut panel = AssistantPanel::new(client);
    panel.toggle();

    println!("🤖 Pharmacy Assistant ({} @ {})", config.default_db, config.ask_url);
    if panel.is_open() {
        println!(
            "Ask questions about your pharmacy data below. Empty line or /quit to {}.",
            panel.button_label()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("Your question: ");
        std::io::Write::flush(&mut std::io::stdout()).ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() || line == "/quit" {
            break;
        }

        if let Some(answer) = panel.send(line).await {
            println!("{}: {}", ChatRole::Assistant, answer);
        }
    }

    Ok(())
}
