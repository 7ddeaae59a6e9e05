//! Send a WhatsApp template message.
//!
//! Smoke test for the messaging credentials: templates are the only
//! message type allowed outside a customer-initiated session.
//!
//! ```bash
//! send-template 15550001111
//! send-template 15550001111 --name order_update --language en
//! ```

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;

use catalog_bot::channels::{Messenger, OutboundPayload, WhatsAppClient};
use catalog_bot::config::{DEFAULT_WHATSAPP_API_BASE, MessagingConfig};

#[derive(Parser)]
#[command(name = "send-template")]
#[command(version, about = "Send a WhatsApp template message")]
struct Args {
    /// Recipient phone number in international format, digits only
    to: String,

    /// Approved template name
    #[arg(short, long, default_value = "hello_world")]
    name: String,

    /// Template language code
    #[arg(short, long, default_value = "en_US")]
    language: String,

    #[arg(long, env = "WHATSAPP_TOKEN", hide_env_values = true)]
    token: String,

    #[arg(long, env = "WHATSAPP_PHONE_NUMBER_ID")]
    phone_number_id: String,

    #[arg(long, env = "WHATSAPP_API_BASE", default_value = DEFAULT_WHATSAPP_API_BASE)]
    api_base: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let client = WhatsAppClient::new(&MessagingConfig {
        access_token: SecretString::from(args.token),
        phone_number_id: args.phone_number_id,
        api_base: args.api_base,
    });

    client
        .send(&args.to, OutboundPayload::template(&args.name, &args.language))
        .await
        .with_context(|| format!("failed to send template {} to {}", args.name, args.to))?;

    println!("Sent template {} ({}) to {}", args.name, args.language, args.to);
    Ok(())
}
