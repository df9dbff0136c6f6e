//! WhatsApp bot session host.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin wabot-server
//! ```

use clap::Parser;
use wabot_server::Config;
use wabot_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    // .env is optional
    dotenvy::dotenv().ok();
    let config = Config::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    // Run the server
    if let Err(e) = wabot_server::run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
