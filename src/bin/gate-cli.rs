use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use render_gate::access::{Authority, HttpAuthority};
use render_gate::config::AuthorityConfig;
use render_gate::render::{Classification, ModeSelector, PatternClassifier};

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Probe the authorization service and bot classifier used by render-gate", long_about = None)]
struct Cli {
    /// Authorization service base URL.
    #[arg(short, long, env = "GATE_AUTH_HOST", default_value = "http://localhost:8080")]
    auth_host: String,

    /// Per-call timeout in milliseconds.
    #[arg(short, long, default_value_t = 5_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask whether an origin is public
    Public { origin: String },
    /// Validate a token or session for an origin
    Validate { token: String, origin: String },
    /// Classify a user agent and show the render mode it gets
    Classify { user_agent: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AuthorityConfig {
        host: cli.auth_host,
        timeout_ms: cli.timeout_ms,
        ..Default::default()
    };
    let authority = HttpAuthority::new(&config, reqwest::Client::new());

    let output = match cli.command {
        Commands::Public { origin } => match authority.is_public(&origin).await {
            Ok(is_public) => json!({ "origin": origin, "isPublic": is_public }),
            Err(e) => json!({ "origin": origin, "error": e.to_string() }),
        },
        Commands::Validate { token, origin } => match authority.validate(&token, &origin).await {
            Ok(v) => json!({ "origin": origin, "allowed": v.allowed }),
            Err(e) => json!({ "origin": origin, "error": e.to_string() }),
        },
        Commands::Classify { user_agent } => {
            let selector = ModeSelector::new(Some(Arc::new(PatternClassifier::default())), false);
            json!({
                "userAgent": user_agent,
                "crawler": selector.classify(Some(&user_agent)) == Classification::Crawler,
                "mode": selector.select(Some(&user_agent)).as_str(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
