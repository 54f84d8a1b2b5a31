use std::sync::Arc;

use anyhow::Result;
use chrono::TimeDelta;
use clap::Parser;
use contactbook::{auth::TokenKeys, handlers::AppState, store};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "contactbook", about = "Contacts manager REST API")]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "5001")]
    port: u16,

    /// Database connection string (SQLite path)
    #[arg(long, env = "CONNECTION_STRING", default_value = "contactbook.db")]
    connection_string: String,

    /// Secret used to sign access tokens
    #[arg(long, env = "ACCESS_TOKEN_SECRET", hide_env_values = true)]
    token_secret: String,

    /// Access token lifetime in minutes
    #[arg(
        long,
        env = "ACCESS_TOKEN_TTL_MINUTES",
        default_value = "60",
        value_parser = clap::value_parser!(i64).range(1..=525_600)
    )]
    token_ttl_minutes: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("contactbook=info".parse()?))
        .init();

    let cli = Cli::parse();

    let conn = match store::open(&cli.connection_string) {
        Ok(conn) => conn,
        Err(e) => {
            error!("Failed to connect to database {}: {e:#}", cli.connection_string);
            std::process::exit(1);
        }
    };
    info!("Database connected: {}", cli.connection_string);

    let state = Arc::new(AppState {
        conn,
        tokens: TokenKeys::new(
            cli.token_secret.as_bytes(),
            TimeDelta::minutes(cli.token_ttl_minutes),
        ),
    });

    let app = contactbook::router(state);

    let addr = format!("0.0.0.0:{}", cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("contactbook listening on http://localhost:{}", cli.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to install CTRL+C signal handler: {e}");
                std::future::pending::<()>().await;
            }
            info!("Shutting down contactbook...");
        })
        .await?;

    Ok(())
}
