use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursemart_core::cli::{self, Cli, Commands, DbCommands, TxCommands, WithdrawalCommands};
use coursemart_core::config::{Config, LogFormat};
use coursemart_core::payments::HttpPaymentProvider;
use coursemart_core::{create_app, db, startup, AppState};

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
        Commands::Tx(TxCommands::Refund { tx_id }) => cli::handle_tx_refund(&config, tx_id).await,
        Commands::Withdrawal(WithdrawalCommands::Approve { id, admin, notes }) => {
            cli::handle_withdrawal_approve(&config, id, admin, notes).await
        }
        Commands::Withdrawal(WithdrawalCommands::Reject { id, admin, notes }) => {
            cli::handle_withdrawal_reject(&config, id, admin, notes).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let report = startup::validate_environment(&config, &pool).await?;
    if !report.is_valid() {
        report.print();
        anyhow::bail!("startup validation failed");
    }

    let provider = Arc::new(HttpPaymentProvider::new(
        config.payment_provider_url.clone(),
        config.payment_provider_key.clone(),
    ));
    tracing::info!(url = %config.payment_provider_url, "payment provider client initialized");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let app = create_app(AppState::new(pool, config, provider));

    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
