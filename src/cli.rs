use clap::{Parser, Subcommand};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::PostgresStore;
use crate::config::Config;
use crate::ports::Store;
use crate::services::{LedgerService, WithdrawalService};

/// Actor recorded in the audit trail for operator commands.
pub const CLI_ACTOR: &str = "cli";

#[derive(Parser)]
#[command(name = "coursemart-core")]
#[command(
    about = "Coursemart Core - course checkout, ledger and payout settlement",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Withdrawal review commands
    #[command(subcommand)]
    Withdrawal(WithdrawalCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Refund a completed purchase and revoke the enrollment
    Refund {
        /// Transaction UUID
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum WithdrawalCommands {
    /// Approve a pending request and record the payout
    Approve {
        #[arg(value_name = "WITHDRAWAL_ID")]
        id: Uuid,
        /// Reviewing admin
        #[arg(long)]
        admin: Uuid,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Reject a pending request
    Reject {
        #[arg(value_name = "WITHDRAWAL_ID")]
        id: Uuid,
        #[arg(long)]
        admin: Uuid,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

async fn store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    let pool = crate::db::create_pool(config).await?;
    Ok(Arc::new(PostgresStore::new(pool)))
}

pub async fn handle_tx_refund(config: &Config, tx_id: Uuid) -> anyhow::Result<()> {
    let ledger = LedgerService::new(store(config).await?);
    let result = ledger.refund(tx_id, CLI_ACTOR).await?;

    tracing::info!(transaction_id = %tx_id, refund_id = %result.refund.id, "Transaction refunded");
    println!(
        "✓ Transaction {} refunded ({} {}), refund row {}",
        tx_id, result.refund.amount, result.refund.currency, result.refund.id
    );
    if result.enrollment_revoked {
        println!("  Enrollment revoked");
    }

    Ok(())
}

pub async fn handle_withdrawal_approve(
    config: &Config,
    id: Uuid,
    admin: Uuid,
    notes: Option<String>,
) -> anyhow::Result<()> {
    let service = WithdrawalService::new(store(config).await?, config.currency.clone());
    let (request, payout) = service.approve(id, admin, notes).await?;

    println!(
        "✓ Withdrawal {} approved, payout {} recorded ({})",
        request.id, payout.id, payout.amount
    );
    Ok(())
}

pub async fn handle_withdrawal_reject(
    config: &Config,
    id: Uuid,
    admin: Uuid,
    notes: Option<String>,
) -> anyhow::Result<()> {
    let service = WithdrawalService::new(store(config).await?, config.currency.clone());
    let request = service.reject(id, admin, notes).await?;

    println!("✓ Withdrawal {} rejected", request.id);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");
    crate::startup::validate_env_vars(config)?;

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Payment Provider URL: {}", config.payment_provider_url);
    println!("  Payment Provider Key: {}", mask_secret(&config.payment_provider_key));
    println!("  Webhook Secret: {}", mask_secret(&config.payment_webhook_secret));
    println!("  Admin API Key: {}", mask_secret(&config.admin_api_key));
    println!("  Tax Rate: {}%", config.tax_rate_percent);
    println!("  Instructor Share: {}%", config.instructor_share_percent);
    println!("  Currency: {}", config.currency);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "(unset)".to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://app:hunter2@db:5432/coursemart"),
            "postgres://app:****@db:5432/coursemart"
        );
        assert_eq!(mask_password("postgres://db/coursemart"), "postgres://db/coursemart");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(unset)");
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret("sk_live_abcdef"), "sk_l****");
    }

    #[test]
    fn parses_withdrawal_review_commands() {
        let id = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "coursemart-core",
            "withdrawal",
            "approve",
            &id.to_string(),
            "--admin",
            &admin.to_string(),
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Withdrawal(WithdrawalCommands::Approve {
                id: parsed,
                admin: by,
                notes,
            })) => {
                assert_eq!(parsed, id);
                assert_eq!(by, admin);
                assert!(notes.is_none());
            }
            _ => panic!("expected withdrawal approve"),
        }
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["coursemart-core"]).unwrap();
        assert!(cli.command.is_none());
    }
}
