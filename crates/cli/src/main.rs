//! East West Offroad CLI - database migrations and cart cache maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run cart cache and session store migrations
//! ewo-cli migrate
//!
//! # Delete carts untouched for 30 days
//! ewo-cli cart purge --older-than-days 30
//!
//! # Count cached carts
//! ewo-cli cart count
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `cart purge` - Delete stale cart cache rows
//! - `cart count` - Report the number of cached carts

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ewo-cli")]
#[command(author, version, about = "East West Offroad storefront CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations (cart cache and sessions)
    Migrate,
    /// Maintain the cart cache
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Delete carts not updated within the given number of days
    Purge {
        /// Age threshold in days
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
        older_than_days: u32,
    },
    /// Print the number of cached carts
    Count,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Cart { action } => match action {
            CartAction::Purge { older_than_days } => {
                commands::cart::purge(older_than_days).await?;
            }
            CartAction::Count => commands::cart::count().await?,
        },
    }
    Ok(())
}
