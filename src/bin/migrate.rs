//! Schema management for the order desk database.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing::info;

use order_desk::{
    auth::{role, Role},
    config,
    db::{self, DbConfig},
    migrator::Migrator,
    services::users::{CreateUserRequest, UserService},
};

#[derive(Parser)]
#[command(name = "order-desk-migrate", about = "Run order desk schema migrations", version)]
struct Cli {
    /// Overrides the configured database URL
    #[arg(long, env = "APP__DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations
    Up,
    /// Roll back the most recent migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// Show which migrations are applied
    Status,
    /// Drop every table and re-apply all migrations
    Fresh,
    /// Create the first Admin account; self-registration can never grant Admin
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long, env = "ORDER_DESK_ADMIN_PASSWORD")]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing("info", false);
    let cli = Cli::parse();

    let url = cli
        .database_url
        .unwrap_or_else(|| config::DEFAULT_DATABASE_URL.to_string());
    let pool = db::establish_connection_with_config(&DbConfig {
        url,
        max_connections: 2,
        ..DbConfig::default()
    })
    .await?;

    match cli.command {
        Command::Up => Migrator::up(&pool, None).await?,
        Command::Down { steps } => Migrator::down(&pool, Some(steps)).await?,
        Command::Status => Migrator::status(&pool).await?,
        Command::Fresh => Migrator::fresh(&pool).await?,
        Command::CreateAdmin {
            username,
            password,
            full_name,
        } => {
            Migrator::up(&pool, None).await?;
            let admin_role = role::Entity::find()
                .filter(role::Column::Name.eq(Role::Admin.to_string()))
                .one(&pool)
                .await?
                .ok_or_else(|| anyhow!("Admin role is missing; run `up` first"))?;

            let users = UserService::new(Arc::new(pool.clone()));
            let user_id = users
                .create_user(CreateUserRequest {
                    username,
                    password,
                    full_name,
                    phone_number: None,
                    role_id: Some(admin_role.id),
                })
                .await
                .context("failed to create admin account")?;
            info!(user_id, "admin account created");
        }
    }

    db::close_pool(pool).await?;
    Ok(())
}
