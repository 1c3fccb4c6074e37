use clap::Parser;
use firmdesk::api::ApiServer;
use firmdesk::audit::AuditLog;
use firmdesk::cli::{AuditCommands, Cli, Commands, OrgCommands, UserCommands};
use firmdesk::config::{redact_database_url, require_database_url, ServerConfig};
use firmdesk::db::models::Role;
use firmdesk::db::{create_pool, run_migrations};
use firmdesk::directory::Directory;
use firmdesk::error::{ErrorResponse, FirmError, Result};
use firmdesk::logging::{cleanup_old_logs, default_log_dir, ApplicationMode, LoggingConfig};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;

const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mode = match cli.command {
        Commands::Serve { .. } => ApplicationMode::Server,
        _ => ApplicationMode::Cli,
    };
    let mut log_config =
        LoggingConfig::from_args(mode, cli.quiet, cli.verbose, cli.json).with_env_overrides();
    if let Commands::Serve {
        log_to_file: true, ..
    } = cli.command
    {
        if log_config.log_dir.is_none() {
            log_config.log_dir = default_log_dir();
        }
    }
    let log_dir = log_config.log_dir.clone();

    if let Err(e) = firmdesk::logging::init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Some(dir) = log_dir {
        let retention_days = std::env::var("FIRMDESK_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_LOG_RETENTION_DAYS);
        cleanup_old_logs(&dir, retention_days).ok();
    }

    if let Err(e) = run(&cli).await {
        let response = match e.downcast_ref::<FirmError>() {
            Some(err) => err.to_error_response(),
            None => ErrorResponse {
                error: format!("{:#}", e),
                code: "SERVER_ERROR".to_string(),
            },
        };
        match serde_json::to_string_pretty(&response) {
            Ok(body) => eprintln!("{}", body),
            Err(_) => eprintln!("{}", response.error),
        }
        std::process::exit(1);
    }
}

async fn serve(cli: &Cli, bind: &str) -> anyhow::Result<()> {
    let config = ServerConfig::new(cli.database_url.clone(), bind, cli.max_connections)?;
    ApiServer::new(config).run().await
}

async fn connect(cli: &Cli) -> Result<SqlitePool> {
    let url = require_database_url(cli.database_url.clone())?;
    tracing::debug!(database = %redact_database_url(&url), "Connecting");
    let pool = create_pool(&url, cli.max_connections).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    match cli.command.clone() {
        Commands::Serve { bind, .. } => serve(cli, &bind).await?,

        Commands::Migrate => {
            let url = require_database_url(cli.database_url.clone())?;
            connect(cli).await?;
            tracing::info!(database = %redact_database_url(&url), "Migrations applied");
            print_json(&json!({
                "migrated": true,
                "schema_version": firmdesk::db::SCHEMA_VERSION,
            }))?;
        },

        Commands::Org(OrgCommands::Create { name }) => {
            let pool = connect(cli).await?;
            let org = Directory::new(&pool).create_org(&name).await?;
            print_json(&org)?;
        },

        Commands::User(UserCommands::Create {
            org,
            name,
            email,
            role,
        }) => {
            let role = Role::parse(&role)?;
            let pool = connect(cli).await?;
            let user = Directory::new(&pool)
                .create_user(org, &name, &email, role)
                .await?;
            print_json(&user)?;
        },

        Commands::User(UserCommands::List { org }) => {
            let pool = connect(cli).await?;
            let directory = Directory::new(&pool);
            directory.get_org(org).await?;
            print_json(&directory.team(org).await?)?;
        },

        Commands::Audit(AuditCommands::Recent { org, limit }) => {
            let pool = connect(cli).await?;
            let entries = AuditLog::new(&pool).get_recent_logs(org, limit).await?;
            print_json(&entries)?;
        },

        Commands::Audit(AuditCommands::Session { org, session }) => {
            let pool = connect(cli).await?;
            let entries = AuditLog::new(&pool).get_session_logs(org, &session).await?;
            print_json(&entries)?;
        },
    }

    Ok(())
}
