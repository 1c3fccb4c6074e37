use clap::{Parser, Subcommand};

use crate::config::{DEFAULT_BIND, DEFAULT_MAX_CONNECTIONS};

const LONG_ABOUT: &str = r#"
Firmdesk - shared task pool and team board for accounting firms

Staff claim work from a firm-wide pool, track it on a kanban board, and
decide which colleagues may see their tasks, activity, calendar and
performance numbers.

Commands:
  firmdesk migrate       ← Create or upgrade the database schema
  firmdesk serve         ← Run the HTTP API
  firmdesk org create    ← Register a firm
  firmdesk user create   ← Add a staff member to a firm
  firmdesk audit recent  ← Review what administrators and staff changed

The database location is taken from DATABASE_URL (or --database-url).
There is no default; the command fails when it is missing.
"#;

#[derive(Parser, Clone)]
#[command(name = "firmdesk")]
#[command(about = "Shared task pool, kanban board and privacy controls for accounting firms")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    pub database_url: Option<String>,

    /// Maximum pooled database connections
    #[arg(
        long,
        env = "FIRMDESK_MAX_CONNECTIONS",
        default_value_t = DEFAULT_MAX_CONNECTIONS,
        global = true
    )]
    pub max_connections: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Address to listen on
        #[arg(long, env = "FIRMDESK_BIND", default_value = DEFAULT_BIND)]
        bind: String,

        /// Write logs to daily files instead of stdout
        #[arg(long)]
        log_to_file: bool,
    },

    /// Apply the database schema (idempotent)
    Migrate,

    /// Organization management
    #[command(subcommand)]
    Org(OrgCommands),

    /// User management
    #[command(subcommand)]
    User(UserCommands),

    /// Audit log queries
    #[command(subcommand)]
    Audit(AuditCommands),
}

#[derive(Subcommand, Clone)]
pub enum OrgCommands {
    /// Create an organization
    Create {
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum UserCommands {
    /// Create a user in an organization
    Create {
        /// Organization ID
        #[arg(long)]
        org: i64,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// owner, admin or staff
        #[arg(long, default_value = "staff")]
        role: String,
    },

    /// List active users of an organization
    List {
        #[arg(long)]
        org: i64,
    },
}

#[derive(Subcommand, Clone)]
pub enum AuditCommands {
    /// Most recent audit entries, newest first
    Recent {
        #[arg(long)]
        org: i64,

        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Every entry recorded for one session, oldest first
    Session {
        #[arg(long)]
        org: i64,

        #[arg(long)]
        session: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_user_create_defaults_to_staff() {
        let cli = Cli::try_parse_from([
            "firmdesk",
            "--database-url",
            "sqlite://firm.db",
            "user",
            "create",
            "--org",
            "1",
            "--name",
            "Ada",
            "--email",
            "ada@firm.test",
        ])
        .unwrap();

        match cli.command {
            Commands::User(UserCommands::Create { role, org, .. }) => {
                assert_eq!(role, "staff");
                assert_eq!(org, 1);
            },
            _ => panic!("expected user create"),
        }
        assert_eq!(cli.database_url.as_deref(), Some("sqlite://firm.db"));
    }
}
