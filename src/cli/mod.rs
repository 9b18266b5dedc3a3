pub mod commands;
pub mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config;
use crate::database::DatabaseManager;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "forum")]
#[command(about = "Forum administration - migrations, roles, users and trophies")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Roles and their permissions")]
    Role {
        #[command(subcommand)]
        cmd: commands::role::RoleCommands,
    },

    #[command(about = "Role assignment and bans")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Manual trophy awards")]
    Trophy {
        #[command(subcommand)]
        cmd: commands::trophy::TrophyCommands,
    },

    #[command(about = "Permission catalogue")]
    Permission {
        #[command(subcommand)]
        cmd: commands::permission::PermissionCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let config = config::config();

    let db = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to the database (is DATABASE_URL set?)")?;

    if let Commands::Migrate = cli.command {
        db.migrate().await.context("migration failed")?;
        return output::success(output_format, "Migrations applied", None);
    }

    // Observers run before each command returns so notifications are stored
    let state = AppState::inline(db, config);

    match cli.command {
        Commands::Migrate => Ok(()),
        Commands::Role { cmd } => commands::role::handle(cmd, &state, output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, &state, output_format).await,
        Commands::Trophy { cmd } => commands::trophy::handle(cmd, &state, output_format).await,
        Commands::Permission { cmd } => commands::permission::handle(cmd, &state, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ban_with_duration() {
        let cli = Cli::try_parse_from(["forum", "user", "ban", "spammer", "--reason", "spam links", "--hours", "48"]).unwrap();
        match cli.command {
            Commands::User {
                cmd: commands::user::UserCommands::Ban { username, reason, hours },
            } => {
                assert_eq!(username, "spammer");
                assert_eq!(reason, "spam links");
                assert_eq!(hours, Some(48));
            }
            _ => panic!("expected user ban"),
        }
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["forum", "role", "list", "--json"]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Json);
    }
}
