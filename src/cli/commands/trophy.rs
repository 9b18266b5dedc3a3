use clap::Subcommand;
use serde_json::json;

use crate::cli::{output, OutputFormat};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum TrophyCommands {
    #[command(about = "Award a trophy to a user")]
    Award {
        #[arg(help = "Trophy slug")]
        trophy: String,
        username: String,
    },
}

pub async fn handle(cmd: TrophyCommands, state: &AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TrophyCommands::Award { trophy, username } => {
            let outcome = state.trophies().award_as(None, &trophy, &username).await?;
            let message = if outcome.newly_awarded {
                format!("Awarded '{}' to {}", outcome.trophy.slug, username)
            } else {
                format!("{} already holds '{}'", username, outcome.trophy.slug)
            };
            output::success(output_format, &message, Some(json!({ "award": outcome })))
        }
    }
}
