use clap::Subcommand;
use serde_json::json;

use crate::cli::{output, OutputFormat};
use crate::permissions::PermissionStore;
use crate::services::moderation_service::BanRequest;
use crate::services::user_by_username;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Give a user a role (secondary unless --primary)")]
    Promote {
        username: String,
        #[arg(long, default_value = "moderator")]
        role: String,
        #[arg(long, help = "Replace the primary role instead of adding a secondary one")]
        primary: bool,
    },

    #[command(about = "Ban a user")]
    Ban {
        username: String,
        #[arg(long)]
        reason: String,
        #[arg(long, help = "Ban length in hours; permanent when omitted")]
        hours: Option<i64>,
    },

    #[command(about = "Lift a user's ban")]
    Unban { username: String },
}

pub async fn handle(cmd: UserCommands, state: &AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Promote {
            username,
            role,
            primary,
        } => {
            let access = if primary {
                state.admin().apply_primary_role(&username, &role).await?
            } else {
                let user = user_by_username(state.pool(), &username).await?;
                let store = PermissionStore::new(state.pool().clone());
                store.add_secondary_role(user.id, &role).await?;
                store.load_effective(&user).await?
            };
            output::success(
                output_format,
                &format!("{} now has role '{}'", username, role),
                Some(json!({ "access": access })),
            )
        }
        UserCommands::Ban { username, reason, hours } => {
            let user = user_by_username(state.pool(), &username).await?;
            let request = BanRequest {
                reason,
                duration_hours: hours,
            };
            let outcome = state.moderation().apply_ban(None, &user, &request).await?;
            let until = outcome
                .banned_until
                .map(|t| format!("until {}", t.format("%Y-%m-%d %H:%M UTC")))
                .unwrap_or_else(|| "permanently".to_string());
            output::success(
                output_format,
                &format!("{} banned {}", username, until),
                Some(json!({ "ban": outcome })),
            )
        }
        UserCommands::Unban { username } => {
            let user = user_by_username(state.pool(), &username).await?;
            state.moderation().apply_unban(None, &user).await?;
            output::success(output_format, &format!("{} unbanned", username), None)
        }
    }
}
