use clap::Subcommand;
use serde_json::json;

use crate::cli::{output, OutputFormat};
use crate::permissions::{PermissionKey, PermissionStore};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum RoleCommands {
    #[command(about = "List roles with their permissions")]
    List,

    #[command(about = "Create a role")]
    Create {
        #[arg(help = "Role name (lowercase)")]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },

    #[command(about = "Grant a permission to a role")]
    Grant {
        role: String,
        #[arg(help = "Permission as category.action")]
        permission: String,
    },

    #[command(about = "Revoke a permission from a role")]
    Revoke {
        role: String,
        #[arg(help = "Permission as category.action")]
        permission: String,
    },
}

pub async fn handle(cmd: RoleCommands, state: &AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    let store = PermissionStore::new(state.pool().clone());

    match cmd {
        RoleCommands::List => {
            let roles = store.list_roles().await?;
            output::list(output_format, "roles", &roles, "No roles defined", |r| {
                format!(
                    "{:<12} {:>4}{}  {}",
                    r.role.name,
                    r.role.priority,
                    if r.role.is_system { " (system)" } else { "" },
                    r.permissions.join(", ")
                )
            })
        }
        RoleCommands::Create {
            name,
            description,
            priority,
        } => {
            let role = store.create_role(&name, &description, priority).await?;
            output::success(
                output_format,
                &format!("Role '{}' created", role.name),
                Some(json!({ "role": role })),
            )
        }
        RoleCommands::Grant { role, permission } => {
            let key: PermissionKey = permission.parse()?;
            store.grant(&role, &key).await?;
            output::success(output_format, &format!("Granted '{}' to role '{}'", key, role), None)
        }
        RoleCommands::Revoke { role, permission } => {
            let key: PermissionKey = permission.parse()?;
            store.revoke(&role, &key).await?;
            output::success(output_format, &format!("Revoked '{}' from role '{}'", key, role), None)
        }
    }
}
