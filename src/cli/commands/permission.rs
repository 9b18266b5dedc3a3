use clap::Subcommand;

use crate::cli::{output, OutputFormat};
use crate::permissions::PermissionStore;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum PermissionCommands {
    #[command(about = "List every permission in the catalogue")]
    List,
}

pub async fn handle(cmd: PermissionCommands, state: &AppState, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        PermissionCommands::List => {
            let permissions = PermissionStore::new(state.pool().clone()).list_permissions().await?;
            output::list(output_format, "permissions", &permissions, "No permissions defined", |p| {
                format!("{:<32} {}", format!("{}.{}", p.category, p.action), p.description)
            })
        }
    }
}
