use anyhow::{Context, Result};
use clap::Subcommand;
use gatekeeper_db::models::approval::AdminRecord;
use gatekeeper_db::ApprovalStore;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    /// Print configured administrator ids
    List,
    /// Grant administrator rights to a Telegram user id
    Add {
        #[arg(allow_negative_numbers = true)]
        user_id: i64,
    },
    /// Revoke administrator rights
    Remove {
        #[arg(allow_negative_numbers = true)]
        user_id: i64,
    },
}

pub async fn run_admin_action(store: &dyn ApprovalStore, action: AdminAction) -> Result<()> {
    let mut admins = store
        .load_admins()
        .await
        .context("Failed to load administrators")?;

    match action {
        AdminAction::List => {
            if admins.is_empty() {
                println!("No administrators configured.");
            }
            for admin in &admins {
                println!("{}", admin.user_id);
            }
        }
        AdminAction::Add { user_id } => {
            if admins.iter().any(|a| a.user_id == user_id) {
                println!("User {} is already an administrator.", user_id);
                return Ok(());
            }
            admins.push(AdminRecord::new(user_id));
            store
                .save_admins(&admins)
                .await
                .context("Failed to save administrators")?;
            println!("User {} is now an administrator.", user_id);
        }
        AdminAction::Remove { user_id } => {
            let before = admins.len();
            admins.retain(|a| a.user_id != user_id);
            if admins.len() == before {
                println!("User {} is not an administrator.", user_id);
                return Ok(());
            }
            store
                .save_admins(&admins)
                .await
                .context("Failed to save administrators")?;
            println!("User {} is no longer an administrator.", user_id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_db::MemoryStore;

    fn ids(admins: &[AdminRecord]) -> Vec<i64> {
        admins.iter().map(|a| a.user_id).collect()
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let store = MemoryStore::with_admins([1]);
        run_admin_action(&store, AdminAction::Add { user_id: 2 }).await.unwrap();
        run_admin_action(&store, AdminAction::Add { user_id: 2 }).await.unwrap();
        assert_eq!(ids(&store.load_admins().await.unwrap()), vec![1, 2]);
    }

    #[tokio::test]
    async fn remove_drops_only_the_named_admin() {
        let store = MemoryStore::with_admins([1, 2, 3]);
        run_admin_action(&store, AdminAction::Remove { user_id: 2 }).await.unwrap();
        run_admin_action(&store, AdminAction::Remove { user_id: 9 }).await.unwrap();
        assert_eq!(ids(&store.load_admins().await.unwrap()), vec![1, 3]);
    }
}
