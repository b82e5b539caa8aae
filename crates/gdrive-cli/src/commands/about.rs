//! About command: account and quota information.

use anyhow::Result;
use clap::Args;

use gdrive_core::ports::remote_store::RemoteStore;
use gdrive_sync::format::format_size;

use crate::commands::connect;

#[derive(Debug, Args)]
pub struct AboutCommand {
    /// Print sizes in plain bytes
    #[arg(long)]
    pub size_in_bytes: bool,
}

impl AboutCommand {
    pub async fn execute(self) -> Result<()> {
        let store = connect()?;
        let about = store.about().await?;

        if let Some(user) = &about.user {
            println!("User: {user}");
        }
        println!(
            "Used: {}",
            format_size(about.quota.usage, self.size_in_bytes)
        );
        if about.quota.limit == 0 {
            println!("Limit: unlimited");
        } else {
            println!(
                "Limit: {}",
                format_size(about.quota.limit, self.size_in_bytes)
            );
            println!(
                "Free: {}",
                format_size(
                    about.quota.limit.saturating_sub(about.quota.usage),
                    self.size_in_bytes
                )
            );
        }
        println!(
            "Max upload size: {}",
            format_size(about.max_upload_size, self.size_in_bytes)
        );
        Ok(())
    }
}
