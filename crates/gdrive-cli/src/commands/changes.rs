//! Changes command: observe the remote change log.

use anyhow::Result;
use clap::Args;

use gdrive_core::config::{DEFAULT_MAX_CHANGES, DEFAULT_PAGE_SIZE};
use gdrive_sync::changes::ChangeJournal;

use crate::commands::connect;
use crate::output::print_changes;

#[derive(Debug, Args)]
pub struct ChangesCommand {
    /// Token to continue listing from
    #[arg(long)]
    pub page_token: Option<String>,

    /// Maximum number of changes to list
    #[arg(long, default_value_t = DEFAULT_MAX_CHANGES)]
    pub max: usize,

    /// Print the current start token and exit
    #[arg(long)]
    pub now: bool,
}

impl ChangesCommand {
    pub async fn execute(self) -> Result<()> {
        let store = connect()?;
        let journal = ChangeJournal::new(&store, DEFAULT_PAGE_SIZE);
        let mut out = std::io::stdout();

        if self.now {
            let token = journal.start_token().await?;
            println!("Page token: {token}");
            return Ok(());
        }

        let token = match self.page_token {
            Some(token) => token,
            None => journal.start_token().await?,
        };

        let (changes, resume) = journal.collect(&token, self.max).await?;
        print_changes(&mut out, &changes, resume.as_deref())?;
        Ok(())
    }
}
