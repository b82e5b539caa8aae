//! Paginated reader for the remote change log.
//!
//! Used by the `changes` command for incremental observation of the remote
//! side. Pages are consumed one token at a time; [`ChangeJournal::collect`]
//! aggregates pages until a requested number of entries is reached, the same
//! way the file listing loop does.

use gdrive_core::domain::SyncError;
use gdrive_core::ports::remote_store::{Change, ChangePage, RemoteStore};

/// Reader over the remote change log.
pub struct ChangeJournal<'a> {
    store: &'a dyn RemoteStore,
    page_size: usize,
}

impl<'a> ChangeJournal<'a> {
    pub fn new(store: &'a dyn RemoteStore, page_size: usize) -> Self {
        Self { store, page_size }
    }

    /// Token addressing the current head of the log; changes recorded after
    /// this point are returned by subsequent [`ChangeJournal::page`] calls.
    pub async fn start_token(&self) -> Result<String, SyncError> {
        self.store
            .changes_start_token()
            .await
            .map_err(SyncError::from)
    }

    /// Reads a single page starting at `token`.
    pub async fn page(&self, token: &str) -> Result<ChangePage, SyncError> {
        self.store
            .list_changes(token, self.page_size)
            .await
            .map_err(SyncError::from)
    }

    /// Aggregates pages starting at `token` until `max` entries have been
    /// collected or the log is exhausted. Returns the entries together with
    /// the token to resume from, when one is available.
    pub async fn collect(
        &self,
        token: &str,
        max: usize,
    ) -> Result<(Vec<Change>, Option<String>), SyncError> {
        let mut changes = Vec::new();
        let mut token = token.to_string();

        loop {
            let page = self.page(&token).await?;
            changes.extend(page.changes);

            if changes.len() >= max {
                changes.truncate(max);
                return Ok((changes, page.next_page_token.or(page.new_start_page_token)));
            }

            match page.next_page_token {
                Some(next) => token = next,
                None => return Ok((changes, page.new_start_page_token)),
            }
        }
    }
}
