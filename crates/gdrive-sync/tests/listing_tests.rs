//! Integration tests for sync-root listing and the change journal.

mod common;

use std::path::PathBuf;

use gdrive_core::domain::FileId;
use gdrive_sync::changes::ChangeJournal;
use gdrive_sync::list::{sync_content, sync_roots};

use common::{FakeRemote, ROOT_ID};

#[tokio::test]
async fn test_sync_roots_finds_marked_dirs_only() {
    let remote = FakeRemote::with_marked_root();
    remote.put_dir("plain", "NotARoot", None, Default::default());

    let roots = sync_roots(&remote).await.unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].id, FileId::from(ROOT_ID));
}

#[tokio::test]
async fn test_sync_content_lists_sorted_rel_paths() {
    let remote = FakeRemote::with_marked_root();
    remote.put_synced_dir("db", "b", ROOT_ID);
    remote.put_synced_file("fz", "zz.txt", ROOT_ID, b"z");
    remote.put_synced_file("fc", "c.txt", "db", b"c");

    let (root, files) = sync_content(&remote, &FileId::from(ROOT_ID)).await.unwrap();
    assert_eq!(root.id, FileId::from(ROOT_ID));

    let paths: Vec<PathBuf> = files.iter().map(|f| f.rel_path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("b"),
            PathBuf::from("b/c.txt"),
            PathBuf::from("zz.txt"),
        ]
    );
}

#[tokio::test]
async fn test_change_journal_pages_through_the_log() {
    let remote = FakeRemote::with_marked_root();
    let journal = ChangeJournal::new(&remote, 2);

    let start = journal.start_token().await.unwrap();

    // Three mutations after the start token.
    remote.put_synced_file("f1", "one.txt", ROOT_ID, b"1");
    use gdrive_core::ports::remote_store::{NewFile, RemoteStore};
    for name in ["two.txt", "three.txt", "four.txt"] {
        remote
            .create_file(
                NewFile {
                    name: name.to_string(),
                    mime_type: None,
                    parents: vec![FileId::from(ROOT_ID)],
                    app_properties: Default::default(),
                },
                None,
            )
            .await
            .unwrap();
    }

    // put_synced_file bypasses the port and records no change; only the
    // three create_file calls are in the log.
    let (changes, resume) = journal.collect(&start, 10).await.unwrap();
    assert_eq!(changes.len(), 3);
    assert!(resume.is_some());

    // A capped read stops early and returns a resume token.
    let (capped, resume) = journal.collect(&start, 2).await.unwrap();
    assert_eq!(capped.len(), 2);
    assert!(resume.is_some());
}
