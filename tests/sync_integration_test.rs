//! End-to-end tests for the workspace synchronizer
//!
//! These scenarios drive the public facade against real control
//! directories in a temporary workspace and assert both the on-disk
//! layout and the broadcast behavior.

mod common;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use common::{file, folder, read_control_file, workspace_with, Recorder};
use cvsync_core::{
    ControlStore, DiskStore, ModificationState, NullProgress, ResourcePath, SyncError,
    Synchronizer, Workspace,
};
use cvsync_entries::{entry_line, CvsTag, FolderSync, ResourceSync};
use cvsync_store::FolderLocation;

#[test]
fn folder_and_resource_sync_reach_disk() {
    let (dir, sync) = workspace_with(&[("a", &["f.txt"])]);
    let a = folder("/a");

    sync.set_folder_sync(
        &a,
        FolderSync::new(
            ":pserver:anon@host:/cvsroot",
            "repo/a",
            Some(CvsTag::branch("b1").unwrap()),
            false,
        ),
    )
    .unwrap();
    sync.set_sync_bytes(&file("/a/f.txt"), Bytes::from_static(b"/f.txt/1.1//-kb/"))
        .unwrap();

    let project_dir = dir.path().join("a");
    assert_eq!(
        read_control_file(&project_dir, "Root"),
        ":pserver:anon@host:/cvsroot\n"
    );
    assert_eq!(read_control_file(&project_dir, "Repository"), "repo/a\n");
    assert_eq!(read_control_file(&project_dir, "Tag"), "Tb1\n");
    assert_eq!(read_control_file(&project_dir, "Entries"), "/f.txt/1.1//-kb/\n");
}

#[test]
fn entries_file_parses_back_to_the_same_records() {
    let (dir, sync) = workspace_with(&[("a", &["f1.txt", "f2.txt", "sub/inner.txt"])]);
    let a = folder("/a");
    sync.set_folder_sync(&a, FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();

    let mut expected: Vec<Bytes> = vec![
        Bytes::from_static(b"/f1.txt/1.1/Thu Apr 12 12:45:00 2001//"),
        Bytes::from_static(b"/f2.txt/1.4//-ko/Tv2"),
        entry_line::folder_line("sub"),
    ];
    sync.set_sync_bytes(&file("/a/f1.txt"), expected[0].clone()).unwrap();
    sync.set_sync_bytes(&file("/a/f2.txt"), expected[1].clone()).unwrap();
    sync.set_sync_bytes(&folder("/a/sub"), expected[2].clone()).unwrap();

    let mut on_disk: Vec<Bytes> = read_control_file(&dir.path().join("a"), "Entries")
        .lines()
        .map(|line| Bytes::from(line.to_string()))
        .collect();
    on_disk.sort();
    expected.sort();
    assert_eq!(on_disk, expected);

    // Every line survives a decode.
    for bytes in &on_disk {
        ResourceSync::from_bytes(bytes).unwrap();
    }

    // A fresh synchronizer over the same workspace reads the records
    // back from disk.
    let reread = Synchronizer::new(sync.workspace().clone());
    assert_eq!(
        reread.get_sync_bytes(&file("/a/f2.txt")).unwrap(),
        Some(Bytes::from_static(b"/f2.txt/1.4//-ko/Tv2"))
    );
    assert_eq!(
        reread.get_folder_sync(&a).unwrap(),
        Some(FolderSync::new(":local:/r", "repo/a", None, false))
    );
}

#[test]
fn add_ignored_broadcasts_unmanaged_descendants() {
    let (dir, sync) = workspace_with(&[("a", &["f.txt", "junk.txt"])]);
    let a = folder("/a");
    sync.set_folder_sync(&a, FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();
    sync.set_sync_bytes(&file("/a/f.txt"), Bytes::from_static(b"/f.txt/1.1///"))
        .unwrap();

    let recorder = Recorder::new();
    sync.add_listener(recorder.clone());
    sync.add_ignored(&a, "*.log").unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("a").join(".cvsignore")).unwrap(),
        "*.log\n"
    );
    let events = recorder.events();
    assert_eq!(events.len(), 1);
    // Only resources whose ignored status could change are broadcast:
    // the unmanaged children, never the managed ones.
    assert!(events[0].contains(&"/a/junk.txt".to_string()));
    assert!(events[0].contains(&"/a/.cvsignore".to_string()));
    assert!(!events[0].iter().any(|p| p == "/a/f.txt"));

    assert!(!sync.is_ignored(&file("/a/junk.txt")).unwrap());
    fs::write(dir.path().join("a").join("build.log"), b"").unwrap();
    assert!(sync.is_ignored(&file("/a/build.log")).unwrap());
}

#[test]
fn deletion_form_survives_in_phantom_space() {
    let (dir, sync) = workspace_with(&[("a", &["f.txt"])]);
    let a = folder("/a");
    let f = file("/a/f.txt");
    sync.set_folder_sync(&a, FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();
    sync.set_sync_bytes(&f, Bytes::from_static(b"/f.txt/1.1/Thu Apr 12 12:45:00 2001//"))
        .unwrap();

    sync.prepare_for_deletion(&f).unwrap();
    fs::remove_file(dir.path().join("a").join("f.txt")).unwrap();

    let bytes = sync.get_sync_bytes(&f).unwrap().expect("phantom sync");
    assert!(entry_line::is_deletion(&bytes).unwrap());
    assert_eq!(entry_line::revision_of(&bytes).unwrap(), "1.1");

    let members = sync.members(&a).unwrap();
    assert!(members.iter().any(|m| m.name() == "f.txt"));
}

#[test]
fn folder_sync_survives_folder_deletion() {
    let (dir, sync) = workspace_with(&[("a", &["sub/inner.txt"])]);
    let sub = folder("/a/sub");
    sync.set_folder_sync(&folder("/a"), FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();
    let info = FolderSync::new(":local:/r", "repo/a/sub", None, false);
    sync.set_folder_sync(&sub, info.clone()).unwrap();
    sync.set_sync_bytes(&sub, entry_line::folder_line("sub")).unwrap();

    sync.prepare_for_deletion(&sub).unwrap();
    fs::remove_dir_all(dir.path().join("a").join("sub")).unwrap();

    assert_eq!(sync.get_folder_sync(&sub).unwrap(), Some(info));
    let members = sync.members(&folder("/a")).unwrap();
    assert!(members.iter().any(|m| m.name() == "sub" && m.is_container()));
}

#[test]
fn additions_are_forgotten_on_deletion() {
    let (dir, sync) = workspace_with(&[("a", &["new.txt"])]);
    sync.set_folder_sync(&folder("/a"), FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();
    let f = file("/a/new.txt");
    sync.set_resource_sync(&f, &ResourceSync::addition("new.txt")).unwrap();

    sync.prepare_for_deletion(&f).unwrap();
    fs::remove_file(dir.path().join("a").join("new.txt")).unwrap();

    // A never-committed addition has nothing to report to the
    // repository, so no phantom survives.
    assert_eq!(sync.get_sync_bytes(&f).unwrap(), None);
}

#[test]
fn dirty_state_is_conservative_along_the_ancestor_chain() {
    let (_dir, sync) = workspace_with(&[("a", &["sub/f.txt"])]);
    let f = file("/a/sub/f.txt");

    sync.set_dirty_indicator(&f, true);
    for ancestor in [folder("/a/sub"), folder("/a")] {
        assert_ne!(
            sync.get_modification_state(&ancestor),
            ModificationState::Clean,
            "ancestor {ancestor} must never read clean while a descendant is dirty"
        );
    }

    sync.set_dirty_indicator(&f, false);
    assert_eq!(sync.get_modification_state(&f), ModificationState::Clean);
    assert_eq!(
        sync.get_modification_state(&folder("/a/sub")),
        ModificationState::Unknown
    );
}

/// Wraps the disk store and fails entry-list writes on demand.
struct FailingStore {
    inner: DiskStore,
    fail_entries: AtomicBool,
}

impl FailingStore {
    fn new() -> Self {
        FailingStore {
            inner: DiskStore,
            fail_entries: AtomicBool::new(false),
        }
    }
}

impl ControlStore for FailingStore {
    fn read_all_resource_sync(
        &self,
        loc: &FolderLocation,
    ) -> cvsync_store::Result<Option<Vec<Bytes>>> {
        self.inner.read_all_resource_sync(loc)
    }

    fn write_all_resource_sync(
        &self,
        loc: &FolderLocation,
        infos: &[Bytes],
    ) -> cvsync_store::Result<()> {
        if self.fail_entries.load(Ordering::SeqCst) {
            return Err(cvsync_store::StoreError::Io {
                path: loc.path().join("CVS").join("Entries"),
                source: std::io::Error::other("simulated write failure"),
            });
        }
        self.inner.write_all_resource_sync(loc, infos)
    }

    fn read_folder_sync(
        &self,
        loc: &FolderLocation,
    ) -> cvsync_store::Result<Option<FolderSync>> {
        self.inner.read_folder_sync(loc)
    }

    fn write_folder_sync(&self, loc: &FolderLocation, info: &FolderSync) -> cvsync_store::Result<()> {
        self.inner.write_folder_sync(loc, info)
    }

    fn delete_folder_sync(&self, loc: &FolderLocation) -> cvsync_store::Result<()> {
        self.inner.delete_folder_sync(loc)
    }

    fn read_cvs_ignore(&self, loc: &FolderLocation) -> cvsync_store::Result<Option<Vec<String>>> {
        self.inner.read_cvs_ignore(loc)
    }

    fn write_cvs_ignore(&self, loc: &FolderLocation, patterns: &[String]) -> cvsync_store::Result<()> {
        self.inner.write_cvs_ignore(loc, patterns)
    }

    fn read_all_notify(
        &self,
        loc: &FolderLocation,
    ) -> cvsync_store::Result<Option<Vec<cvsync_entries::NotifyInfo>>> {
        self.inner.read_all_notify(loc)
    }

    fn write_all_notify(
        &self,
        loc: &FolderLocation,
        infos: &[cvsync_entries::NotifyInfo],
    ) -> cvsync_store::Result<()> {
        self.inner.write_all_notify(loc, infos)
    }

    fn read_all_baserev(
        &self,
        loc: &FolderLocation,
    ) -> cvsync_store::Result<Option<Vec<cvsync_entries::BaserevInfo>>> {
        self.inner.read_all_baserev(loc)
    }

    fn write_all_baserev(
        &self,
        loc: &FolderLocation,
        infos: &[cvsync_entries::BaserevInfo],
    ) -> cvsync_store::Result<()> {
        self.inner.write_all_baserev(loc, infos)
    }

    fn is_edited(&self, loc: &FolderLocation, name: &str) -> cvsync_store::Result<bool> {
        self.inner.is_edited(loc, name)
    }

    fn copy_to_base(&self, loc: &FolderLocation, name: &str) -> cvsync_store::Result<()> {
        self.inner.copy_to_base(loc, name)
    }

    fn restore_from_base(&self, loc: &FolderLocation, name: &str) -> cvsync_store::Result<()> {
        self.inner.restore_from_base(loc, name)
    }

    fn delete_base(&self, loc: &FolderLocation, name: &str) -> cvsync_store::Result<()> {
        self.inner.delete_base(loc, name)
    }
}

#[test]
fn failed_entries_write_purges_the_cache_and_reports_a_multi_error() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::write(dir.path().join("a").join("f.txt"), b"content").unwrap();
    let workspace = Arc::new(Workspace::new(dir.path()).unwrap());
    let store = Arc::new(FailingStore::new());
    let sync = Synchronizer::with_store(workspace, store.clone());

    let a = folder("/a");
    let f = file("/a/f.txt");
    sync.set_folder_sync(&a, FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();
    sync.set_sync_bytes(&f, Bytes::from_static(b"/f.txt/1.1///")).unwrap();

    store.fail_entries.store(true, Ordering::SeqCst);
    let err = sync
        .set_sync_bytes(&f, Bytes::from_static(b"/f.txt/1.2///"))
        .unwrap_err();
    match err {
        SyncError::CommittingSyncInfoFailed { errors } => assert_eq!(errors.len(), 1),
        other => panic!("expected a multi-error, got {other:?}"),
    }

    // The session cache was purged, so the next read consults disk and
    // sees the last successfully written revision.
    store.fail_entries.store(false, Ordering::SeqCst);
    let bytes = sync.get_sync_bytes(&f).unwrap().expect("re-read from disk");
    assert_eq!(entry_line::revision_of(&bytes).unwrap(), "1.1");
}

#[test]
fn concurrent_disjoint_batches_broadcast_independently() {
    let (_dir, sync) = workspace_with(&[("a", &["f1.txt", "f2.txt"]), ("b", &["g1.txt", "g2.txt"])]);
    let recorder = Recorder::new();
    sync.add_listener(recorder.clone());

    let spawn_writer = |project: &'static str, files: [&'static str; 2]| {
        let sync = Arc::clone(&sync);
        std::thread::spawn(move || {
            let root = folder(&format!("/{project}"));
            sync.run_batched(&root, &mut NullProgress, |sync| {
                sync.set_folder_sync(
                    &root,
                    FolderSync::new(":local:/r", format!("repo/{project}"), None, false),
                )?;
                for name in files {
                    sync.set_sync_bytes(
                        &file(&format!("/{project}/{name}")),
                        Bytes::from(format!("/{name}/1.1///")),
                    )?;
                }
                Ok(())
            })
            .unwrap();
        })
    };

    let t1 = spawn_writer("a", ["f1.txt", "f2.txt"]);
    let t2 = spawn_writer("b", ["g1.txt", "g2.txt"]);
    t1.join().unwrap();
    t2.join().unwrap();

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    for event in &events {
        let in_a = event.iter().all(|p| p.starts_with("/a"));
        let in_b = event.iter().all(|p| p.starts_with("/b"));
        assert!(
            in_a ^ in_b,
            "each broadcast must carry exactly one thread's changes: {event:?}"
        );
    }
    assert!(recorder.all_paths().iter().any(|p| p.starts_with("/a")));
    assert!(recorder.all_paths().iter().any(|p| p.starts_with("/b")));
}

#[test]
fn nested_batches_defer_disk_writes_and_broadcasts() {
    let (dir, sync) = workspace_with(&[("a", &["f.txt"])]);
    let recorder = Recorder::new();
    sync.add_listener(recorder.clone());

    let a = folder("/a");
    sync.begin_batching(&a).unwrap();
    sync.set_folder_sync(&a, FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();
    sync.set_sync_bytes(&file("/a/f.txt"), Bytes::from_static(b"/f.txt/1.1///"))
        .unwrap();

    // Inner batches have closed, the outer one is still open: nothing
    // on disk, nothing broadcast.
    assert!(!dir.path().join("a").join("CVS").exists());
    assert!(recorder.events().is_empty());

    sync.end_batching(&mut NullProgress).unwrap();
    assert!(dir.path().join("a").join("CVS").join("Entries").exists());
    assert_eq!(recorder.events().len(), 1);
}

#[test]
fn linked_folders_get_zero_control_writes() {
    common::init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let external = tempfile::TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::write(external.path().join("f.txt"), b"content").unwrap();

    let mut workspace = Workspace::new(dir.path()).unwrap();
    workspace.add_link_mount(ResourcePath::parse("/a/linked"), external.path());
    let sync = Synchronizer::new(Arc::new(workspace));

    let linked = folder("/a/linked");
    sync.set_folder_sync(&linked, FolderSync::new(":local:/r", "repo/linked", None, false))
        .unwrap();
    sync.set_sync_bytes(
        &file("/a/linked/f.txt"),
        Bytes::from_static(b"/f.txt/1.1///"),
    )
    .unwrap();

    // In-memory state is visible to callers...
    assert!(sync.get_folder_sync(&linked).unwrap().is_some());
    // ...but no control files were written at the linked location.
    assert!(!external.path().join("CVS").exists());

    // And a fresh synchronizer reads nothing for the linked folder.
    let reread = Synchronizer::new(sync.workspace().clone());
    assert_eq!(reread.get_folder_sync(&linked).unwrap(), None);
    assert_eq!(
        reread.get_sync_bytes(&file("/a/linked/f.txt")).unwrap(),
        None
    );
}

#[test]
fn delete_folder_sync_clears_children_without_recursing() {
    let (dir, sync) = workspace_with(&[("a", &["f.txt", "sub/inner.txt"])]);
    let a = folder("/a");
    sync.set_folder_sync(&a, FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();
    sync.set_folder_sync(&folder("/a/sub"), FolderSync::new(":local:/r", "repo/a/sub", None, false))
        .unwrap();
    sync.set_sync_bytes(&file("/a/f.txt"), Bytes::from_static(b"/f.txt/1.1///"))
        .unwrap();
    sync.set_sync_bytes(&file("/a/sub/inner.txt"), Bytes::from_static(b"/inner.txt/1.1///"))
        .unwrap();

    sync.delete_folder_sync(&a).unwrap();

    assert_eq!(sync.get_folder_sync(&a).unwrap(), None);
    assert_eq!(sync.get_sync_bytes(&file("/a/f.txt")).unwrap(), None);
    assert!(!dir.path().join("a").join("CVS").exists());
    // Children of the folder are cleared, grandchildren stay managed.
    assert!(sync.get_sync_bytes(&file("/a/sub/inner.txt")).unwrap().is_some());
    assert!(sync.get_folder_sync(&folder("/a/sub")).unwrap().is_some());
}

#[test]
fn external_control_file_edits_invalidate_the_cache() {
    let (dir, sync) = workspace_with(&[("a", &["f.txt"])]);
    let a = folder("/a");
    sync.set_folder_sync(&a, FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();
    sync.set_sync_bytes(&file("/a/f.txt"), Bytes::from_static(b"/f.txt/1.1///"))
        .unwrap();
    assert_eq!(
        entry_line::revision_of(&sync.get_sync_bytes(&file("/a/f.txt")).unwrap().unwrap()).unwrap(),
        "1.1"
    );

    // Another client rewrites the entries file behind our back.
    fs::write(
        dir.path().join("a").join("CVS").join("Entries"),
        "/f.txt/1.9///\n",
    )
    .unwrap();
    let recorder = Recorder::new();
    sync.add_listener(recorder.clone());
    sync.sync_files_changed(&[a]).unwrap();

    assert_eq!(recorder.events().len(), 1);
    assert!(recorder.events()[0].contains(&"/a".to_string()));
    assert!(recorder.events()[0].contains(&"/a/f.txt".to_string()));
    assert_eq!(
        entry_line::revision_of(&sync.get_sync_bytes(&file("/a/f.txt")).unwrap().unwrap()).unwrap(),
        "1.9"
    );
}

#[test]
fn prepare_for_move_delete_preserves_the_whole_subtree() {
    let (dir, sync) = workspace_with(&[("a", &["sub/f.txt"])]);
    let sub = folder("/a/sub");
    let f = file("/a/sub/f.txt");
    sync.set_folder_sync(&folder("/a"), FolderSync::new(":local:/r", "repo/a", None, false))
        .unwrap();
    sync.set_folder_sync(&sub, FolderSync::new(":local:/r", "repo/a/sub", None, false))
        .unwrap();
    sync.set_sync_bytes(&sub, entry_line::folder_line("sub")).unwrap();
    sync.set_sync_bytes(&f, Bytes::from_static(b"/f.txt/1.3///")).unwrap();

    sync.prepare_for_move_delete(&sub, &mut NullProgress).unwrap();
    fs::remove_dir_all(dir.path().join("a").join("sub")).unwrap();

    assert!(sync.get_folder_sync(&sub).unwrap().is_some());
    let bytes = sync.get_sync_bytes(&f).unwrap().expect("phantom file sync");
    assert!(entry_line::is_deletion(&bytes).unwrap());
}
