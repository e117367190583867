//! Shared harness for the synchronizer integration tests

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use cvsync_core::{Resource, ResourcePath, SyncChangeListener, Synchronizer, Workspace};
use tempfile::TempDir;

/// Initialise test logging once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A workspace directory seeded with the given project layout, plus a
/// synchronizer over it.
pub fn workspace_with(projects: &[(&str, &[&str])]) -> (TempDir, Arc<Synchronizer>) {
    init_tracing();
    let dir = TempDir::new().expect("temp workspace");
    for (project, files) in projects {
        let project_dir = dir.path().join(project);
        fs::create_dir_all(&project_dir).expect("project dir");
        for file in *files {
            let path = project_dir.join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("parent dirs");
            }
            fs::write(&path, b"content").expect("seed file");
        }
    }
    let workspace = Arc::new(Workspace::new(dir.path()).expect("workspace"));
    (dir, Arc::new(Synchronizer::new(workspace)))
}

pub fn folder(path: &str) -> Resource {
    Resource::folder(ResourcePath::parse(path))
}

pub fn file(path: &str) -> Resource {
    Resource::file(ResourcePath::parse(path))
}

pub fn read_control_file(project_dir: &Path, name: &str) -> String {
    fs::read_to_string(project_dir.join("CVS").join(name)).expect("control file")
}

/// Records every broadcast as the sorted list of paths it contained.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Recorder::default())
    }

    pub fn events(&self) -> Vec<Vec<String>> {
        self.events.lock().expect("recorder lock").clone()
    }

    /// All paths seen across every event.
    pub fn all_paths(&self) -> Vec<String> {
        self.events().into_iter().flatten().collect()
    }
}

impl SyncChangeListener for Recorder {
    fn sync_info_changed(&self, resources: &[Resource]) {
        let mut paths: Vec<String> = resources.iter().map(|r| r.path().to_string()).collect();
        paths.sort();
        self.events.lock().expect("recorder lock").push(paths);
    }
}
