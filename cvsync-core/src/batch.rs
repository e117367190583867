//! The reentrant batch lock
//!
//! Mutating operations run inside a per-thread batch scope keyed by a
//! scheduling rule (a resource path covering the operation). Scopes nest
//! on the same thread; a nested acquire must stay within the top-level
//! rule. While a batch is open, every mutation records its resource on
//! the thread's change sets; the sets are drained exactly once, on the
//! outermost release, into the commit callback supplied by the caller.
//!
//! Threads with conflicting rules (one containing the other) serialise:
//! the later acquire blocks until the earlier thread's outermost release
//! has finished committing. Disjoint rules proceed in parallel.
//!
//! Lock order: the workspace scheduling rule encloses this lock, which
//! encloses the op lock. Never acquire a batch scope while holding the
//! op lock.

use std::collections::HashMap;
use std::collections::HashSet;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::errors::{Result, SyncError};
use crate::resource::{Resource, ResourcePath};

/// The change sets accumulated by one thread's batch.
#[derive(Debug, Default)]
pub struct BatchChanges {
    pub changed_resources: HashSet<Resource>,
    pub changed_folders: HashSet<Resource>,
    pub changed_ignore_files: HashSet<Resource>,
}

impl BatchChanges {
    pub fn is_empty(&self) -> bool {
        self.changed_resources.is_empty()
            && self.changed_folders.is_empty()
            && self.changed_ignore_files.is_empty()
    }
}

#[derive(Debug)]
struct Scope {
    rule: ResourcePath,
    /// Number of nested acquisitions beyond the outermost one.
    nesting: usize,
    changes: BatchChanges,
}

/// Two rules conflict when one contains the other.
fn rules_conflict(a: &ResourcePath, b: &ResourcePath) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

#[derive(Debug, Default)]
pub struct BatchLock {
    scopes: Mutex<HashMap<ThreadId, Scope>>,
    released: Condvar,
}

impl BatchLock {
    pub fn new() -> Self {
        BatchLock::default()
    }

    /// Open (or nest) a batch scope on the current thread.
    ///
    /// Blocks while another thread holds a conflicting rule. Nesting with
    /// a rule not contained in the thread's top-level rule is an error.
    pub fn acquire(&self, rule: &ResourcePath) -> Result<()> {
        let thread = thread::current().id();
        let mut scopes = self.scopes.lock();
        if let Some(scope) = scopes.get_mut(&thread) {
            if !rule.starts_with(&scope.rule) {
                return Err(SyncError::InvalidScope(format!(
                    "rule {rule} is not contained in the active rule {}",
                    scope.rule
                )));
            }
            scope.nesting += 1;
            return Ok(());
        }
        while scopes
            .iter()
            .any(|(id, scope)| *id != thread && rules_conflict(&scope.rule, rule))
        {
            self.released.wait(&mut scopes);
        }
        trace!(%rule, "batch scope opened");
        scopes.insert(
            thread,
            Scope {
                rule: rule.clone(),
                nesting: 0,
                changes: BatchChanges::default(),
            },
        );
        Ok(())
    }

    /// Close the current scope. On the outermost release the accumulated
    /// changes are drained into `commit`, exactly once; the scope keeps
    /// blocking conflicting threads until the commit has finished. The
    /// changes are discarded even if the commit fails.
    pub fn release<F>(&self, commit: F) -> Result<()>
    where
        F: FnOnce(BatchChanges) -> Result<()>,
    {
        let thread = thread::current().id();
        let changes = {
            let mut scopes = self.scopes.lock();
            let scope = scopes.get_mut(&thread).ok_or_else(|| {
                SyncError::InvalidScope("release without a matching acquire".to_string())
            })?;
            if scope.nesting > 0 {
                scope.nesting -= 1;
                return Ok(());
            }
            std::mem::take(&mut scope.changes)
        };
        let result = commit(changes);
        let mut scopes = self.scopes.lock();
        scopes.remove(&thread);
        self.released.notify_all();
        trace!("batch scope closed");
        result
    }

    /// Drain the current thread's accumulated changes into `commit`
    /// without closing the scope.
    pub fn flush_current<F>(&self, commit: F) -> Result<()>
    where
        F: FnOnce(BatchChanges) -> Result<()>,
    {
        let thread = thread::current().id();
        let changes = {
            let mut scopes = self.scopes.lock();
            match scopes.get_mut(&thread) {
                Some(scope) => std::mem::take(&mut scope.changes),
                None => return Ok(()),
            }
        };
        commit(changes)
    }

    pub fn record_resource_changed(&self, resource: &Resource) {
        self.record(|changes| {
            changes.changed_resources.insert(resource.clone());
        });
    }

    pub fn record_folder_changed(&self, folder: &Resource) {
        self.record(|changes| {
            changes.changed_folders.insert(folder.clone());
        });
    }

    pub fn record_ignore_file_changed(&self, file: &Resource) {
        self.record(|changes| {
            changes.changed_ignore_files.insert(file.clone());
        });
    }

    fn record(&self, apply: impl FnOnce(&mut BatchChanges)) {
        let thread = thread::current().id();
        let mut scopes = self.scopes.lock();
        match scopes.get_mut(&thread) {
            Some(scope) => apply(&mut scope.changes),
            None => warn!("change recorded outside a batch scope; dropped"),
        }
    }

    /// True if the resource is contained in the current thread's
    /// top-level rule.
    pub fn is_within_active_thread(&self, resource: &Resource) -> bool {
        let thread = thread::current().id();
        self.scopes
            .lock()
            .get(&thread)
            .map(|scope| resource.path().starts_with(&scope.rule))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn path(s: &str) -> ResourcePath {
        ResourcePath::parse(s)
    }

    fn resource(s: &str) -> Resource {
        Resource::file(path(s))
    }

    #[test]
    fn outermost_release_drains_once() {
        let lock = BatchLock::new();
        lock.acquire(&path("/proj")).unwrap();
        lock.acquire(&path("/proj/src")).unwrap();
        lock.record_resource_changed(&resource("/proj/src/a.txt"));

        // Inner release: no commit.
        lock.release(|_| panic!("inner release must not commit")).unwrap();

        let mut seen = 0;
        lock.release(|changes| {
            seen = changes.changed_resources.len();
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn nested_acquire_outside_rule_is_an_error() {
        let lock = BatchLock::new();
        lock.acquire(&path("/proj/src")).unwrap();
        assert!(matches!(
            lock.acquire(&path("/other")),
            Err(SyncError::InvalidScope(_))
        ));
        lock.release(|_| Ok(())).unwrap();
    }

    #[test]
    fn changes_discarded_even_when_commit_fails() {
        let lock = BatchLock::new();
        lock.acquire(&path("/proj")).unwrap();
        lock.record_resource_changed(&resource("/proj/a.txt"));
        let result = lock.release(|_| Err(SyncError::Cancelled));
        assert!(result.is_err());

        // A fresh scope starts empty.
        lock.acquire(&path("/proj")).unwrap();
        lock.release(|changes| {
            assert!(changes.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn within_active_thread() {
        let lock = BatchLock::new();
        lock.acquire(&path("/proj/src")).unwrap();
        assert!(lock.is_within_active_thread(&resource("/proj/src/a.txt")));
        assert!(!lock.is_within_active_thread(&resource("/proj/other.txt")));
        lock.release(|_| Ok(())).unwrap();
        assert!(!lock.is_within_active_thread(&resource("/proj/src/a.txt")));
    }

    #[test]
    fn disjoint_rules_run_in_parallel_and_conflicts_block() {
        let lock = Arc::new(BatchLock::new());

        // Disjoint rule on another thread proceeds while we hold ours.
        lock.acquire(&path("/a")).unwrap();
        {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                lock.acquire(&path("/b")).unwrap();
                lock.release(|_| Ok(())).unwrap();
            })
            .join()
            .unwrap();
        }

        // A conflicting rule blocks until we release.
        let blocked = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                lock.acquire(&path("/a/inner")).unwrap();
                lock.release(|_| Ok(())).unwrap();
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!blocked.is_finished());
        lock.release(|_| Ok(())).unwrap();
        blocked.join().unwrap();
    }
}
