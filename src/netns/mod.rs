//! Scoped network namespace excursions.
//!
//! `setns(2)` changes the namespace of the calling thread, which every other
//! piece of code on that thread then observes. Excursions are therefore
//! serialized through one process-wide lock, and the original namespace is
//! restored on every exit path of the closure, including unwinding.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use nix::sched::{setns, CloneFlags};
use tracing::{error, trace};

use crate::error::{Error, Result};

/// Namespace handle of the calling thread
pub const CURRENT_NETNS: &str = "/proc/thread-self/ns/net";

static NETNS_LOCK: Mutex<()> = Mutex::new(());

/// Runs closures inside another network namespace
pub trait NamespaceAccess {
    /// Enter the namespace at `path`, run `f`, and come back
    fn with_namespace<T, F>(&self, path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>;
}

impl<N: NamespaceAccess + ?Sized> NamespaceAccess for &N {
    fn with_namespace<T, F>(&self, path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        (**self).with_namespace(path, f)
    }
}

/// Switches namespaces with `setns(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct Netns;

impl NamespaceAccess for Netns {
    fn with_namespace<T, F>(&self, path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        // A poisoned lock only means an earlier closure panicked; the guard
        // below already put that thread back.
        let lock = NETNS_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let target = File::open(path).map_err(|e| Error::Namespace {
            path: path.to_path_buf(),
            reason: format!("could not open namespace: {e}"),
        })?;

        let excursion = Excursion::enter(path, &target, lock)?;
        let result = f();
        drop(excursion);
        result
    }
}

/// Restores the original namespace when dropped, on return and on unwinding
/// alike. A failed restore aborts the process.
struct Excursion<'a> {
    original: File,
    path: PathBuf,
    _lock: MutexGuard<'a, ()>,
}

impl<'a> Excursion<'a> {
    fn enter(path: &Path, target: &File, lock: MutexGuard<'a, ()>) -> Result<Self> {
        let original = File::open(CURRENT_NETNS).map_err(|e| Error::Namespace {
            path: PathBuf::from(CURRENT_NETNS),
            reason: format!("could not open current namespace: {e}"),
        })?;

        setns(target.as_raw_fd(), CloneFlags::CLONE_NEWNET).map_err(|e| Error::Namespace {
            path: path.to_path_buf(),
            reason: format!("could not enter namespace: {e}"),
        })?;
        trace!(netns = %path.display(), "entered network namespace");

        Ok(Self {
            original,
            path: path.to_path_buf(),
            _lock: lock,
        })
    }
}

impl Drop for Excursion<'_> {
    fn drop(&mut self) {
        if let Err(e) = setns(self.original.as_raw_fd(), CloneFlags::CLONE_NEWNET) {
            // The thread is stuck in the wrong namespace; nothing after this
            // point can be trusted.
            error!(netns = %self.path.display(), error = %e, "failed to restore network namespace");
            std::process::abort();
        }
        trace!(netns = %self.path.display(), "restored original network namespace");
    }
}

/// Identity of the calling thread's network namespace, e.g. `net:[4026531840]`
pub fn current_namespace_id() -> Result<String> {
    let link = std::fs::read_link(CURRENT_NETNS)?;
    Ok(link.to_string_lossy().into_owned())
}
