//! Locating and running external tools.
//!
//! The plugin may run inside a minimal container image that lacks the tool
//! it needs while the node's root filesystem is bind-mounted at `/host`.
//! [`Locator`] searches the local `PATH` first and falls back to the same
//! search under the alternate root, in which case the tool is invoked
//! through `chroot`.

use std::collections::VecDeque;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::error::{Error, Result};

/// Where the node's root filesystem is mounted inside the plugin container
pub const DEFAULT_ALT_ROOT: &str = "/host";

/// Search path used when `PATH` is unset
pub const FALLBACK_SEARCH_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// How to start a located tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Run the binary at this path
    Direct(PathBuf),
    /// Change root to `root` and run `program`, a path inside that root
    Chroot { root: PathBuf, program: PathBuf },
}

impl Invocation {
    /// Full argument vector for running the tool with `args`
    pub fn argv<I, S>(&self, args: I) -> Vec<OsString>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut argv = match self {
            Self::Direct(program) => vec![program.clone().into_os_string()],
            Self::Chroot { root, program } => vec![
                OsString::from("chroot"),
                root.clone().into_os_string(),
                program.clone().into_os_string(),
            ],
        };
        argv.extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        argv
    }
}

/// Resolves command names to an [`Invocation`]
#[derive(Debug, Clone)]
pub struct Locator {
    search_path: OsString,
    alt_root: PathBuf,
}

impl Default for Locator {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Locator {
    /// Search `search_path` locally and under `alt_root`
    pub fn new(search_path: impl Into<OsString>, alt_root: impl Into<PathBuf>) -> Self {
        Self {
            search_path: search_path.into(),
            alt_root: alt_root.into(),
        }
    }

    /// Use the process `PATH` and `/host`
    pub fn from_env() -> Self {
        let search_path =
            env::var_os("PATH").unwrap_or_else(|| OsString::from(FALLBACK_SEARCH_PATH));
        Self::new(search_path, DEFAULT_ALT_ROOT)
    }

    /// Find `name`, preferring the local filesystem over the alternate root
    pub fn locate(&self, name: &str) -> Result<Invocation> {
        if let Ok(path) = which::which_in(name, Some(&self.search_path), "/") {
            debug!(command = name, path = %path.display(), "found executable");
            return Ok(Invocation::Direct(path));
        }

        if let Some(program) = self.locate_in_alt_root(name) {
            debug!(
                command = name,
                root = %self.alt_root.display(),
                path = %program.display(),
                "found executable under alternate root"
            );
            return Ok(Invocation::Chroot {
                root: self.alt_root.clone(),
                program,
            });
        }

        Err(Error::ExecutableNotFound(name.to_string()))
    }

    /// Same search with every `PATH` entry taken inside the alternate root;
    /// returns the in-root path.
    ///
    /// Symlinks are followed relative to the root, so an absolute link such
    /// as `/host/usr/sbin/ethtool -> /usr/sbin/ethtool` resolves where `chroot`
    /// will find it rather than on the local filesystem.
    fn locate_in_alt_root(&self, name: &str) -> Option<PathBuf> {
        if !self.alt_root.is_dir() {
            return None;
        }
        env::split_paths(&self.search_path)
            .filter(|dir| dir.is_absolute())
            .map(|dir| dir.join(name))
            .find(|program| {
                resolve_beneath(&self.alt_root, program)
                    .is_some_and(|resolved| is_executable(&self.alt_root.join(resolved)))
            })
    }
}

/// Upper bound on symlinks followed for one path, as in the kernel
const MAX_SYMLINK_HOPS: usize = 40;

/// Resolve the absolute `path` as if `root` were `/`, returning the in-root
/// path of the final target. Dangling links and loops yield `None`.
fn resolve_beneath(root: &Path, path: &Path) -> Option<PathBuf> {
    let mut pending: VecDeque<OsString> = components(path).collect();
    let mut resolved = PathBuf::from("/");
    let mut hops = 0;

    while let Some(part) = pending.pop_front() {
        if part == ".." {
            resolved.pop();
            continue;
        }
        resolved.push(&part);

        let on_disk = root.join(resolved.strip_prefix("/").ok()?);
        let metadata = fs::symlink_metadata(&on_disk).ok()?;
        if !metadata.file_type().is_symlink() {
            continue;
        }

        hops += 1;
        if hops > MAX_SYMLINK_HOPS {
            return None;
        }
        let target = fs::read_link(&on_disk).ok()?;
        resolved.pop();
        if target.is_absolute() {
            resolved = PathBuf::from("/");
        }
        for part in components(&target).rev() {
            pending.push_front(part);
        }
    }

    resolved.strip_prefix("/").ok().map(Path::to_path_buf)
}

fn components(path: &Path) -> impl DoubleEndedIterator<Item = OsString> + '_ {
    path.components().filter_map(|component| match component {
        Component::Normal(part) => Some(part.to_os_string()),
        Component::ParentDir => Some(OsString::from("..")),
        Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
    })
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

/// Runs a fully resolved argument vector
pub trait CommandRunner {
    fn run(&self, argv: &[OsString]) -> io::Result<Output>;
}

/// Spawns real processes.
///
/// Children inherit the calling thread's network namespace, so commands run
/// inside a namespace excursion act on that namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[OsString]) -> io::Result<Output> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        Command::new(program).args(args).output()
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, argv: &[OsString]) -> io::Result<Output> {
        (**self).run(argv)
    }
}

/// Render an argument vector for logs and errors
pub fn display_argv(argv: &[OsString]) -> String {
    argv.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
