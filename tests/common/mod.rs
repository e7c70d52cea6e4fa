// File: tests/common/mod.rs
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};

use veth_ethtool::error::{Error, Result};
use veth_ethtool::ethtool::{CommandOutput, OffloadApplier};
use veth_ethtool::exec::CommandRunner;
use veth_ethtool::link::{Introspector, LinkAttributes};
use veth_ethtool::netns::NamespaceAccess;

/// One recorded side effect, tagged with the namespace it happened in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub namespace: Option<PathBuf>,
    pub interface: String,
    pub parameter: String,
    pub enabled: bool,
}

impl Call {
    pub fn new(namespace: Option<&str>, interface: &str, parameter: &str, enabled: bool) -> Self {
        Self {
            namespace: namespace.map(PathBuf::from),
            interface: interface.to_string(),
            parameter: parameter.to_string(),
            enabled,
        }
    }
}

/// A simulated host with namespaces, links and an offload tool
#[derive(Default)]
pub struct World {
    /// Namespace the "thread" is in; None is the host
    pub current: RefCell<Option<PathBuf>>,
    /// Existing namespaces and the ID the host assigned them
    pub namespaces: HashMap<PathBuf, i32>,
    /// Links per namespace (None = host)
    pub links: HashMap<(Option<PathBuf>, String), LinkAttributes>,
    /// Live feature state per (namespace, interface)
    pub features: RefCell<HashMap<(Option<PathBuf>, String), BTreeMap<String, bool>>>,
    /// Parameters the tool rejects
    pub failing: Vec<String>,
    pub calls: RefCell<Vec<Call>>,
    pub argvs: RefCell<Vec<(Option<PathBuf>, Vec<String>)>>,
    pub excursions: RefCell<usize>,
}

impl World {
    pub fn add_namespace(&mut self, path: &str, nsid: i32) {
        self.namespaces.insert(PathBuf::from(path), nsid);
    }

    pub fn add_link(
        &mut self,
        namespace: Option<&str>,
        name: &str,
        index: u32,
        parent_index: u32,
        link_netnsid: Option<i32>,
    ) {
        self.links.insert(
            (namespace.map(PathBuf::from), name.to_string()),
            LinkAttributes {
                index,
                parent_index,
                link_netnsid,
            },
        );
        self.features
            .borrow_mut()
            .insert((namespace.map(PathBuf::from), name.to_string()), BTreeMap::new());
    }

    pub fn current(&self) -> Option<PathBuf> {
        self.current.borrow().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn link_here(&self, name: &str) -> Result<LinkAttributes> {
        self.links
            .get(&(self.current(), name.to_string()))
            .copied()
            .ok_or_else(|| Error::InterfaceNotFound {
                interface: name.to_string(),
                namespace: None,
                reason: "no such link".to_string(),
            })
    }
}

impl NamespaceAccess for World {
    fn with_namespace<T, F>(&self, path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if !self.namespaces.contains_key(path) {
            return Err(Error::Namespace {
                path: path.to_path_buf(),
                reason: "could not open namespace: No such file or directory".to_string(),
            });
        }
        *self.excursions.borrow_mut() += 1;
        let previous = self.current.replace(Some(path.to_path_buf()));
        let result = f();
        self.current.replace(previous);
        result
    }
}

impl Introspector for World {
    fn attributes_of(&self, name: &str) -> Result<LinkAttributes> {
        self.link_here(name)
    }

    fn correlation_id_of(&self, path: &Path) -> Result<i32> {
        assert!(self.current().is_none(), "namespace IDs are read from the host");
        self.namespaces
            .get(path)
            .copied()
            .ok_or_else(|| Error::Namespace {
                path: path.to_path_buf(),
                reason: "could not open file for reading".to_string(),
            })
    }
}

impl OffloadApplier for World {
    fn set(&self, interface: &str, parameter: &str, enabled: bool) -> Result<CommandOutput> {
        self.link_here(interface)?;
        self.calls.borrow_mut().push(Call {
            namespace: self.current(),
            interface: interface.to_string(),
            parameter: parameter.to_string(),
            enabled,
        });
        if self.failing.iter().any(|p| p == parameter) {
            return Err(Error::Command {
                command: format!("ethtool -K {interface} {parameter}"),
                status: "exit status: 1".to_string(),
                stderr: format!("Could not change any device features for {parameter}"),
            });
        }
        self.features
            .borrow_mut()
            .entry((self.current(), interface.to_string()))
            .or_default()
            .insert(parameter.to_string(), enabled);
        Ok(CommandOutput::default())
    }

    fn features(&self, interface: &str) -> Result<BTreeMap<String, bool>> {
        self.link_here(interface)?;
        Ok(self
            .features
            .borrow()
            .get(&(self.current(), interface.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

impl CommandRunner for World {
    fn run(&self, argv: &[OsString]) -> io::Result<Output> {
        self.argvs.borrow_mut().push((
            self.current(),
            argv.iter().map(|a| a.to_string_lossy().into_owned()).collect(),
        ));
        Ok(output(0, "", ""))
    }
}

/// A runner that only records what it was asked to do
#[derive(Debug, Default)]
pub struct RecordingRunner {
    pub argvs: RefCell<Vec<Vec<String>>>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandRunner for RecordingRunner {
    fn run(&self, argv: &[OsString]) -> io::Result<Output> {
        self.argvs
            .borrow_mut()
            .push(argv.iter().map(|a| a.to_string_lossy().into_owned()).collect());
        Ok(output(self.exit_code, &self.stdout, &self.stderr))
    }
}

pub fn output(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Create an executable file at `root/relative`
pub fn install_executable(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
