// File: tests/locator_test.rs

mod common;

use common::{install_executable, RecordingRunner};
use std::ffi::OsString;
use std::path::PathBuf;
use tempfile::TempDir;

use veth_ethtool::ethtool::{Ethtool, OffloadApplier};
use veth_ethtool::exec::{Invocation, Locator};
use veth_ethtool::Error;

// Not present on the machine running the tests, only under the fake host root
const HOST_ONLY_DIR: &str = "/opt/veth-ethtool-test/sbin";

fn search_path(dirs: &[PathBuf]) -> OsString {
    std::env::join_paths(dirs).expect("valid search path")
}

#[test]
fn test_prefers_local_executable() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let host = TempDir::new()?;
    let expected = install_executable(local.path(), "sbin/ethtool");
    install_executable(host.path(), "opt/veth-ethtool-test/sbin/ethtool");

    let locator = Locator::new(
        search_path(&[local.path().join("sbin"), PathBuf::from(HOST_ONLY_DIR)]),
        host.path(),
    );

    assert_eq!(locator.locate("ethtool")?, Invocation::Direct(expected));

    Ok(())
}

#[test]
fn test_falls_back_to_alternate_root() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let host = TempDir::new()?;
    install_executable(host.path(), "opt/veth-ethtool-test/sbin/ethtool");

    let locator = Locator::new(
        search_path(&[local.path().join("bin"), PathBuf::from(HOST_ONLY_DIR)]),
        host.path(),
    );

    let invocation = locator.locate("ethtool")?;
    assert_eq!(
        invocation,
        Invocation::Chroot {
            root: host.path().to_path_buf(),
            program: PathBuf::from(HOST_ONLY_DIR).join("ethtool"),
        }
    );

    let argv = invocation.argv(["-K", "eth0", "tx", "off"]);
    assert_eq!(argv[0], OsString::from("chroot"));
    assert_eq!(argv[1].as_os_str(), host.path().as_os_str());
    assert_eq!(argv[2], OsString::from("/opt/veth-ethtool-test/sbin/ethtool"));
    assert_eq!(argv.len(), 7);

    Ok(())
}

#[test]
fn test_absolute_symlink_resolves_inside_alternate_root() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let host = TempDir::new()?;
    install_executable(host.path(), "opt/veth-ethtool-test/libexec/ethtool");
    std::fs::create_dir_all(host.path().join("opt/veth-ethtool-test/sbin"))?;
    std::os::unix::fs::symlink(
        "/opt/veth-ethtool-test/libexec/ethtool",
        host.path().join("opt/veth-ethtool-test/sbin/ethtool"),
    )?;

    let locator = Locator::new(
        search_path(&[local.path().join("bin"), PathBuf::from(HOST_ONLY_DIR)]),
        host.path(),
    );

    assert_eq!(
        locator.locate("ethtool")?,
        Invocation::Chroot {
            root: host.path().to_path_buf(),
            program: PathBuf::from(HOST_ONLY_DIR).join("ethtool"),
        }
    );

    Ok(())
}

#[test]
fn test_symlink_out_of_alternate_root_is_not_followed() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let host = TempDir::new()?;
    std::fs::create_dir_all(host.path().join("opt/veth-ethtool-test/sbin"))?;
    // Exists on the local filesystem but not under the alternate root
    std::os::unix::fs::symlink("/bin/sh", host.path().join("opt/veth-ethtool-test/sbin/ethtool"))?;

    let locator = Locator::new(
        search_path(&[local.path().join("bin"), PathBuf::from(HOST_ONLY_DIR)]),
        host.path(),
    );

    let err = locator.locate("ethtool").unwrap_err();
    assert!(matches!(&err, Error::ExecutableNotFound(name) if name == "ethtool"));

    Ok(())
}

#[test]
fn test_not_found_anywhere() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let host = TempDir::new()?;

    let locator = Locator::new(search_path(&[local.path().to_path_buf()]), host.path());

    let err = locator.locate("ethtool").unwrap_err();
    assert!(matches!(&err, Error::ExecutableNotFound(name) if name == "ethtool"));
    assert!(err.is_not_found());

    Ok(())
}

#[test]
fn test_missing_alternate_root_is_not_searched() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let locator = Locator::new(
        search_path(&[local.path().to_path_buf()]),
        local.path().join("no-such-root"),
    );

    assert!(locator.locate("ethtool").is_err());

    Ok(())
}

#[test]
fn test_non_executable_file_is_ignored() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let host = TempDir::new()?;
    std::fs::write(local.path().join("ethtool"), "not a program")?;

    let locator = Locator::new(search_path(&[local.path().to_path_buf()]), host.path());

    assert!(locator.locate("ethtool").is_err());

    Ok(())
}

#[test]
fn test_set_translates_to_on_off() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let host = TempDir::new()?;
    let program = install_executable(local.path(), "ethtool");
    let runner = RecordingRunner::default();

    let locator = Locator::new(local.path().as_os_str(), host.path());
    let ethtool = Ethtool::locate(&locator, &runner)?;

    ethtool.set("eth0", "tx-checksumming", true)?;
    ethtool.set("eth0", "rx-checksumming", false)?;

    let program = program.to_string_lossy().into_owned();
    assert_eq!(
        *runner.argvs.borrow(),
        vec![
            vec![program.clone(), "-K".into(), "eth0".into(), "tx-checksumming".into(), "on".into()],
            vec![program, "-K".into(), "eth0".into(), "rx-checksumming".into(), "off".into()],
        ]
    );

    Ok(())
}

#[test]
fn test_failed_command_is_reported_verbatim() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let host = TempDir::new()?;
    install_executable(local.path(), "ethtool");
    let runner = RecordingRunner {
        exit_code: 1,
        stderr: "Cannot get device feature names: No such device\n".to_string(),
        ..Default::default()
    };

    let locator = Locator::new(local.path().as_os_str(), host.path());
    let ethtool = Ethtool::locate(&locator, &runner)?;

    match ethtool.set("eth9", "tso", false).unwrap_err() {
        Error::Command { command, stderr, .. } => {
            assert!(command.ends_with("-K eth9 tso off"), "{command}");
            assert_eq!(stderr, "Cannot get device feature names: No such device");
        }
        other => panic!("unexpected error: {other}"),
    }

    Ok(())
}

#[test]
fn test_features_are_read_back() -> Result<(), Box<dyn std::error::Error>> {
    let local = TempDir::new()?;
    let host = TempDir::new()?;
    install_executable(local.path(), "ethtool");
    let runner = RecordingRunner {
        stdout: "Features for eth0:\nrx-checksumming: off\ntx-checksumming: on\n".to_string(),
        ..Default::default()
    };

    let locator = Locator::new(local.path().as_os_str(), host.path());
    let ethtool = Ethtool::locate(&locator, &runner)?;

    let features = ethtool.features("eth0")?;
    assert_eq!(features.get("rx-checksumming"), Some(&false));
    assert_eq!(features.get("tx-checksumming"), Some(&true));
    assert_eq!(runner.argvs.borrow()[0][1..], ["-k".to_string(), "eth0".to_string()]);

    Ok(())
}
