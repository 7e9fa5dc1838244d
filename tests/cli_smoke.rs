//! Behavioural smoke tests for the CLI entrypoint.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::net::Ipv4Addr;

use assert_cmd::cargo::cargo_bin_cmd;
use camino::Utf8PathBuf;
use hcloud_driver::{MachineRecord, MachineStore, Phase};
use predicates::prelude::*;
use tempfile::TempDir;

use test_constants::MACHINE_NAME;

fn utf8_root(tmp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()))
}

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("hcloud-driver");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn flags_lists_create_options() {
    let mut cmd = cargo_bin_cmd!("hcloud-driver");
    cmd.arg("flags")
        .assert()
        .success()
        .stdout(predicate::str::contains("--hetzner-api-token"))
        .stdout(predicate::str::contains("env: HETZNER_LOCATION"));
}

#[test]
fn ip_for_unknown_machine_fails() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let mut cmd = cargo_bin_cmd!("hcloud-driver");
    cmd.arg("--store-path")
        .arg(tmp.path())
        .args(["ip", MACHINE_NAME])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no machine record"));
}

#[test]
fn url_reads_saved_machine_state() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let root = utf8_root(&tmp);
    let store = MachineStore::new(root.join(MACHINE_NAME));
    let mut record = MachineRecord::new(MACHINE_NAME, store.root());
    record.server_id = Some(42);
    record.ip_address = Some(Ipv4Addr::new(203, 0, 113, 5));
    record.phase = Phase::Addressable;
    store
        .save(&record)
        .unwrap_or_else(|err| panic!("save record: {err}"));

    let mut cmd = cargo_bin_cmd!("hcloud-driver");
    cmd.env("HCLOUD_DRIVER_STORE_PATH", root.as_str())
        .args(["url", MACHINE_NAME])
        .assert()
        .success()
        .stdout("tcp://203.0.113.5:2376\n");
}

#[test]
fn create_without_token_reports_where_to_set_it() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let root = utf8_root(&tmp);

    let mut cmd = cargo_bin_cmd!("hcloud-driver");
    cmd.current_dir(root.as_str())
        .env("HOME", root.as_str())
        .env("XDG_CONFIG_HOME", root.as_str())
        .env_remove("HETZNER_API_TOKEN")
        .env_remove("HCLOUD_DRIVER_CONFIG_PATH")
        .args(["--store-path", root.as_str(), "create", MACHINE_NAME])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HETZNER_API_TOKEN"));

    let store = MachineStore::new(root.join(MACHINE_NAME));
    assert!(
        !store
            .exists()
            .unwrap_or_else(|err| panic!("exists: {err}")),
        "nothing should be saved when configuration is incomplete"
    );
}

#[test]
fn machine_names_cannot_escape_the_store() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let mut cmd = cargo_bin_cmd!("hcloud-driver");
    cmd.arg("--store-path")
        .arg(tmp.path())
        .args(["state", "../outside"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid machine name"));
}
