//! Unit tests for the Hetzner driver contract.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::test_support::{GatewayCall, Operation, ScriptedGateway};

struct DriverFixture {
    _tmp: TempDir,
    gateway: ScriptedGateway,
    tokens: Arc<Mutex<Vec<String>>>,
    driver: HetznerDriver<ScriptedGateway>,
}

#[fixture]
fn driver_fixture() -> DriverFixture {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().join("node-1"))
        .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
    let gateway = ScriptedGateway::new();
    let tokens = Arc::new(Mutex::new(Vec::new()));

    let shared = gateway.clone();
    let seen = Arc::clone(&tokens);
    let driver = HetznerDriver::with_connector(MachineRecord::new("node-1", root), move |token| {
        seen.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(token.to_owned());
        shared.clone()
    })
    .with_settings(DriverSettings::default().with_polling(Duration::ZERO, 30));

    DriverFixture {
        _tmp: tmp,
        gateway,
        tokens,
        driver,
    }
}

fn options(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[rstest]
fn flags_apply_defaults_for_absent_options(driver_fixture: DriverFixture) {
    let DriverFixture { mut driver, .. } = driver_fixture;

    driver
        .set_config_from_flags(&options(&[("hetzner-api-token", "tok")]))
        .unwrap_or_else(|err| panic!("flags should apply: {err}"));

    let record = driver.record();
    assert_eq!(record.api_token, "tok");
    assert_eq!(record.server_type, "cx11");
    assert_eq!(record.image, "ubuntu-20.04");
    assert_eq!(record.location, "nbg1");
}

#[rstest]
fn flags_override_server_parameters(driver_fixture: DriverFixture) {
    let DriverFixture { mut driver, .. } = driver_fixture;

    driver
        .set_config_from_flags(&options(&[
            ("hetzner-api-token", "tok"),
            ("hetzner-server-type", "cx21"),
            ("hetzner-image", "debian-12"),
            ("hetzner-location", "fsn1"),
        ]))
        .unwrap_or_else(|err| panic!("flags should apply: {err}"));

    let record = driver.record();
    assert_eq!(record.server_type, "cx21");
    assert_eq!(record.image, "debian-12");
    assert_eq!(record.location, "fsn1");
}

#[rstest]
fn missing_token_is_a_configuration_error(driver_fixture: DriverFixture) {
    let DriverFixture { mut driver, .. } = driver_fixture;

    let err = driver
        .set_config_from_flags(&options(&[("hetzner-location", "fsn1")]))
        .expect_err("token is required");

    let DriverError::Configuration(message) = err else {
        panic!("expected configuration error");
    };
    assert!(message.contains("HETZNER_API_TOKEN"), "message: {message}");
    assert!(message.contains("hetzner-api-token"), "message: {message}");
}

#[rstest]
#[tokio::test]
async fn create_without_token_never_reaches_provider(driver_fixture: DriverFixture) {
    let DriverFixture {
        mut driver,
        gateway,
        tokens,
        ..
    } = driver_fixture;

    let err = driver.create().await.expect_err("token is required");

    assert!(matches!(err, DriverError::Configuration(_)), "got {err:?}");
    assert!(gateway.calls().is_empty());
    assert!(
        tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_empty()
    );
    assert!(driver.pre_create_check().is_err());
}

#[rstest]
#[tokio::test]
async fn created_machine_exposes_connection_details(driver_fixture: DriverFixture) {
    let DriverFixture {
        mut driver, tokens, ..
    } = driver_fixture;
    driver
        .set_config_from_flags(&options(&[("hetzner-api-token", "tok")]))
        .unwrap_or_else(|err| panic!("flags should apply: {err}"));
    driver
        .pre_create_check()
        .unwrap_or_else(|err| panic!("pre-create check: {err}"));

    driver
        .create()
        .await
        .unwrap_or_else(|err| panic!("create should succeed: {err}"));

    assert_eq!(driver.driver_name(), "hetzner");
    assert_eq!(driver.ssh_username(), "root");
    assert_eq!(
        driver
            .ssh_hostname()
            .unwrap_or_else(|err| panic!("hostname: {err}")),
        "203.0.113.5"
    );
    assert_eq!(
        driver.url().unwrap_or_else(|err| panic!("url: {err}")),
        "tcp://203.0.113.5:2376"
    );
    let key_path = driver
        .ssh_key_path()
        .unwrap_or_else(|| panic!("key path should be set"));
    assert_eq!(
        key_path,
        driver.record().store_path.join("node-1_id_rsa").as_path()
    );
    assert!(
        tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .all(|token| token == "tok")
    );
}

#[rstest]
#[tokio::test]
async fn power_operations_map_to_provider_actions(driver_fixture: DriverFixture) {
    let DriverFixture {
        mut driver,
        gateway,
        ..
    } = driver_fixture;
    driver
        .set_config_from_flags(&options(&[("hetzner-api-token", "tok")]))
        .unwrap_or_else(|err| panic!("flags should apply: {err}"));
    driver
        .create()
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    driver.start().await.unwrap_or_else(|err| panic!("start: {err}"));
    driver.stop().await.unwrap_or_else(|err| panic!("stop: {err}"));
    driver
        .restart()
        .await
        .unwrap_or_else(|err| panic!("restart: {err}"));
    driver.kill().await.unwrap_or_else(|err| panic!("kill: {err}"));

    let powers: Vec<_> = gateway
        .calls()
        .into_iter()
        .filter(|call| call.operation() == Operation::Power)
        .collect();
    assert_eq!(
        powers,
        vec![
            GatewayCall::Power(42, PowerAction::PowerOn),
            GatewayCall::Power(42, PowerAction::PowerOff),
            GatewayCall::Power(42, PowerAction::Reboot),
            GatewayCall::Power(42, PowerAction::PowerOff),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn state_and_remove_round_out_the_lifecycle(driver_fixture: DriverFixture) {
    let DriverFixture {
        mut driver,
        gateway,
        ..
    } = driver_fixture;
    driver
        .set_config_from_flags(&options(&[("hetzner-api-token", "tok")]))
        .unwrap_or_else(|err| panic!("flags should apply: {err}"));
    driver
        .create()
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));
    gateway.set_status("off");

    let state = driver
        .state()
        .await
        .unwrap_or_else(|err| panic!("state: {err}"));
    assert_eq!(state, RunState::Stopped);

    driver
        .remove()
        .await
        .unwrap_or_else(|err| panic!("remove: {err}"));
    assert!(gateway.servers().is_empty());
    assert!(gateway.keys().is_empty());
    assert!(driver.ip().is_err());
    assert!(driver.ssh_key_path().is_none());
}

#[rstest]
fn create_flags_publish_provider_options(driver_fixture: DriverFixture) {
    let DriverFixture { driver, .. } = driver_fixture;
    let names: Vec<_> = driver.create_flags().iter().map(|flag| flag.name).collect();
    assert_eq!(
        names,
        [
            "hetzner-api-token",
            "hetzner-server-type",
            "hetzner-image",
            "hetzner-location"
        ]
    );
    let token_flag = driver
        .create_flags()
        .first()
        .unwrap_or_else(|| panic!("flags should not be empty"));
    assert_eq!(token_flag.default, None);
    assert_eq!(token_flag.env_var, "HETZNER_API_TOKEN");
}
