use gov_client::provider::memory::ChainSnapshot;
use gov_client::{ConfigError, GovConfig, ParameterRegistry, ProviderError, RegistryError};
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::tempdir;

const ENV_VARS: [&str; 4] = [
    "GOV_MAX_PARAMETER_CHANGE_SIZE",
    "GOV_ACCOUNT",
    "GOV_RETRY_COUNT",
    "GOV_RETRY_DELAY_MS",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

#[test]
fn load_reads_json_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gov.json");
    fs::write(
        &path,
        r#"{"max_parameter_change_size": 2048, "account": "tz1me", "sync": {"stale_time_ms": 500}}"#,
    )
    .unwrap();
    let cfg = GovConfig::load(&path).unwrap();
    assert_eq!(cfg.max_parameter_change_size, 2048);
    assert_eq!(cfg.account.as_deref(), Some("tz1me"));
    assert_eq!(cfg.sync.stale_time_ms, 500);
    assert_eq!(cfg.sync.proposals_interval_ms, 30_000);
}

#[test]
fn load_reports_io_and_decode_errors() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        GovConfig::load(dir.path().join("missing.json")),
        Err(ConfigError::Io(_))
    ));
    let path = dir.path().join("bad.json");
    fs::write(&path, "{not json").unwrap();
    assert!(matches!(GovConfig::load(&path), Err(ConfigError::Decode(_))));
    fs::write(&path, r#"{"max_parameter_change_size": 0}"#).unwrap();
    assert!(matches!(GovConfig::load(&path), Err(ConfigError::Invalid(_))));
}

#[test]
#[serial]
fn env_overrides_apply() {
    clear_env();
    env::set_var("GOV_MAX_PARAMETER_CHANGE_SIZE", "4096");
    env::set_var("GOV_ACCOUNT", "tz1env");
    env::set_var("GOV_RETRY_COUNT", " 5 ");
    let cfg = GovConfig::default().with_env_overrides().unwrap();
    clear_env();
    assert_eq!(cfg.max_parameter_change_size, 4096);
    assert_eq!(cfg.account.as_deref(), Some("tz1env"));
    assert_eq!(cfg.sync.retry_count, 5);
    assert_eq!(cfg.sync.retry_delay_ms, 1_000);
}

#[test]
#[serial]
fn malformed_env_value_is_rejected() {
    clear_env();
    env::set_var("GOV_RETRY_DELAY_MS", "soon");
    let err = GovConfig::default().with_env_overrides().unwrap_err();
    clear_env();
    match err {
        ConfigError::Env { var, value } => {
            assert_eq!(var, "GOV_RETRY_DELAY_MS");
            assert_eq!(value, "soon");
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
#[serial]
fn empty_account_clears_it() {
    clear_env();
    env::set_var("GOV_ACCOUNT", "");
    let base = GovConfig {
        account: Some("tz1file".into()),
        ..GovConfig::default()
    };
    let cfg = base.with_env_overrides().unwrap();
    clear_env();
    assert!(cfg.account.is_none());
}

#[test]
fn registry_file_overrides_builtin() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("params.json");
    fs::write(
        &path,
        r#"{"categories": [{"name": "Only", "parameters": [
            {"id": "fee", "name": "Fee", "type": "number", "min": 0}
        ]}]}"#,
    )
    .unwrap();
    let registry = ParameterRegistry::load(&path).unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.get("fee").unwrap().kind.is_number());

    fs::write(
        &path,
        r#"{"categories": [
            {"name": "A", "parameters": [{"id": "x", "name": "X", "type": "text"}]},
            {"name": "B", "parameters": [{"id": "x", "name": "X", "type": "text"}]}
        ]}"#,
    )
    .unwrap();
    assert!(matches!(
        ParameterRegistry::load(&path),
        Err(RegistryError::DuplicateId(id)) if id == "x"
    ));
}

#[test]
fn snapshot_balances_are_checked_on_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chain.json");
    fs::write(&path, r#"{"totalSupply": "1000", "balances": {"tz1me": "250"}}"#).unwrap();
    let snapshot = ChainSnapshot::load(&path).unwrap();
    assert_eq!(snapshot.balances["tz1me"].to_string(), "250");

    fs::write(&path, r#"{"balances": {"tz1me": "a lot"}}"#).unwrap();
    assert!(matches!(
        ChainSnapshot::load(&path),
        Err(ProviderError::Unavailable(msg)) if msg.starts_with("decode snapshot")
    ));
}
