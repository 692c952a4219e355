use crate::config::Config;
use crate::domain::types::{EngineIdentity, MetricCategory};

const FULL_CONFIG: &str = r#"
interval = 30
ignore_internal_entities = true
report_folder = "reports"
reports = ["EntityCache", "AgentEntity", "TxnManagerReport"]

[[engine]]
name = "BE-inference-1"
host = "host1"
port = 5555
username = "admin"
password = "secret"

[[engine]]
name = "BE-inference-2"
host = "host2"
port = 5555

[[engine]]
pid = 4242

[include]
EntityCache = ["Order.*", "Customer"]
"#;

#[test]
fn test_full_config_parses() {
    let config = Config::from_toml_str(FULL_CONFIG).expect("config should parse");

    assert_eq!(config.poll_interval.as_secs(), 30);
    assert!(config.ignore_internal_entities);
    assert_eq!(config.report_folder.as_deref().unwrap().to_str(), Some("reports"));
    assert_eq!(config.categories.len(), 3);
    assert_eq!(config.engines.len(), 3);

    let first = &config.engines[0];
    assert_eq!(first.name, "BE-inference-1");
    assert!(first.credentials.is_some());
    match &first.identity {
        EngineIdentity::Remote { host, port } => {
            assert_eq!(host, "host1");
            assert_eq!(*port, 5555);
        }
        other => panic!("unexpected identity {:?}", other),
    }

    // No credentials configured for the second engine.
    assert!(config.engines[1].credentials.is_none());

    // Local-attach engines get a pid-derived name.
    assert_eq!(config.engines[2].name, "PID-4242");

    let includes = config.include.get(&MetricCategory::EntityCache).unwrap();
    assert_eq!(includes.len(), 2);
}

#[test]
fn test_defaults() {
    let config = Config::from_toml_str(
        r#"
[[engine]]
name = "BE"
host = "localhost"
port = 5555
"#,
    )
    .unwrap();

    assert_eq!(config.poll_interval.as_secs(), 60);
    assert!(config.ignore_internal_entities);
    assert!(config.report_folder.is_none());
    // All report types when none are named.
    assert_eq!(config.categories, MetricCategory::all());
    assert!(config.include.is_empty());
}

#[test]
fn test_blank_credentials_disable_authentication() {
    let config = Config::from_toml_str(
        r#"
[[engine]]
name = "BE"
host = "localhost"
port = 5555
username = "admin"
password = ""
"#,
    )
    .unwrap();
    assert!(config.engines[0].credentials.is_none());
}

#[test]
fn test_duplicate_engines_deduplicated() {
    let config = Config::from_toml_str(
        r#"
[[engine]]
name = "BE-a"
host = "host1"
port = 5555

[[engine]]
name = "BE-b"
host = "host1"
port = 5555
"#,
    )
    .unwrap();
    assert_eq!(config.engines.len(), 1);
    assert_eq!(config.engines[0].name, "BE-a");
}

#[test]
fn test_rejects_unknown_report_type() {
    let result = Config::from_toml_str(
        r#"
reports = ["Channels"]

[[engine]]
name = "BE"
host = "localhost"
port = 5555
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_rejects_empty_reports_list() {
    let result = Config::from_toml_str(
        r#"
reports = []

[[engine]]
name = "BE"
host = "localhost"
port = 5555
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_rejects_missing_engines() {
    assert!(Config::from_toml_str("interval = 60").is_err());
}

#[test]
fn test_rejects_engine_without_address() {
    let result = Config::from_toml_str(
        r#"
[[engine]]
name = "BE"
host = "localhost"
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_rejects_unknown_include_key() {
    let result = Config::from_toml_str(
        r#"
[[engine]]
name = "BE"
host = "localhost"
port = 5555

[include]
Channels = [".*"]
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_rejects_zero_interval() {
    let result = Config::from_toml_str(
        r#"
interval = 0

[[engine]]
name = "BE"
host = "localhost"
port = 5555
"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_empty_include_patterns_dropped() {
    let config = Config::from_toml_str(
        r#"
[[engine]]
name = "BE"
host = "localhost"
port = 5555

[include]
EntityCache = ["", "  "]
"#,
    )
    .unwrap();
    // Only blank patterns were configured, so the set collapses to
    // "include everything".
    assert!(config.include.is_empty());
}
