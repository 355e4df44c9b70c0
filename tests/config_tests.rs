use assert_fs::prelude::*;
use assert_fs::TempDir;
use fox::config::{
    validate_config, validate_for_start, Config, ControllerKind, Environment, ExecMode,
    ServerConfig,
};
use fox::error::{Error, Result};

#[test]
fn test_parse_config() -> Result<()> {
    let config_str = r#"{
        "server": {
            "controller": "pm2",
            "path": "/srv/shop/server.js",
            "env": "production",
            "name": "shop",
            "instances": 4,
            "execMode": "fork",
            "vars": { "PORT": "9000" }
        },
        "install": {
            "hostUri": "http://localhost:9000",
            "installKey": "secret",
            "maxAttempts": 5,
            "intervalMs": 100
        }
    }"#;

    let config = Config::parse_from_str(config_str)?;

    assert_eq!(config.server.controller_kind()?, ControllerKind::Pm2);
    assert_eq!(config.server.env, Environment::Production);
    assert_eq!(config.server.name, "shop");
    assert_eq!(config.server.instances, 4);
    assert_eq!(config.server.exec_mode, ExecMode::Fork);
    assert_eq!(config.server.vars.get("PORT"), Some(&"9000".to_string()));
    assert_eq!(config.install.host_uri, "http://localhost:9000");
    assert_eq!(config.install.install_key, "secret");
    assert_eq!(config.install.max_attempts, 5);
    assert_eq!(config.install.interval_ms, 100);

    Ok(())
}

#[test]
fn test_empty_config_uses_defaults() -> Result<()> {
    let config = Config::parse_from_str("{}")?;

    assert_eq!(config.server.controller, "nodemon");
    assert_eq!(config.server.env, Environment::Local);
    assert_eq!(config.server.exec_mode, ExecMode::Cluster);
    assert!(!config.server.daemon);
    assert!(config.server.wait_for_ready);
    assert_eq!(config.install.host_uri, "http://localhost:8080");

    Ok(())
}

#[test]
fn test_parse_yaml() -> Result<()> {
    let config = Config::parse_from_yaml(
        r#"
server:
  controller: node
  env: development
  daemon: true
install:
  maxAttempts: 3
"#,
    )?;

    assert_eq!(config.server.controller, "node");
    assert_eq!(config.server.env, Environment::Development);
    // daemon forces pm2 whatever the configured controller
    assert_eq!(config.server.controller_kind()?, ControllerKind::Pm2);
    assert_eq!(config.install.max_attempts, 3);

    Ok(())
}

#[test]
fn test_invalid_json_is_parse_error() {
    let result = Config::parse_from_str(r#"{ "server": { "instances": "many" } }"#);
    assert!(matches!(result, Err(Error::ConfigParse(_))));
}

#[test]
fn test_from_file_resolves_relative_paths() -> Result<()> {
    let dir = TempDir::new().unwrap();
    dir.child("fox.json")
        .write_str(r#"{ "server": { "path": "app/server.js", "watch": ["lib"] } }"#)
        .unwrap();

    let config = Config::from_file(dir.child("fox.json").path())?;

    assert_eq!(config.server.path, dir.path().join("app/server.js"));
    assert_eq!(config.server.project_dir(), dir.path().join("app"));
    assert_eq!(config.server.config_dir(), dir.path().join("app/config"));
    assert_eq!(config.server.watch, vec![dir.path().join("lib")]);
    // Entry point one level down, config file at the root
    assert_eq!(config.server.source, Some(dir.path().join("fox.json")));
    assert_eq!(config.server.base_dir(), dir.path());

    Ok(())
}

#[test]
fn test_discover_order() -> Result<()> {
    let dir = TempDir::new().unwrap();

    // Nothing on disk: defaults, resolved against the directory
    let config = Config::discover(None, dir.path())?;
    assert_eq!(config.server.path, dir.path().join("server.js"));
    assert_eq!(config.server.source, None);
    assert_eq!(config.server.base_dir(), dir.path());

    dir.child("fox.yaml")
        .write_str("server:\n  name: from-yaml\n")
        .unwrap();
    assert_eq!(Config::discover(None, dir.path())?.server.name, "from-yaml");

    dir.child("fox.json")
        .write_str(r#"{ "server": { "name": "from-json" } }"#)
        .unwrap();
    assert_eq!(Config::discover(None, dir.path())?.server.name, "from-json");

    dir.child("custom.json")
        .write_str(r#"{ "server": { "name": "explicit" } }"#)
        .unwrap();
    let explicit = dir.child("custom.json");
    assert_eq!(
        Config::discover(Some(explicit.path()), dir.path())?.server.name,
        "explicit"
    );

    Ok(())
}

#[test]
fn test_missing_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let result = Config::from_file(dir.path().join("nope.json"));
    assert!(matches!(result, Err(Error::ConfigParse(_))));
}

#[test]
fn test_validate_config() -> Result<()> {
    let mut config = Config::default();
    validate_config(&config)?;

    config.server.instances = 0;
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    config.server.instances = 1;
    config.server.name = "  ".to_string();
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    config.server.name = "shop".to_string();
    config.install.max_attempts = 0;
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    Ok(())
}

#[test]
fn test_unknown_controller_passes_validation() -> Result<()> {
    let config = Config {
        server: ServerConfig {
            controller: "forever".to_string(),
            ..ServerConfig::default()
        },
        ..Config::default()
    };

    validate_config(&config)?;
    assert!(matches!(
        config.server.controller_kind(),
        Err(Error::UnknownController(_))
    ));

    Ok(())
}

#[test]
fn test_validate_for_start_requires_entry_point() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let mut server = ServerConfig {
        path: dir.path().join("server.js"),
        ..ServerConfig::default()
    };

    assert!(matches!(
        validate_for_start(&server),
        Err(Error::ConfigValidation(_))
    ));

    dir.child("server.js").write_str("// entry").unwrap();
    validate_for_start(&server)?;

    server.path = Default::default();
    assert!(matches!(
        validate_for_start(&server),
        Err(Error::ConfigValidation(_))
    ));

    Ok(())
}

#[test]
fn test_from_yml_file() -> Result<()> {
    use std::io::Write;

    let mut file = tempfile::Builder::new().suffix(".yml").tempfile()?;
    writeln!(file, "server:\n  controller: pm2\n  execMode: fork\n  instances: 2")?;

    let config = Config::from_file(file.path())?;

    assert_eq!(config.server.controller, "pm2");
    assert_eq!(config.server.exec_mode, ExecMode::Fork);
    assert_eq!(config.server.instances, 2);
    // Resolved next to the file
    assert_eq!(
        config.server.path,
        file.path().parent().unwrap().join("server.js")
    );

    Ok(())
}
