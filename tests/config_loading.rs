//! Integration tests for configuration loading

mod common;

use common::{create_test_config, create_test_config_in_subdir, write_file};
use psweep::config::{
    find_config_file_from, load_launchers, parse_config, parse_config_file, validate_config,
    Format, Value, PARAMS,
};
use psweep::error::{ConfigError, SweepError};

const SWEEP: &str = r#"
paths:
  scripts: models
  runs: [1, 2, 3]

hello:
  name: Hello world example
  program: ${paths:scripts}/hello.py
  params:
    -x: [1, 11]
    --seed: ${paths:runs}
    --fast:

report:
  command: echo done
  after: hello
"#;

#[test]
fn test_parse_config_file() {
    let (_dir, path) = create_test_config(SWEEP);
    let config = parse_config_file(&path).unwrap();
    validate_config(&config).unwrap();

    assert_eq!(config.ids().collect::<Vec<_>>(), vec!["paths", "hello", "report"]);
    assert_eq!(config.task_ids(), vec!["hello", "report"]);

    let params = config.entry("hello").unwrap().get(PARAMS).unwrap().as_map().unwrap();
    assert_eq!(params.keys().collect::<Vec<_>>(), vec!["-x", "--seed", "--fast"]);
    assert_eq!(params.get("--fast"), Some(&Value::Null));
}

#[test]
fn test_json_config_matches_yaml() {
    let json = r#"{
        "paths": {"scripts": "models", "runs": [1, 2, 3]},
        "hello": {
            "name": "Hello world example",
            "program": "${paths:scripts}/hello.py",
            "params": {"-x": [1, 11], "--seed": "${paths:runs}", "--fast": null}
        },
        "report": {"command": "echo done", "after": "hello"}
    }"#;
    let (dir, _) = create_test_config("");
    let path = write_file(dir.path(), "sweep.json", json);

    let from_json = parse_config_file(&path).unwrap();
    let from_yaml = parse_config(SWEEP, Format::Yaml).unwrap();
    assert_eq!(from_json, from_yaml);
}

#[test]
fn test_find_config_from_subdir() {
    let (_dir, config_path, sub_dir) = create_test_config_in_subdir(SWEEP);
    let found = find_config_file_from(sub_dir).unwrap();
    assert_eq!(found, config_path);
}

#[test]
fn test_missing_config_file() {
    let (dir, _) = create_test_config("");
    let result = parse_config_file(&dir.path().join("nope.yml"));
    assert!(matches!(result, Err(SweepError::Config(ConfigError::Invalid(_)))));
}

#[test]
fn test_unsupported_format() {
    let (dir, _) = create_test_config("");
    let path = write_file(dir.path(), "sweep.ini", "[hello]\nprogram = hello.py\n");
    assert!(matches!(
        parse_config_file(&path),
        Err(SweepError::Config(ConfigError::UnsupportedFormat(_)))
    ));
}

#[test]
fn test_invalid_yaml() {
    let result = parse_config("hello: [unclosed", Format::Yaml);
    assert!(matches!(result, Err(SweepError::Yaml(_))));
}

#[test]
fn test_validation_errors() {
    let cases = [
        ("hello: just a string\n", "not a mapping"),
        ("bad id:\n  command: x\n", "invalid id"),
        ("t:\n  command: x\n  params: [1, 2]\n", "params not a mapping"),
        ("t:\n  command: x\n  params:\n    -a:\n      nested: 1\n", "nested param"),
        ("t:\n  command: x\n  after:\n    a: b\n", "after mapping"),
        ("t:\n  command: ''\n", "empty command"),
        ("t:\n  command: x\n  environ: VAR\n", "environ not a mapping"),
    ];

    for (yaml, label) in cases {
        let config = parse_config(yaml, Format::Yaml).unwrap();
        assert!(validate_config(&config).is_err(), "{} should be rejected", label);
    }
}

#[test]
fn test_sections_may_hold_anything() {
    let yaml = r#"
constants:
  matrix:
    rows: 3
  list: [a, b]
  empty:
"#;
    let config = parse_config(yaml, Format::Yaml).unwrap();
    validate_config(&config).unwrap();
    assert!(config.task_ids().is_empty());
}

#[test]
fn test_launcher_settings_next_to_config() {
    let (dir, _) = create_test_config(SWEEP);
    write_file(
        dir.path(),
        "psweep-settings.yml",
        "launchers:\n  py: python3 %\n  R: Rscript %.R\n",
    );

    let launchers = load_launchers(None, Some(dir.path())).unwrap();
    assert_eq!(launchers.get("py"), Some("python3 %"));
    assert_eq!(launchers.get("r"), Some("Rscript %.R"));
    assert_eq!(launchers.get("sh"), Some("sh %.sh"));
}
