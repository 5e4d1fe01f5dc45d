//! Configuration validation
//!
//! This module checks the shape of every entry before interpolation runs, so
//! later stages can rely on reserved fields having the expected kind.

use crate::config::types::{
    is_task_entry, Config, Section, Value, AFTER, COMMAND, ENVIRON, NAME, PARAMS, PROGRAM,
};
use crate::error::{ConfigError, ConfigResult};

/// Characters that may not appear in an entry id
const FORBIDDEN_ID_CHARS: &[char] = &[':', '$', '{', '}'];

/// Validate a complete configuration
pub fn validate_config(config: &Config) -> ConfigResult<()> {
    for (id, value) in config.entries.iter() {
        validate_id(id)?;

        let fields = value
            .as_map()
            .ok_or_else(|| ConfigError::NotAMapping(id.to_string()))?;

        if is_task_entry(fields) {
            validate_task(id, fields)?;
        }
    }

    Ok(())
}

/// Validate an entry id
pub fn validate_id(id: &str) -> ConfigResult<()> {
    if id.is_empty()
        || id.contains(FORBIDDEN_ID_CHARS)
        || id.chars().any(char::is_whitespace)
    {
        return Err(ConfigError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Validate the reserved fields of a single task
pub fn validate_task(id: &str, fields: &Section) -> ConfigResult<()> {
    for field in [COMMAND, PROGRAM] {
        if let Some(value) = fields.get(field) {
            match value {
                Value::Scalar(s) if !s.trim().is_empty() => {}
                Value::Scalar(_) => return Err(invalid(id, field, "must not be empty")),
                other => return Err(invalid(id, field, &expected("a scalar", other))),
            }
        }
    }

    if let Some(value) = fields.get(NAME) {
        if !matches!(value, Value::Scalar(_) | Value::Null) {
            return Err(invalid(id, NAME, &expected("a scalar", value)));
        }
    }

    if let Some(value) = fields.get(AFTER) {
        if !matches!(value, Value::Scalar(_) | Value::List(_) | Value::Null) {
            return Err(invalid(id, AFTER, &expected("a task id or a list of task ids", value)));
        }
    }

    if let Some(value) = fields.get(PARAMS) {
        let params = as_optional_map(id, PARAMS, value)?;
        for (flag, value) in params.iter().flat_map(|p| p.iter()) {
            if let Value::Map(_) = value {
                return Err(invalid(
                    id,
                    &format!("{}.{}", PARAMS, flag),
                    "must be a scalar, a list or null",
                ));
            }
        }
    }

    if let Some(value) = fields.get(ENVIRON) {
        let environ = as_optional_map(id, ENVIRON, value)?;
        for (name, value) in environ.iter().flat_map(|e| e.iter()) {
            if !matches!(value, Value::Scalar(_) | Value::List(_)) {
                return Err(invalid(
                    id,
                    &format!("{}.{}", ENVIRON, name),
                    "must be a scalar or a list",
                ));
            }
        }
    }

    Ok(())
}

fn as_optional_map<'a>(
    id: &str,
    field: &str,
    value: &'a Value,
) -> ConfigResult<Option<&'a Section>> {
    match value {
        Value::Map(section) => Ok(Some(section)),
        Value::Null => Ok(None),
        other => Err(invalid(id, field, &expected("a mapping", other))),
    }
}

fn expected(what: &str, got: &Value) -> String {
    format!("must be {}, found a {}", what, got.kind())
}

fn invalid(entry: &str, field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        entry: entry.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, Format};

    fn validate_yaml(yaml: &str) -> ConfigResult<()> {
        let config = parse_config(yaml, Format::Yaml).unwrap();
        validate_config(&config)
    }

    #[test]
    fn test_validate_valid_config() {
        let yaml = r#"
defaults:
  threads: 4
hello:
  name: Hello world example
  program: hello.py
  params:
    -x: [1, 11]
    --verbose:
  environ:
    OMP_NUM_THREADS: ${defaults:threads}
  after: []
"#;
        assert!(validate_yaml(yaml).is_ok());
    }

    #[test]
    fn test_entry_must_be_mapping() {
        let result = validate_yaml("hello: just a string\n");
        assert!(matches!(result, Err(ConfigError::NotAMapping(id)) if id == "hello"));
    }

    #[test]
    fn test_invalid_entry_ids() {
        for id in ["a:b", "a b", "$a", "{a}", ""] {
            assert!(validate_id(id).is_err(), "accepted id {:?}", id);
        }
        assert!(validate_id("task_1-a.b").is_ok());
    }

    #[test]
    fn test_command_must_be_scalar() {
        let result = validate_yaml("t:\n  command: [a, b]\n");
        assert!(matches!(result, Err(ConfigError::InvalidField { field, .. }) if field == "command"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let result = validate_yaml("t:\n  command: \"  \"\n");
        assert!(matches!(result, Err(ConfigError::InvalidField { .. })));
    }

    #[test]
    fn test_params_must_be_mapping() {
        let result = validate_yaml("t:\n  command: run\n  params: [1, 2]\n");
        assert!(matches!(result, Err(ConfigError::InvalidField { field, .. }) if field == "params"));
    }

    #[test]
    fn test_nested_param_mapping_rejected() {
        let result = validate_yaml("t:\n  command: run\n  params:\n    --x:\n      a: 1\n");
        assert!(matches!(result, Err(ConfigError::InvalidField { field, .. }) if field == "params.--x"));
    }

    #[test]
    fn test_environ_values_must_not_be_null() {
        let result = validate_yaml("t:\n  command: run\n  environ:\n    HOME:\n");
        assert!(matches!(result, Err(ConfigError::InvalidField { .. })));
    }

    #[test]
    fn test_sections_are_not_checked_as_tasks() {
        let yaml = r#"
paths:
  params: not-a-mapping-but-this-is-a-section
"#;
        assert!(validate_yaml(yaml).is_ok());
    }
}
