//! Variable interpolation for strings
//!
//! This module resolves `${key}` and `${section:key}` references against the
//! two-level store formed by the configuration entries.
//!
//! Syntax:
//! - `${key}` - key from the current scope
//! - `${section:key}` - key from another entry
//! - `$$` - a literal `$`
//!
//! Any other use of `$` is a syntax error. Referenced values that contain `$`
//! are resolved recursively in the scope they were found in, up to
//! [`MAX_DEPTH`] levels. A key that reappears in its own resolution chain is
//! reported as a cycle.

use crate::config::{Config, Section, Value};
use crate::error::{InterpolationError, InterpolationResult};
use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

/// Maximum nesting of recursive resolution
pub const MAX_DEPTH: usize = 10;

fn key_regex() -> &'static Regex {
    static KEY_RE: OnceLock<Regex> = OnceLock::new();
    KEY_RE.get_or_init(|| Regex::new(r"^\$\{([^}]+)\}").expect("static pattern is valid"))
}

fn any_key_regex() -> &'static Regex {
    static ANY_KEY_RE: OnceLock<Regex> = OnceLock::new();
    ANY_KEY_RE.get_or_init(|| Regex::new(r"\$\{[^}]+\}").expect("static pattern is valid"))
}

/// Global lookup: section name -> section fields
pub trait Store {
    fn section(&self, name: &str) -> Option<&Section>;
}

impl Store for Config {
    fn section(&self, name: &str) -> Option<&Section> {
        self.entry(name)
    }
}

/// Resolver over a store, with a configurable depth bound
pub struct Resolver<'a, S: Store + ?Sized> {
    store: &'a S,
    max_depth: usize,
}

impl<'a, S: Store + ?Sized> Resolver<'a, S> {
    /// Create a resolver with the default depth bound
    pub fn new(store: &'a S) -> Self {
        Resolver {
            store,
            max_depth: MAX_DEPTH,
        }
    }

    /// Set the depth bound
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve a raw string belonging to `option` of `section`
    ///
    /// `local` is the key/value map consulted by single-part references.
    pub fn resolve(
        &self,
        raw: &str,
        section: &str,
        option: &str,
        local: &Section,
    ) -> InterpolationResult<String> {
        let mut out = String::with_capacity(raw.len());
        let mut chain = vec![(section.to_string(), option.to_string())];
        self.interpolate_some(&mut out, raw, section, option, local, &mut chain, 1)?;
        Ok(out)
    }

    /// Resolve every string inside a value
    ///
    /// Scalars that resolve to several lines become lists; list items that
    /// resolve to several lines are spliced in place. Blank lines are dropped.
    pub fn resolve_value(
        &self,
        value: &Value,
        section: &str,
        option: &str,
        local: &Section,
    ) -> InterpolationResult<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Scalar(raw) => {
                let resolved = self.resolve(raw, section, option, local)?;
                if resolved.contains('\n') {
                    Ok(Value::List(split_lines(&resolved)))
                } else {
                    Ok(Value::Scalar(resolved))
                }
            }
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for raw in items {
                    let resolved = self.resolve(raw, section, option, local)?;
                    if resolved.contains('\n') {
                        out.extend(split_lines(&resolved));
                    } else {
                        out.push(resolved);
                    }
                }
                Ok(Value::List(out))
            }
            Value::Map(nested) => {
                let mut out = Section::new();
                for (key, value) in nested.iter() {
                    let nested_option = format!("{}.{}", option, key);
                    out.insert(key, self.resolve_value(value, section, &nested_option, local)?);
                }
                Ok(Value::Map(out))
            }
        }
    }

    /// Resolve all fields of a section in its own scope
    pub fn resolve_section(&self, name: &str, fields: &Section) -> InterpolationResult<Section> {
        let mut out = Section::new();
        for (key, value) in fields.iter() {
            out.insert(key, self.resolve_value(value, name, key, fields)?);
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn interpolate_some(
        &self,
        out: &mut String,
        raw: &str,
        section: &str,
        option: &str,
        local: &Section,
        chain: &mut Vec<(String, String)>,
        depth: usize,
    ) -> InterpolationResult<()> {
        if depth > self.max_depth {
            return Err(InterpolationError::InterpolationDepthExceeded {
                section: section.to_string(),
                option: option.to_string(),
                max: self.max_depth,
            });
        }

        let mut rest = raw;
        while !rest.is_empty() {
            match rest.find('$') {
                None => {
                    out.push_str(rest);
                    return Ok(());
                }
                Some(p) => {
                    out.push_str(&rest[..p]);
                    rest = &rest[p..];
                }
            }

            match rest[1..].chars().next() {
                Some('$') => {
                    out.push('$');
                    rest = &rest[2..];
                }
                Some('{') => {
                    let caps = key_regex().captures(rest).ok_or_else(|| {
                        syntax_error(
                            section,
                            option,
                            format!("bad interpolation variable reference '{}'", rest),
                        )
                    })?;
                    let reference = &caps[1];
                    let end = caps.get(0).map(|m| m.end()).unwrap_or(rest.len());

                    let path: Vec<&str> = reference.split(':').collect();
                    let (ref_section, ref_key, ref_local) = match path.as_slice() {
                        [key] => (section, *key, local),
                        [name, key] => {
                            let fields = self
                                .store
                                .section(name)
                                .ok_or_else(|| missing(section, option, reference))?;
                            (*name, *key, fields)
                        }
                        _ => {
                            return Err(syntax_error(
                                section,
                                option,
                                format!("more than one ':' found in '${{{}}}'", reference),
                            ))
                        }
                    };

                    let text = ref_local
                        .get(ref_key)
                        .and_then(Value::as_text)
                        .ok_or_else(|| missing(section, option, reference))?;

                    if text.contains('$') {
                        if chain.iter().any(|(s, k)| s == ref_section && k == ref_key) {
                            let mut names: Vec<String> =
                                chain.iter().map(|(s, k)| format!("{}:{}", s, k)).collect();
                            names.push(format!("{}:{}", ref_section, ref_key));
                            return Err(InterpolationError::CyclicReference {
                                section: section.to_string(),
                                option: option.to_string(),
                                chain: names.join(" -> "),
                            });
                        }

                        trace!(section = ref_section, key = ref_key, depth, "descending into reference");
                        chain.push((ref_section.to_string(), ref_key.to_string()));
                        self.interpolate_some(
                            out,
                            &text,
                            ref_section,
                            ref_key,
                            ref_local,
                            chain,
                            depth + 1,
                        )?;
                        chain.pop();
                    } else {
                        out.push_str(&text);
                    }

                    rest = &rest[end..];
                }
                _ => {
                    return Err(syntax_error(
                        section,
                        option,
                        format!("'$' must be followed by '$' or '{{', found: '{}'", rest),
                    ))
                }
            }
        }

        Ok(())
    }
}

/// Resolve `raw` for `option` of `section`, consulting `local` for
/// single-part references and `global` for `section:key` references
pub fn resolve<S: Store + ?Sized>(
    raw: &str,
    section: &str,
    option: &str,
    local: &Section,
    global: &S,
) -> InterpolationResult<String> {
    Resolver::new(global).resolve(raw, section, option, local)
}

/// Check the syntax of a raw value without resolving it
pub fn check_syntax(raw: &str, section: &str, option: &str) -> InterpolationResult<()> {
    let stripped = raw.replace("$$", "");
    let stripped = any_key_regex().replace_all(&stripped, "");
    if let Some(pos) = stripped.find('$') {
        return Err(syntax_error(
            section,
            option,
            format!("stray '$' in '{}' at position {}", raw, pos),
        ));
    }
    Ok(())
}

/// Check the syntax of every string inside a value
pub fn check_value_syntax(value: &Value, section: &str, option: &str) -> InterpolationResult<()> {
    match value {
        Value::Null => Ok(()),
        Value::Scalar(raw) => check_syntax(raw, section, option),
        Value::List(items) => items
            .iter()
            .try_for_each(|raw| check_syntax(raw, section, option)),
        Value::Map(nested) => nested
            .iter()
            .try_for_each(|(key, value)| check_value_syntax(value, section, &format!("{}.{}", option, key))),
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn syntax_error(section: &str, option: &str, reason: String) -> InterpolationError {
    InterpolationError::InvalidSyntax {
        section: section.to_string(),
        option: option.to_string(),
        reason,
    }
}

fn missing(section: &str, option: &str, reference: &str) -> InterpolationError {
    InterpolationError::MissingReference {
        section: section.to_string(),
        option: option.to_string(),
        reference: reference.to_string(),
    }
}
