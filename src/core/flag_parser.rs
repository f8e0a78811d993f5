// src/core/flag_parser.rs

//! Flag grammar and schema helpers.

use crate::{
    constants::EOF_MARKER,
    error::DispatchError,
    models::{FlagDef, FlagKind, FlagSchema, FlagValues},
};
use serde_json::Value;
use std::fmt;

/// Result of running a flag parser over an argument vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    /// Tokens that are neither flags nor flag values.
    pub positional: Vec<String>,
    /// Tokens after `--`, untouched.
    pub eof_args: Vec<String>,
    /// Declared flags, defaults applied.
    pub flags: FlagValues,
    /// Flags absent from the schema.
    pub unknown_flags: FlagValues,
}

/// Turns an argument vector plus a flag schema into positional arguments,
/// typed flag values and unknown flags.
pub trait FlagParser: Send + Sync + fmt::Debug {
    /// Parses `argv` against `schema`, applying declared defaults.
    fn parse(&self, schema: &FlagSchema, argv: &[String]) -> Result<ParsedArgs, DispatchError>;
}

/// The default token grammar.
///
/// - `--name value`, `--name=value`, `-a value` (alias), `--kebab-name` for a
///   camelCase declared `kebabName`.
/// - Boolean flags never consume the next token. A valued flag followed by
///   `--` or another flag has no value and is rejected.
/// - Undeclared flags are collected as unknown and never consume the next token.
/// - Everything after `--` is passed through as `eof_args`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenFlagParser;

impl FlagParser for TokenFlagParser {
    fn parse(&self, schema: &FlagSchema, argv: &[String]) -> Result<ParsedArgs, DispatchError> {
        let mut parsed = ParsedArgs::default();
        let mut tokens = argv.iter().peekable();

        while let Some(token) = tokens.next() {
            if token == EOF_MARKER {
                parsed.eof_args.extend(tokens.by_ref().cloned());
                break;
            }

            let Some(flag) = split_flag_token(token) else {
                // It's a positional argument.
                parsed.positional.push(token.clone());
                continue;
            };

            match lookup_flag(schema, &flag) {
                Some((name, def)) => {
                    let raw = match flag.inline_value {
                        Some(value) => Some(value.to_string()),
                        // `--` and other flags are never taken as a value.
                        None if def.kind.takes_value() => tokens
                            .next_if(|next| {
                                *next != EOF_MARKER && split_flag_token(next).is_none()
                            })
                            .cloned(),
                        None => None,
                    };
                    let value = def.parse_value(name, raw.as_deref())?;
                    insert_flag(&mut parsed.flags, name, def, value);
                }
                None => {
                    let value = flag
                        .inline_value
                        .map_or(Value::Bool(true), |v| Value::String(v.to_string()));
                    parsed.unknown_flags.insert(flag.name.to_string(), value);
                }
            }
        }

        for (name, def) in schema {
            if parsed.flags.contains_key(name) {
                continue;
            }
            if let Some(default) = &def.default {
                parsed.flags.insert(name.clone(), default.clone());
            }
        }

        log::trace!(
            "Parsed {:?} -> positional={:?} flags={:?}",
            argv,
            parsed.positional,
            parsed.flags
        );
        Ok(parsed)
    }
}

/// `base` overlaid with `overlay`; on a name clash the overlay wins.
pub fn merge_schemas(base: &FlagSchema, overlay: &FlagSchema) -> FlagSchema {
    let mut merged = base.clone();
    merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Keeps only the values whose names are declared in one of `schemas`.
pub fn filter_flags(flags: &FlagValues, schemas: &[&FlagSchema]) -> FlagValues {
    flags
        .iter()
        .filter(|(name, _)| schemas.iter().any(|schema| schema.contains_key(*name)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Debug)]
struct FlagToken<'a> {
    name: &'a str,
    short: bool,
    inline_value: Option<&'a str>,
}

/// Splits `--name=value` / `-n` style tokens. Returns `None` for positional
/// tokens, including `-` alone and negative numbers.
fn split_flag_token(token: &str) -> Option<FlagToken<'_>> {
    let (body, short) = if let Some(long) = token.strip_prefix("--") {
        (long, false)
    } else if let Some(short) = token.strip_prefix('-') {
        if short.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        (short, true)
    } else {
        return None;
    };

    if body.is_empty() {
        return None;
    }

    let (name, inline_value) = match body.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (body, None),
    };
    Some(FlagToken {
        name,
        short,
        inline_value,
    })
}

fn lookup_flag<'s>(schema: &'s FlagSchema, flag: &FlagToken<'_>) -> Option<(&'s str, &'s FlagDef)> {
    let by_alias = || {
        schema
            .iter()
            .find(|(_, def)| def.alias.as_deref() == Some(flag.name))
    };
    let by_name = || {
        schema
            .get_key_value(flag.name)
            .or_else(|| schema.get_key_value(kebab_to_camel(flag.name).as_str()))
    };

    let found = if flag.short {
        by_alias().or_else(by_name)
    } else {
        by_name().or_else(by_alias)
    };
    found.map(|(name, def)| (name.as_str(), def))
}

fn insert_flag(flags: &mut FlagValues, name: &str, def: &FlagDef, value: Value) {
    if def.kind != FlagKind::List {
        flags.insert(name.to_string(), value);
        return;
    }
    match flags.get_mut(name) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            flags.insert(name.to_string(), Value::Array(vec![value]));
        }
    }
}

/// `project-cwd` -> `projectCwd`.
fn kebab_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
