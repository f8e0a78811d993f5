// src/core/chain.rs

//! Chain assembly and validation.

use crate::{
    constants::{PATH_SEPARATOR, ROOT_SENTINEL},
    core::{
        flag_parser::{ParsedArgs, merge_schemas},
        registry::{CommandNode, Registry},
    },
    error::DispatchError,
    models::{FlagSchema, FlagValues},
};
use std::sync::Arc;

/// Expands a matched dotted path into its root → leaf chain of commands.
pub fn assemble_chain(path: &str, registry: &Registry) -> Vec<Arc<CommandNode>> {
    if path == ROOT_SENTINEL {
        return registry.root().into_iter().cloned().collect();
    }

    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    let mut chain: Vec<Arc<CommandNode>> = (1..=segments.len())
        .rev()
        .filter_map(|len| segments.get(..len))
        .filter_map(|prefix| registry.get(&prefix.join(PATH_SEPARATOR)))
        .cloned()
        .collect();

    if let Some(root) = registry.root() {
        chain.push(Arc::clone(root));
    }
    chain.reverse();
    chain
}

/// Global schema overlaid with every command's own flags, root → leaf.
pub fn chain_schema(global_flags: &FlagSchema, chain: &[Arc<CommandNode>]) -> FlagSchema {
    chain
        .iter()
        .fold(global_flags.clone(), |acc, node| merge_schemas(&acc, &node.flags))
}

/// Dotted path of the non-root part of `chain`.
pub fn chain_path(chain: &[Arc<CommandNode>]) -> String {
    chain
        .iter()
        .filter(|node| !node.is_root())
        .map(|node| node.name.as_str())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

/// Checks a resolved chain against the arguments it was resolved from.
///
/// Fail-fast, in order: the chain must name at least one command, its names
/// must equal the positional arguments, and every required flag of `schema`
/// must have a value.
pub fn validate_chain(
    schema: &FlagSchema,
    parsed: &ParsedArgs,
    chain: &[Arc<CommandNode>],
) -> Result<(), DispatchError> {
    if chain.iter().all(|node| node.is_root()) {
        return Err(DispatchError::CommandNotConfigured);
    }

    let path = chain_path(chain);
    if path != parsed.positional.join(PATH_SEPARATOR) {
        let name = if parsed.positional.is_empty() {
            path
        } else {
            parsed.positional.join(" ")
        };
        return Err(DispatchError::CommandNotFound { name });
    }

    check_required_flags(&path, schema, &parsed.flags)
}

/// Fails on the first required flag of `schema` without a value.
pub fn check_required_flags(
    command: &str,
    schema: &FlagSchema,
    flags: &FlagValues,
) -> Result<(), DispatchError> {
    let missing = schema
        .iter()
        .filter(|(_, def)| def.required)
        .find(|(name, _)| flags.get(*name).is_none_or(|value| value.is_null()));

    match missing {
        Some((flag, _)) => Err(DispatchError::CommandFlagNotProvided {
            command: command.to_string(),
            flag: flag.clone(),
        }),
        None => Ok(()),
    }
}
