// src/core/resolver.rs

//! Matching an argument vector to a registered command.

use crate::{
    constants::{PATH_SEPARATOR, ROOT_SENTINEL},
    core::{
        flag_parser::{FlagParser, merge_schemas},
        registry::{CommandNode, Registry},
    },
    error::DispatchError,
    models::FlagSchema,
};
use std::sync::Arc;

/// The command an argument vector names, and the path it was found under.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The matched command.
    pub node: Arc<CommandNode>,
    /// Its dotted path, or the root sentinel.
    pub path: String,
}

impl Resolution {
    /// The match is the root fallback.
    pub fn is_root(&self) -> bool {
        self.path == ROOT_SENTINEL
    }
}

/// Finds the command named by `argv`.
///
/// Flags are scoped per command, so positional arguments are extracted once
/// per candidate with that candidate's own schema over the global one. The
/// first candidate (in registry order) whose positional arguments spell its
/// dotted path wins.
///
/// Returns `Ok(None)` for a flags-only invocation with nothing to run.
pub fn resolve_command(
    registry: &Registry,
    global_flags: &FlagSchema,
    parser: &dyn FlagParser,
    argv: &[String],
) -> Result<Option<Resolution>, DispatchError> {
    let mut last_attempt: Vec<String> = Vec::new();
    let mut first_failure: Option<DispatchError> = None;

    for (path, node) in registry.commands() {
        let schema = merge_schemas(global_flags, &node.flags);
        let parsed = match parser.parse(&schema, argv) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::trace!("Candidate '{}' rejected the flags: {}", path, err);
                first_failure.get_or_insert(err);
                continue;
            }
        };

        let attempted = parsed.positional.join(PATH_SEPARATOR);
        if attempted == path {
            log::debug!("Resolved {:?} to command '{}'", argv, path);
            return Ok(Some(Resolution {
                node: Arc::clone(node),
                path: path.to_string(),
            }));
        }
        if !parsed.positional.is_empty() {
            last_attempt = parsed.positional;
        }
    }

    if let Some(err) = first_failure {
        return Err(err);
    }
    if !last_attempt.is_empty() {
        return Err(DispatchError::CommandNotFound {
            name: last_attempt.join(" "),
        });
    }

    // No command matched and no candidate saw positional arguments. Parse once
    // with the root's schema so a tree without commands still rejects them.
    let Some(root) = registry.root() else {
        return Ok(None);
    };
    let parsed = parser.parse(&merge_schemas(global_flags, &root.flags), argv)?;
    if !parsed.positional.is_empty() {
        return Err(DispatchError::CommandNotFound {
            name: parsed.positional.join(" "),
        });
    }
    if root.process.is_some() {
        log::debug!("No command named; falling back to the root process");
        return Ok(Some(Resolution {
            node: Arc::clone(root),
            path: ROOT_SENTINEL.to_string(),
        }));
    }

    log::debug!("No command named by {:?}; nothing to run", argv);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            flag_parser::TokenFlagParser,
            registry::{CommandTree, build_registry},
        },
        error::ErrorKind,
        models::{Command, FlagDef},
    };

    fn to_argv(params: &[&str]) -> Vec<String> {
        params.iter().map(|s| s.to_string()).collect()
    }

    fn registry_for(root: Command) -> Registry {
        build_registry(&CommandTree::from_root(root)).unwrap()
    }

    fn sample_root() -> Command {
        Command::root()
            .subcommand(
                Command::new("build")
                    .flag("projectCwd", FlagDef::string())
                    .subcommand(
                        Command::new("evolve")
                            .flag("compiler", FlagDef::string())
                            .subcommand(Command::new("mini")),
                    ),
            )
            .subcommand(Command::new("info"))
    }

    fn resolve(registry: &Registry, argv: &[&str]) -> Result<Option<Resolution>, DispatchError> {
        let global = FlagSchema::from([("verbose".to_string(), FlagDef::boolean())]);
        resolve_command(registry, &global, &TokenFlagParser, &to_argv(argv))
    }

    #[test]
    fn test_resolves_nested_path() {
        let registry = registry_for(sample_root());
        let resolution = resolve(&registry, &["build", "evolve", "mini", "--verbose"])
            .unwrap()
            .unwrap();
        assert_eq!(resolution.path, "build.evolve.mini");
        assert_eq!(resolution.node.name, "mini");
    }

    #[test]
    fn test_own_flags_value_is_not_a_positional() {
        let registry = registry_for(sample_root());
        let resolution = resolve(&registry, &["build", "--projectCwd", "evolve"])
            .unwrap()
            .unwrap();
        // `evolve` is the value of build's own flag, not a sub-command.
        assert_eq!(resolution.path, "build");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let registry = registry_for(sample_root());
        let argv = ["build", "evolve", "--compiler", "swc"];
        let first = resolve(&registry, &argv).unwrap().unwrap().path;
        for _ in 0..5 {
            assert_eq!(resolve(&registry, &argv).unwrap().unwrap().path, first);
        }
        assert_eq!(first, "build.evolve");
    }

    #[test]
    fn test_unknown_command_is_not_found() {
        let registry = registry_for(sample_root());
        let err = resolve(&registry, &["nonexistent"]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::CommandNotFound { ref name } if name == "nonexistent"
        ));
    }

    #[test]
    fn test_unknown_command_in_tree_without_commands() {
        let registry = registry_for(Command::root().process(|_| async { Ok(()) }));
        let err = resolve(&registry, &["nonexistent"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandNotFound);
    }

    #[test]
    fn test_flags_only_invocation() {
        let registry = registry_for(sample_root());
        assert!(resolve(&registry, &["--verbose"]).unwrap().is_none());
        assert!(resolve(&registry, &[]).unwrap().is_none());
    }

    #[test]
    fn test_root_fallback_requires_a_process() {
        let registry = registry_for(sample_root().process(|_| async { Ok(()) }));
        let resolution = resolve(&registry, &["--verbose"]).unwrap().unwrap();
        assert!(resolution.is_root());
        assert!(resolution.node.is_root());
    }

    #[test]
    fn test_invalid_flag_value_is_surfaced_when_nothing_matches() {
        let registry = registry_for(
            Command::root()
                .subcommand(Command::new("deploy").flag("env", FlagDef::choice(["dev", "prod"]))),
        );
        let err = resolve(&registry, &["deploy", "--env", "qa"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandInvalidFlagsValue);
    }
}
