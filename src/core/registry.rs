// src/core/registry.rs

//! Flattening of a declared command tree into dotted-path lookups.

use crate::{
    constants::{PATH_SEPARATOR, ROOT_SENTINEL},
    error::{DispatchError, NameViolation},
    i18n::I18n,
    models::{Command, CommandInfo, ConfigFile, ContextSource, FlagSchema, Message, ProcessFn},
};
use lazy_static::lazy_static;
use regex::Regex;
use std::{collections::HashMap, fmt, sync::Arc};

lazy_static! {
    static ref REPEATED_WHITESPACE_RE: Regex = Regex::new(r"\s{2,}").expect("valid regex");
}

/// Index of a node in a [`CommandTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A flattened command. Children and parent are ids into the owning tree.
pub struct CommandNode {
    /// Position in the owning tree.
    pub id: NodeId,
    /// Declared name; the root sentinel for the root.
    pub name: String,
    /// Untranslated description.
    pub description: Option<Message>,
    /// Untranslated usage example.
    pub example: Option<Message>,
    /// Untranslated help text.
    pub help: Option<Message>,
    /// Flags this command declares itself.
    pub flags: FlagSchema,
    /// Sub-commands, in declaration order.
    pub children: Vec<NodeId>,
    /// Non-owning back-reference; `None` only for the root.
    pub parent: Option<NodeId>,
    /// Context handed to descendants when this command is intermediate.
    pub sub_context: Option<ContextSource>,
    /// Action run when this command is invoked.
    pub process: Option<ProcessFn>,
    /// Config marker declared on this command.
    pub config_file: Option<ConfigFile>,
}

impl CommandNode {
    /// The node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The node has at least one sub-command.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Translates the node's metadata. `path` is the dotted path the node was
    /// reached through (the root sentinel for the root).
    pub fn info(&self, path: &str, i18n: &I18n) -> CommandInfo {
        let (name, path) = if self.is_root() {
            (String::new(), String::new())
        } else {
            (self.name.clone(), path.to_string())
        };
        CommandInfo {
            name,
            path,
            description: self.description.as_ref().map(|m| m.resolve(i18n)),
            example: self.example.as_ref().map(|m| m.resolve(i18n)),
            help: self.help.as_ref().map(|m| m.resolve(i18n)),
        }
    }
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("children", &self.children)
            .field("parent", &self.parent)
            .field("has_process", &self.process.is_some())
            .finish_non_exhaustive()
    }
}

/// Arena holding every declared command. Node 0 is always the root.
#[derive(Debug)]
pub struct CommandTree {
    nodes: Vec<Arc<CommandNode>>,
}

impl CommandTree {
    /// Flattens a declaration tree, depth-first, treating `root` as the root
    /// whatever its name.
    pub fn from_root(root: Command) -> Self {
        let mut nodes = Vec::new();
        attach(&mut nodes, root, None);
        Self {
            nodes: nodes.into_iter().map(Arc::new).collect(),
        }
    }

    /// The first node.
    pub fn root(&self) -> Option<&Arc<CommandNode>> {
        self.nodes.first()
    }

    /// Node by id.
    pub fn get(&self, id: NodeId) -> Option<&Arc<CommandNode>> {
        self.nodes.get(id.0)
    }

    /// Follows the node's back-reference.
    pub fn parent_of(&self, node: &CommandNode) -> Option<&Arc<CommandNode>> {
        node.parent.and_then(|id| self.get(id))
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` only for a tree built from nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn attach(nodes: &mut Vec<CommandNode>, command: Command, parent: Option<NodeId>) -> NodeId {
    let id = NodeId(nodes.len());
    let Command {
        name,
        description,
        example,
        help,
        flags,
        sub_commands,
        sub_context,
        process,
        config_file,
    } = command;

    nodes.push(CommandNode {
        id,
        name: if parent.is_none() {
            ROOT_SENTINEL.to_string()
        } else {
            name
        },
        description,
        example,
        help,
        flags,
        children: Vec::new(),
        parent,
        sub_context,
        process,
        config_file,
    });

    let children: Vec<NodeId> = sub_commands
        .into_iter()
        .map(|child| attach(nodes, child, Some(id)))
        .collect();
    if let Some(node) = nodes.get_mut(id.0) {
        node.children = children;
    }
    id
}

/// Mapping from dotted path to command, in depth-first order. The root is
/// the first entry, stored under [`ROOT_SENTINEL`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<(String, Arc<CommandNode>)>,
    positions: HashMap<String, usize>,
}

impl Registry {
    /// Node by dotted path.
    pub fn get(&self, path: &str) -> Option<&Arc<CommandNode>> {
        self.positions
            .get(path)
            .and_then(|&pos| self.entries.get(pos))
            .map(|(_, node)| node)
    }

    /// The entry stored under [`ROOT_SENTINEL`].
    pub fn root(&self) -> Option<&Arc<CommandNode>> {
        self.get(ROOT_SENTINEL)
    }

    /// Every entry, root included, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<CommandNode>)> {
        self.entries.iter().map(|(path, node)| (path.as_str(), node))
    }

    /// Every non-root entry, in insertion order.
    pub fn commands(&self) -> impl Iterator<Item = (&str, &Arc<CommandNode>)> {
        self.iter().filter(|(_, node)| !node.is_root())
    }

    /// Dotted paths, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    /// Number of entries, root included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries at all, not even the root.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, path: String, node: Arc<CommandNode>) -> Result<(), DispatchError> {
        if self.positions.contains_key(&path) {
            return Err(DispatchError::InvalidCommandName {
                name: node.name.clone(),
                reason: NameViolation::Duplicate,
            });
        }
        self.positions.insert(path.clone(), self.entries.len());
        self.entries.push((path, node));
        Ok(())
    }
}

/// Checks a declared command name. The root sentinel is exempt.
pub fn validate_command_name(name: &str) -> Result<(), DispatchError> {
    if name == ROOT_SENTINEL {
        return Ok(());
    }
    let violation = if name.is_empty() {
        Some(NameViolation::Empty)
    } else if name.trim() != name || REPEATED_WHITESPACE_RE.is_match(name) {
        Some(NameViolation::Whitespace)
    } else if name.contains(PATH_SEPARATOR) {
        Some(NameViolation::Dot)
    } else {
        None
    };

    match violation {
        Some(reason) => Err(DispatchError::InvalidCommandName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Builds the path → command registry for `tree`.
///
/// Direct children of the root are keyed by their own name, deeper commands
/// by `parent_path.name`. Every name is validated before any matching happens.
pub fn build_registry(tree: &CommandTree) -> Result<Registry, DispatchError> {
    let mut registry = Registry::default();
    let Some(root) = tree.root() else {
        return Ok(registry);
    };

    registry.insert(ROOT_SENTINEL.to_string(), Arc::clone(root))?;

    // Explicit stack instead of recursion; children are pushed in reverse so
    // they are visited in declaration order.
    let mut stack: Vec<(NodeId, Option<String>)> = root
        .children
        .iter()
        .rev()
        .map(|&id| (id, None))
        .collect();

    while let Some((id, parent_path)) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        validate_command_name(&node.name)?;

        let path = match parent_path {
            Some(parent) => format!("{}{}{}", parent, PATH_SEPARATOR, node.name),
            None => node.name.clone(),
        };
        log::trace!("Registering command '{}'", path);

        stack.extend(
            node.children
                .iter()
                .rev()
                .map(|&child| (child, Some(path.clone()))),
        );
        registry.insert(path, Arc::clone(node))?;
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample_tree() -> CommandTree {
        CommandTree::from_root(
            Command::root()
                .subcommand(
                    Command::new("build").subcommand(
                        Command::new("evolve")
                            .subcommand(Command::new("mini"))
                            .subcommand(Command::new("maxi")),
                    ),
                )
                .subcommand(Command::new("info")),
        )
    }

    #[test]
    fn test_tree_parents_are_ids() {
        let tree = sample_tree();
        assert_eq!(tree.len(), 6);

        let root = tree.root().unwrap();
        assert!(root.is_root());
        assert_eq!(root.name, ROOT_SENTINEL);

        let build = tree.get(root.children[0]).unwrap();
        let evolve = tree.get(build.children[0]).unwrap();
        assert_eq!(tree.parent_of(evolve).unwrap().name, "build");
        assert_eq!(tree.parent_of(build).unwrap().id, root.id);
        assert!(tree.parent_of(root).is_none());
    }

    #[test]
    fn test_registry_keys_are_dotted_paths_in_dfs_order() {
        let registry = build_registry(&sample_tree()).unwrap();
        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(
            keys,
            vec![
                ROOT_SENTINEL,
                "build",
                "build.evolve",
                "build.evolve.mini",
                "build.evolve.maxi",
                "info"
            ]
        );
        assert_eq!(registry.get("build.evolve.mini").unwrap().name, "mini");
        assert_eq!(registry.commands().count(), 5);
    }

    #[test]
    fn test_registry_is_a_bijection() {
        let tree = sample_tree();
        let registry = build_registry(&tree).unwrap();
        assert_eq!(registry.len(), tree.len());

        let mut ids: Vec<usize> = registry.iter().map(|(_, node)| node.id.0).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), tree.len());
    }

    #[test]
    fn test_validate_command_name() {
        assert!(validate_command_name("build").is_ok());
        assert!(validate_command_name("two words").is_ok());
        assert!(validate_command_name(ROOT_SENTINEL).is_ok());

        for bad in ["", " build", "build ", "two  words", "tab\t\tname", "a.b"] {
            let err = validate_command_name(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidCommandName, "{:?}", bad);
        }
    }

    #[test]
    fn test_invalid_nested_name_fails_registry_build() {
        let tree = CommandTree::from_root(
            Command::root().subcommand(Command::new("build").subcommand(Command::new("bad  name"))),
        );
        let err = build_registry(&tree).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidCommandName { ref name, reason: NameViolation::Whitespace }
                if name == "bad  name"
        ));
    }

    #[test]
    fn test_duplicate_sibling_names_are_rejected() {
        let tree = CommandTree::from_root(
            Command::root()
                .subcommand(Command::new("build"))
                .subcommand(Command::new("build")),
        );
        let err = build_registry(&tree).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidCommandName { reason: NameViolation::Duplicate, .. }
        ));
    }
}
