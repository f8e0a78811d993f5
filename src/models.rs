// src/models.rs

//! Declaration types for command trees and the records handed to user code.

use crate::{
    constants::ROOT_SENTINEL,
    error::{DispatchError, ExpectedValue},
    i18n::I18n,
};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};

/// Boxed future for type erasure of user callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Parsed flag values, keyed by the declared flag name.
pub type FlagValues = BTreeMap<String, Value>;

/// A flag schema: flag name to its definition.
pub type FlagSchema = BTreeMap<String, FlagDef>;

/// Source of a context value handed down the chain (or loaded from config).
pub type ContextSource = Resolvable<SubContextArgs, Value>;

/// The terminal action of a command.
pub type ProcessFn = Arc<dyn Fn(ProcessArgs) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A global interceptor stage.
pub type Interceptor =
    Arc<dyn Fn(InterceptorArgs) -> BoxFuture<'static, anyhow::Result<Control>> + Send + Sync>;

// --- FLAGS ---

/// The type-parser of a flag: how its raw text becomes a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagKind {
    /// `--flag` or `--flag=false`. Never consumes the next token.
    Boolean,
    /// Any text value.
    String,
    /// An integer or floating point number.
    Number,
    /// One of a fixed set of values.
    Choice(Vec<String>),
    /// A text value that may be repeated; occurrences accumulate.
    List,
}

impl FlagKind {
    /// Whether the flag consumes the following token as its value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::Boolean)
    }

    fn expected(&self) -> ExpectedValue {
        match self {
            Self::Boolean => ExpectedValue::Boolean,
            Self::String | Self::List => ExpectedValue::String,
            Self::Number => ExpectedValue::Number,
            Self::Choice(choices) => ExpectedValue::Choice(choices.clone()),
        }
    }
}

/// Declaration of a single flag.
#[derive(Debug, Clone)]
pub struct FlagDef {
    /// Type-parser for the raw text.
    pub kind: FlagKind,
    /// Short form without the leading dash.
    pub alias: Option<String>,
    /// Value used when the flag is absent.
    pub default: Option<Value>,
    /// Absence is a validation error.
    pub required: bool,
    /// Help text.
    pub description: Option<Message>,
}

impl FlagDef {
    fn of(kind: FlagKind) -> Self {
        Self {
            kind,
            alias: None,
            default: None,
            required: false,
            description: None,
        }
    }

    /// A boolean switch.
    pub fn boolean() -> Self {
        Self::of(FlagKind::Boolean)
    }

    /// A text flag.
    pub fn string() -> Self {
        Self::of(FlagKind::String)
    }

    /// A numeric flag.
    pub fn number() -> Self {
        Self::of(FlagKind::Number)
    }

    /// A flag restricted to `choices`.
    pub fn choice<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(FlagKind::Choice(choices.into_iter().map(Into::into).collect()))
    }

    /// A repeatable text flag.
    pub fn list() -> Self {
        Self::of(FlagKind::List)
    }

    /// Short form, given without the leading dash (e.g. `"c"` for `-c`).
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Value applied when the flag is not given.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Rejects invocations that leave the flag without a value.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Help text for the flag.
    pub fn description(mut self, message: impl Into<Message>) -> Self {
        self.description = Some(message.into());
        self
    }

    /// Runs the type-parser over a raw occurrence of the flag.
    ///
    /// `raw` is `None` when the flag appeared without a value.
    pub fn parse_value(&self, name: &str, raw: Option<&str>) -> Result<Value, DispatchError> {
        let invalid = |value: &str| DispatchError::CommandInvalidFlagsValue {
            flag: name.to_string(),
            value: value.to_string(),
            expected: self.kind.expected(),
        };

        match (&self.kind, raw) {
            (FlagKind::Boolean, None) => Ok(Value::Bool(true)),
            (FlagKind::Boolean, Some(text)) => match text.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(invalid(text)),
            },
            (_, None) => Err(invalid("")),
            (FlagKind::String | FlagKind::List, Some(text)) => Ok(Value::String(text.to_string())),
            (FlagKind::Number, Some(text)) => {
                if let Ok(int) = text.parse::<i64>() {
                    return Ok(Value::from(int));
                }
                text.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| invalid(text))
            }
            (FlagKind::Choice(choices), Some(text)) => {
                if choices.iter().any(|c| c == text) {
                    Ok(Value::String(text.to_string()))
                } else {
                    Err(invalid(text))
                }
            }
        }
    }
}

// --- MESSAGES & DYNAMIC VALUES ---

/// A reference to user-facing text, resolved through the message resolver.
#[derive(Clone)]
pub enum Message {
    /// A translation key.
    Key(String),
    /// Text computed from the active message resolver.
    Computed(Arc<dyn Fn(&I18n) -> String + Send + Sync>),
}

impl Message {
    /// Wraps a closure that builds the text from the resolver.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&I18n) -> String + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    /// The text in the resolver's locale.
    pub fn resolve(&self, i18n: &I18n) -> String {
        match self {
            Self::Key(key) => i18n.translate(key, &[]),
            Self::Computed(f) => f(i18n),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for Message {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for Message {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

/// A value given either literally or computed (possibly asynchronously) from
/// an argument record. Callers normalize it once with [`Resolvable::resolve`].
pub enum Resolvable<A, T> {
    /// Used as is.
    Literal(T),
    /// Produced per call from the argument record.
    Computed(Arc<dyn Fn(A) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>),
}

impl<A: 'static, T: Clone + 'static> Resolvable<A, T> {
    /// Boxes an async closure as a computed value.
    pub fn computed<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::Computed(Arc::new(
            move |args| -> BoxFuture<'static, anyhow::Result<T>> { Box::pin(f(args)) },
        ))
    }

    /// Clones the literal or awaits the computation.
    pub async fn resolve(&self, args: A) -> anyhow::Result<T> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Computed(f) => f(args).await,
        }
    }
}

impl<A, T: Clone> Clone for Resolvable<A, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(value.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<A, T: fmt::Debug> fmt::Debug for Resolvable<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Marker asking for a context to be loaded by the config loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// File to read; relative paths resolve against the working directory.
    pub path: PathBuf,
}

impl ConfigFile {
    /// Marker for the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

// --- HANDLER ARGUMENTS ---

/// A command's metadata with every message already translated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandInfo {
    /// The command's own name.
    pub name: String,
    /// Dotted path of the command; empty for the root.
    pub path: String,
    /// Translated description.
    pub description: Option<String>,
    /// Translated usage example.
    pub example: Option<String>,
    /// Translated help text.
    pub help: Option<String>,
}

/// Passed to `resolve_sub_context` hooks and computed config contexts.
#[derive(Debug, Clone)]
pub struct SubContextArgs {
    /// The command whose context is being resolved.
    pub info: CommandInfo,
    /// Active locale.
    pub locale: String,
    /// Active message resolver.
    pub i18n: Arc<I18n>,
    /// Context produced by the nearest ancestor, if any.
    pub ctx: Option<Value>,
}

/// Passed to a command's `process` and to event listeners.
#[derive(Debug, Clone)]
pub struct ProcessArgs {
    /// The invoked command.
    pub info: CommandInfo,
    /// Active locale.
    pub locale: String,
    /// Active message resolver.
    pub i18n: Arc<I18n>,
    /// Context threaded down the chain, merged with any loaded config.
    pub ctx: Option<Value>,
    /// Global flags plus this command's own flags. Ancestors' flags are not included.
    pub flags: FlagValues,
    /// Flags no schema declares.
    pub unknown_flags: FlagValues,
    /// Arguments found after `--`.
    pub eof_args: Vec<String>,
}

/// Passed to global interceptors.
#[derive(Debug, Clone)]
pub struct InterceptorArgs {
    /// Only the flags declared in the global schema.
    pub flags: FlagValues,
    /// Active locale.
    pub locale: String,
    /// Active message resolver.
    pub i18n: Arc<I18n>,
    /// Dotted path of the matched command; `None` when no named command matched.
    pub command: Option<String>,
}

/// What an interceptor wants the pipeline to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Continue with the next stage.
    Next,
    /// Skip every remaining interceptor and command stage. The catch-all
    /// still runs.
    Halt,
}

// --- COMMAND DECLARATION ---

/// Declaration of a command and, recursively, of the commands below it.
///
/// A parent owns its sub-commands. Parent back-references only exist once the
/// tree is flattened into a [`CommandTree`](crate::core::registry::CommandTree).
#[derive(Clone)]
pub struct Command {
    pub(crate) name: String,
    pub(crate) description: Option<Message>,
    pub(crate) example: Option<Message>,
    pub(crate) help: Option<Message>,
    pub(crate) flags: FlagSchema,
    pub(crate) sub_commands: Vec<Command>,
    pub(crate) sub_context: Option<ContextSource>,
    pub(crate) process: Option<ProcessFn>,
    pub(crate) config_file: Option<ConfigFile>,
}

impl Command {
    /// A command named `name`, with nothing declared yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            example: None,
            help: None,
            flags: FlagSchema::new(),
            sub_commands: Vec::new(),
            sub_context: None,
            process: None,
            config_file: None,
        }
    }

    /// The distinguished root of a command tree.
    pub fn root() -> Self {
        Self::new(ROOT_SENTINEL)
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description shown to users.
    pub fn description(mut self, message: impl Into<Message>) -> Self {
        self.description = Some(message.into());
        self
    }

    /// Usage example.
    pub fn example(mut self, message: impl Into<Message>) -> Self {
        self.example = Some(message.into());
        self
    }

    /// Longer help text.
    pub fn help(mut self, message: impl Into<Message>) -> Self {
        self.help = Some(message.into());
        self
    }

    /// Declares a flag owned by this command.
    pub fn flag(mut self, name: impl Into<String>, def: FlagDef) -> Self {
        self.flags.insert(name.into(), def);
        self
    }

    /// Appends a child; declaration order is resolution order.
    pub fn subcommand(mut self, command: Self) -> Self {
        self.sub_commands.push(command);
        self
    }

    /// Literal context handed to every descendant of this command.
    pub fn sub_context(mut self, ctx: Value) -> Self {
        self.sub_context = Some(Resolvable::Literal(ctx));
        self
    }

    /// Context computed when this command is an intermediate stop.
    pub fn sub_context_with<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(SubContextArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.sub_context = Some(Resolvable::computed(f));
        self
    }

    /// The action run when this command is the one invoked.
    pub fn process<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ProcessArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.process = Some(Arc::new(
            move |args| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(args)) },
        ));
        self
    }

    /// Loads this command's (and its descendants') context from `path`.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = Some(ConfigFile::new(path));
        self
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("flags", &self.flags.keys().collect::<Vec<_>>())
            .field("sub_commands", &self.sub_commands)
            .field("has_process", &self.process.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_flag_values() {
        let def = FlagDef::boolean();
        assert_eq!(def.parse_value("dry", None).unwrap(), json!(true));
        assert_eq!(def.parse_value("dry", Some("false")).unwrap(), json!(false));
        assert!(def.parse_value("dry", Some("maybe")).is_err());
    }

    #[test]
    fn test_number_flag_prefers_integers() {
        let def = FlagDef::number();
        assert_eq!(def.parse_value("jobs", Some("4")).unwrap(), json!(4));
        assert_eq!(def.parse_value("ratio", Some("0.5")).unwrap(), json!(0.5));

        let err = def.parse_value("jobs", Some("four")).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::CommandInvalidFlagsValue { ref flag, ref value, .. }
                if flag == "jobs" && value == "four"
        ));
    }

    #[test]
    fn test_choice_flag_rejects_values_outside_the_set() {
        let def = FlagDef::choice(["dev", "prod"]);
        assert_eq!(def.parse_value("env", Some("prod")).unwrap(), json!("prod"));
        let err = def.parse_value("env", Some("staging")).unwrap_err();
        assert!(err.to_string().contains("one of: dev, prod"));
    }

    #[test]
    fn test_value_flag_without_value_is_invalid() {
        assert!(FlagDef::string().parse_value("name", None).is_err());
    }

    #[tokio::test]
    async fn test_resolvable_literal_and_computed() {
        let literal: Resolvable<u32, String> = Resolvable::Literal("fixed".to_string());
        assert_eq!(literal.resolve(1).await.unwrap(), "fixed");

        let computed: Resolvable<u32, String> =
            Resolvable::computed(|n: u32| async move { Ok(format!("n={}", n)) });
        assert_eq!(computed.resolve(7).await.unwrap(), "n=7");
    }
}
