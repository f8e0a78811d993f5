// src/error.rs

//! The dispatcher's error type and its localized rendering.

use crate::i18n::I18n;
use std::fmt;
use thiserror::Error;

/// Stable classification of a [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A declared name broke the naming rules.
    InvalidCommandName,
    /// No command matches the invocation.
    CommandNotFound,
    /// The registry is empty.
    CommandNotConfigured,
    /// A required flag is missing.
    CommandFlagNotProvided,
    /// The invoked command declares no process.
    CommandProcessNotFound,
    /// A flag value failed its type-parser.
    CommandInvalidFlagsValue,
    /// A config file could not be read or parsed.
    ConfigLoad,
    /// User code returned an error.
    Handler,
}

/// Why a declared command name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameViolation {
    /// Empty or whitespace only.
    Empty,
    /// Leading, trailing or repeated whitespace.
    Whitespace,
    /// Contains the path separator.
    Dot,
    /// A sibling already has this name.
    Duplicate,
}

impl NameViolation {
    fn message_key(self) -> &'static str {
        match self {
            Self::Empty => "error.invalid_command_name.empty",
            Self::Whitespace => "error.invalid_command_name.whitespace",
            Self::Dot => "error.invalid_command_name.dot",
            Self::Duplicate => "error.invalid_command_name.duplicate",
        }
    }
}

impl fmt::Display for NameViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "names must not be empty",
            Self::Whitespace => "names must not have leading, trailing or repeated whitespace",
            Self::Dot => "names must not contain '.'",
            Self::Duplicate => "another command with this path is already registered",
        })
    }
}

/// What a flag's type-parser expected to receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedValue {
    /// `true`/`false` and their spellings.
    Boolean,
    /// Any value at all.
    String,
    /// An integer or a float.
    Number,
    /// One of the listed values.
    Choice(Vec<String>),
}

impl ExpectedValue {
    fn localize(&self, i18n: &I18n) -> String {
        match self {
            Self::Boolean => i18n.translate("flag.expected.boolean", &[]),
            Self::String => i18n.translate("flag.expected.string", &[]),
            Self::Number => i18n.translate("flag.expected.number", &[]),
            Self::Choice(choices) => {
                i18n.translate("flag.expected.choice", &[("choices", choices.join(", ").as_str())])
            }
        }
    }
}

impl fmt::Display for ExpectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("a boolean (true or false)"),
            Self::String => f.write_str("a value"),
            Self::Number => f.write_str("a number"),
            Self::Choice(choices) => write!(f, "one of: {}", choices.join(", ")),
        }
    }
}

/// Every failure the dispatcher can report.
///
/// `Display` renders English text; use [`DispatchError::localize`] for the
/// active locale.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Raised while building the registry.
    #[error("Invalid command name \"{name}\": {reason}")]
    InvalidCommandName {
        /// The offending name, as declared.
        name: String,
        /// Which rule it broke.
        reason: NameViolation,
    },

    /// No command matches the positional arguments.
    #[error("Command \"{name}\" not found.")]
    CommandNotFound {
        /// Positional arguments of the last attempt, space-joined.
        name: String,
    },

    /// The registry holds no commands at all.
    #[error("No command is configured for this invocation.")]
    CommandNotConfigured,

    /// A command in the chain declares a required flag that has no value.
    #[error("Command \"{command}\" requires the flag \"--{flag}\", but it was not provided.")]
    CommandFlagNotProvided {
        /// Dotted path of the command declaring the flag.
        command: String,
        /// Declared flag name.
        flag: String,
    },

    /// The invoked command declares no process.
    #[error("Command \"{command}\" has no process to run.")]
    CommandProcessNotFound {
        /// Dotted path of the invoked command.
        command: String,
    },

    /// A flag value failed its type-parser.
    #[error("Invalid value \"{value}\" for flag \"--{flag}\": expected {expected}.")]
    CommandInvalidFlagsValue {
        /// Declared flag name.
        flag: String,
        /// The raw text received; empty when no value followed the flag.
        value: String,
        /// What the type-parser accepts.
        expected: ExpectedValue,
    },

    /// A config file exists but could not be read or parsed.
    #[error("Failed to load configuration from \"{path}\": {reason}")]
    ConfigLoad {
        /// File that was read.
        path: String,
        /// Underlying I/O or parse error.
        reason: String,
    },

    /// An error returned by user code (a process, hook or interceptor).
    #[error(transparent)]
    Handler(anyhow::Error),
}

impl DispatchError {
    /// Wraps an error returned by user code, unwrapping it if it already is a
    /// `DispatchError` (e.g. one propagated with `?` from a nested dispatcher).
    pub fn from_handler(error: anyhow::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(dispatch_error) => dispatch_error,
            Err(other) => Self::Handler(other),
        }
    }

    /// The variant, without its payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCommandName { .. } => ErrorKind::InvalidCommandName,
            Self::CommandNotFound { .. } => ErrorKind::CommandNotFound,
            Self::CommandNotConfigured => ErrorKind::CommandNotConfigured,
            Self::CommandFlagNotProvided { .. } => ErrorKind::CommandFlagNotProvided,
            Self::CommandProcessNotFound { .. } => ErrorKind::CommandProcessNotFound,
            Self::CommandInvalidFlagsValue { .. } => ErrorKind::CommandInvalidFlagsValue,
            Self::ConfigLoad { .. } => ErrorKind::ConfigLoad,
            Self::Handler(_) => ErrorKind::Handler,
        }
    }

    /// Log level for this error. It never affects control flow.
    pub fn severity(&self) -> log::Level {
        match self.kind() {
            ErrorKind::CommandNotFound
            | ErrorKind::CommandNotConfigured
            | ErrorKind::CommandFlagNotProvided
            | ErrorKind::CommandInvalidFlagsValue => log::Level::Warn,
            ErrorKind::InvalidCommandName
            | ErrorKind::CommandProcessNotFound
            | ErrorKind::ConfigLoad
            | ErrorKind::Handler => log::Level::Error,
        }
    }

    /// Catalog key of the localized message.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::InvalidCommandName { .. } => "error.invalid_command_name",
            Self::CommandNotFound { .. } => "error.command_not_found",
            Self::CommandNotConfigured => "error.command_not_configured",
            Self::CommandFlagNotProvided { .. } => "error.command_flag_not_provided",
            Self::CommandProcessNotFound { .. } => "error.command_process_not_found",
            Self::CommandInvalidFlagsValue { .. } => "error.command_invalid_flags_value",
            Self::ConfigLoad { .. } => "error.config_load",
            Self::Handler(_) => "error.handler",
        }
    }

    /// Placeholder values for [`message_key`](Self::message_key), already
    /// localized where they carry text of their own.
    pub fn message_vars(&self, i18n: &I18n) -> Vec<(&'static str, String)> {
        match self {
            Self::InvalidCommandName { name, reason } => vec![
                ("name", name.clone()),
                ("reason", i18n.translate(reason.message_key(), &[])),
            ],
            Self::CommandNotFound { name } => vec![("name", name.clone())],
            Self::CommandNotConfigured => Vec::new(),
            Self::CommandFlagNotProvided { command, flag } => {
                vec![("command", command.clone()), ("flag", flag.clone())]
            }
            Self::CommandProcessNotFound { command } => vec![("command", command.clone())],
            Self::CommandInvalidFlagsValue {
                flag,
                value,
                expected,
            } => vec![
                ("flag", flag.clone()),
                ("value", value.clone()),
                ("expected", expected.localize(i18n)),
            ],
            Self::ConfigLoad { path, reason } => {
                vec![("path", path.clone()), ("reason", reason.clone())]
            }
            Self::Handler(error) => vec![("reason", format!("{:#}", error))],
        }
    }

    /// Renders the error in the resolver's locale.
    pub fn localize(&self, i18n: &I18n) -> String {
        let vars = self.message_vars(i18n);
        let borrowed: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();
        i18n.translate(self.message_key(), &borrowed)
    }
}
