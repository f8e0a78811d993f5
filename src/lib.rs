//! # cmdchain
//!
//! A command-line dispatch core. Given a tree of declared commands and a raw
//! argument vector, it resolves which command was invoked, builds an ordered
//! execution pipeline for that invocation, threads context from ancestor
//! commands down to the invoked one, runs its handler and reports events and
//! localized errors.
//!
//! The entry point is [`Dispatcher`]; commands are declared with [`Command`].

/// Build-time embedded locale catalogs (see `build.rs`).
mod translations {
    include!(concat!(env!("OUT_DIR"), "/translations.rs"));
}

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod i18n;
pub mod models;

pub use cli::dispatcher::{Dispatcher, ParseRequest, ResolvedInvocation};
pub use error::{DispatchError, ErrorKind};
pub use i18n::I18n;
pub use models::{
    Command, CommandInfo, ConfigFile, Control, FlagDef, FlagKind, FlagSchema, FlagValues,
    InterceptorArgs, Message, ProcessArgs, Resolvable, SubContextArgs,
};
