// src/constants.rs

//! Names and tokens shared across modules.

/// Registry key of the tree's root node. Argument vectors cannot carry a NUL
/// byte, so no user-typed token can ever equal it.
pub const ROOT_SENTINEL: &str = "\u{0}root";

/// Separator between command names in a dotted path.
pub const PATH_SEPARATOR: &str = ".";

/// Environment variable that selects the default locale.
pub const LOCALE_ENV_VAR: &str = "CMDCHAIN_LOCALE";

/// Generic system locale variable, consulted when [`LOCALE_ENV_VAR`] is unset.
pub const SYSTEM_LOCALE_ENV_VAR: &str = "LANG";

/// Name of the global flag that overrides a command's config file path.
pub const CONFIG_FLAG: &str = "config";

/// Token after which every argument is passed through untouched.
pub const EOF_MARKER: &str = "--";
