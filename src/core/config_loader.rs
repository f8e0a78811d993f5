//! # Config Loader
//!
//! Contexts loaded from outside the command tree. A command carrying a
//! [`ConfigFile`] marker asks the loader for a map of dotted event name to
//! context; the entry for the running command is merged under the context
//! threaded down the chain.
use crate::{
    constants::CONFIG_FLAG,
    error::DispatchError,
    models::{ConfigFile, ContextSource, FlagValues, Resolvable, SubContextArgs},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    fmt,
    fs,
    future::Future,
    path::{Path, PathBuf},
};

/// Event name → context source.
pub type LoadedContexts = HashMap<String, ContextSource>;

/// Supplies contexts for commands that declare a config marker.
pub trait ConfigLoader: Send + Sync + fmt::Debug {
    /// `flags` is the effective global flag view of the invocation.
    fn load(&self, flags: &FlagValues, marker: &ConfigFile) -> Result<LoadedContexts, DispatchError>;
}

/// Reads a TOML file with one table per dotted event name:
///
/// ```toml
/// ["build.evolve.mini"]
/// target = "es2020"
/// ```
///
/// A top-level entry that is not a table is a load error. A `config` global
/// flag, when given, overrides the marker's path.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlConfigLoader;

impl TomlConfigLoader {
    fn effective_path(flags: &FlagValues, marker: &ConfigFile) -> PathBuf {
        flags
            .get(CONFIG_FLAG)
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| marker.path.clone())
    }
}

impl ConfigLoader for TomlConfigLoader {
    fn load(&self, flags: &FlagValues, marker: &ConfigFile) -> Result<LoadedContexts, DispatchError> {
        let path = Self::effective_path(flags, marker);
        if !path.exists() {
            log::debug!("Config file '{}' not found; no contexts loaded", path.display());
            return Ok(LoadedContexts::new());
        }

        let document = read_document(&path)?;
        log::debug!(
            "Loaded {} context(s) from '{}'",
            document.contexts.len(),
            path.display()
        );

        Ok(document
            .contexts
            .into_iter()
            .map(|(event, ctx)| (event, Resolvable::Literal(Value::Object(ctx))))
            .collect())
    }
}

/// On-disk layout: every top-level entry is a table named after an event.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct ConfigDocument {
    contexts: HashMap<String, Map<String, Value>>,
}

fn read_document(path: &Path) -> Result<ConfigDocument, DispatchError> {
    let content = fs::read_to_string(path).map_err(|e| config_error(path, e))?;
    toml::from_str(&content).map_err(|e| config_error(path, e))
}

fn config_error(path: &Path, reason: impl fmt::Display) -> DispatchError {
    DispatchError::ConfigLoad {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// In-memory contexts, the same for every marker. Useful for computed
/// contexts and for tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryConfigLoader {
    contexts: LoadedContexts,
}

impl MemoryConfigLoader {
    /// An empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// A literal context for `event`.
    pub fn insert(mut self, event: impl Into<String>, ctx: Value) -> Self {
        self.contexts.insert(event.into(), Resolvable::Literal(ctx));
        self
    }

    /// A context computed per invocation for `event`.
    pub fn insert_with<F, Fut>(mut self, event: impl Into<String>, f: F) -> Self
    where
        F: Fn(SubContextArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.contexts.insert(event.into(), Resolvable::computed(f));
        self
    }
}

impl ConfigLoader for MemoryConfigLoader {
    fn load(&self, _flags: &FlagValues, _marker: &ConfigFile) -> Result<LoadedContexts, DispatchError> {
        Ok(self.contexts.clone())
    }
}

/// Shallow object merge; keys of `threaded` win. A non-object on either side
/// is replaced by the other, `threaded` first.
pub fn merge_contexts(loaded: Option<Value>, threaded: Option<Value>) -> Option<Value> {
    match (loaded, threaded) {
        (Some(Value::Object(mut base)), Some(Value::Object(overlay))) => {
            base.extend(overlay);
            Some(Value::Object(base))
        }
        (loaded, threaded) => threaded.or(loaded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loads_tables_keyed_by_event_name() {
        let file = write_config(
            r#"
            ["build.evolve.mini"]
            target = "es2020"
            minify = true
            "#,
        );
        let contexts = TomlConfigLoader
            .load(&FlagValues::new(), &ConfigFile::new(file.path()))
            .unwrap();

        let expected = json!({ "target": "es2020", "minify": true });
        assert!(matches!(
            contexts.get("build.evolve.mini"),
            Some(Resolvable::Literal(value)) if value == &expected
        ));
    }

    #[test]
    fn test_config_flag_overrides_marker_path() {
        let file = write_config("[info]\nverbose = true\n");
        let mut flags = FlagValues::new();
        flags.insert(
            CONFIG_FLAG.to_string(),
            json!(file.path().display().to_string()),
        );

        let contexts = TomlConfigLoader
            .load(&flags, &ConfigFile::new("does/not/exist.toml"))
            .unwrap();
        assert!(contexts.contains_key("info"));
    }

    #[test]
    fn test_missing_file_yields_no_contexts() {
        let dir = tempfile::tempdir().unwrap();
        let marker = ConfigFile::new(dir.path().join("cmdchain.toml"));
        assert!(TomlConfigLoader.load(&FlagValues::new(), &marker).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_is_a_config_error() {
        let file = write_config("[build\nbroken = ");
        let err = TomlConfigLoader
            .load(&FlagValues::new(), &ConfigFile::new(file.path()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigLoad);
    }

    #[test]
    fn test_top_level_entries_must_be_tables() {
        let file = write_config("verbose = true\n");
        let err = TomlConfigLoader
            .load(&FlagValues::new(), &ConfigFile::new(file.path()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigLoad);
    }

    #[test]
    fn test_threaded_context_wins_on_overlap() {
        let merged = merge_contexts(
            Some(json!({ "target": "es5", "minify": true })),
            Some(json!({ "target": "es2020" })),
        );
        assert_eq!(merged, Some(json!({ "target": "es2020", "minify": true })));

        assert_eq!(merge_contexts(Some(json!({ "a": 1 })), None), Some(json!({ "a": 1 })));
        assert_eq!(merge_contexts(Some(json!({ "a": 1 })), Some(json!(7))), Some(json!(7)));
        assert_eq!(merge_contexts(None, None), None);
    }
}
