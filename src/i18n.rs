// src/i18n.rs

//! Runtime message resolver.
//!
//! Catalogs come from `locales/*.toml` (embedded by `build.rs`) and can be
//! extended by applications with their own keys, e.g. command descriptions.
//! Lookups fall back from the requested locale (`es-MX`) to its language
//! (`es`), then to the base locale, and finally echo the key back.

use crate::{
    constants::{LOCALE_ENV_VAR, SYSTEM_LOCALE_ENV_VAR},
    translations::{BASE_LOCALE, EMBEDDED_CATALOGS},
};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::env;

lazy_static! {
    /// Locale picked from the environment, read once per process.
    static ref DEFAULT_LOCALE: String = detect_locale();
}

/// A set of message catalogs plus the locale used to read them.
#[derive(Debug, Clone)]
pub struct I18n {
    locale: String,
    catalogs: HashMap<String, HashMap<String, String>>,
}

impl I18n {
    /// Creates a resolver for `locale`, seeded with the embedded catalogs.
    pub fn new(locale: &str) -> Self {
        let catalogs = EMBEDDED_CATALOGS
            .iter()
            .map(|(name, messages)| {
                let map = messages
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect();
                ((*name).to_string(), map)
            })
            .collect();

        Self {
            locale: normalize_locale(locale).unwrap_or_else(|| BASE_LOCALE.to_string()),
            catalogs,
        }
    }

    /// Creates a resolver for the locale selected by the environment.
    pub fn from_env() -> Self {
        Self::new(Self::default_locale())
    }

    /// The locale selected by `CMDCHAIN_LOCALE` (or `LANG`), `en` otherwise.
    pub fn default_locale() -> &'static str {
        DEFAULT_LOCALE.as_str()
    }

    /// Normalized locale, e.g. `es-MX`.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Same catalogs, different locale.
    pub fn with_locale(&self, locale: &str) -> Self {
        Self {
            locale: normalize_locale(locale).unwrap_or_else(|| BASE_LOCALE.to_string()),
            catalogs: self.catalogs.clone(),
        }
    }

    /// Adds (or overrides) messages for `locale`.
    pub fn add_messages<I, K, V>(&mut self, locale: &str, messages: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let key = normalize_locale(locale).unwrap_or_else(|| BASE_LOCALE.to_string());
        self.catalogs
            .entry(key)
            .or_default()
            .extend(messages.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    /// Adds messages from a flat TOML table (`"key" = "text"`).
    pub fn add_toml(&mut self, locale: &str, content: &str) -> Result<()> {
        let messages: HashMap<String, String> = toml::from_str(content)
            .with_context(|| format!("Failed to parse messages for locale '{}'", locale))?;
        self.add_messages(locale, messages);
        Ok(())
    }

    /// Locales consulted for a lookup, most specific first.
    pub fn fallback_chain(&self) -> Vec<String> {
        let mut chain = vec![self.locale.clone()];
        if let Some((language, _)) = self.locale.split_once('-') {
            chain.push(language.to_string());
        }
        if !chain.iter().any(|l| l == BASE_LOCALE) {
            chain.push(BASE_LOCALE.to_string());
        }
        chain
    }

    /// Translates `key`, replacing `{name}` placeholders from `vars`.
    ///
    /// A key missing from every catalog in the fallback chain is echoed back
    /// so the gap is visible instead of silently empty.
    pub fn translate(&self, key: &str, vars: &[(&str, &str)]) -> String {
        match self.lookup(key) {
            Some(template) => interpolate(template, vars),
            None => {
                log::debug!("Missing translation for '{}' in '{}'", key, self.locale);
                key.to_string()
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.fallback_chain().iter().find_map(|locale| {
            self.catalogs
                .get(locale)
                .and_then(|catalog| catalog.get(key))
                .map(String::as_str)
        })
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Replaces every `{name}` in `template` with its value, in one pass over
/// the template. Substituted values are copied verbatim and never scanned
/// again. Unknown placeholders are left as they are.
fn interpolate(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let (before, from_brace) = rest.split_at(open);
        out.push_str(before);
        let placeholder = from_brace
            .find('}')
            .map(|close| from_brace.split_at(close + 1));
        match placeholder {
            Some((braced, after)) => {
                let name = braced.trim_start_matches('{').trim_end_matches('}');
                match vars.iter().find(|(var, _)| *var == name) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(braced),
                }
                rest = after;
            }
            None => {
                out.push_str(from_brace);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Turns `es_ES.UTF-8` into `es-ES` and `EN` into `en`. Returns `None` for
/// empty values and the `C`/`POSIX` pseudo-locales.
pub fn normalize_locale(raw: &str) -> Option<String> {
    let without_encoding = raw.split(['.', '@']).next().unwrap_or_default().trim();
    if without_encoding.is_empty() || without_encoding == "C" || without_encoding == "POSIX" {
        return None;
    }

    let mut parts = without_encoding.split(['_', '-']);
    let language = parts.next().unwrap_or_default().to_ascii_lowercase();
    if language.is_empty() {
        return None;
    }
    match parts.next() {
        Some(region) if !region.is_empty() => {
            Some(format!("{}-{}", language, region.to_ascii_uppercase()))
        }
        _ => Some(language),
    }
}

fn detect_locale() -> String {
    [LOCALE_ENV_VAR, SYSTEM_LOCALE_ENV_VAR]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .find_map(|value| normalize_locale(&value))
        .unwrap_or_else(|| BASE_LOCALE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_locale() {
        assert_eq!(normalize_locale("es_ES.UTF-8").as_deref(), Some("es-ES"));
        assert_eq!(normalize_locale("EN").as_deref(), Some("en"));
        assert_eq!(normalize_locale("pt-br").as_deref(), Some("pt-BR"));
        assert_eq!(normalize_locale("C.UTF-8"), None);
        assert_eq!(normalize_locale(""), None);
    }

    #[test]
    fn test_fallback_chain() {
        let i18n = I18n::new("es_MX");
        assert_eq!(i18n.fallback_chain(), vec!["es-MX", "es", "en"]);
        assert_eq!(I18n::new("en").fallback_chain(), vec!["en"]);
    }

    #[test]
    fn test_translate_falls_back_through_language_and_base() {
        let i18n = I18n::new("es-MX");
        // Present in `es`.
        assert_eq!(
            i18n.translate("error.command_not_configured", &[]),
            "No hay ningún comando configurado para esta invocación."
        );
        // Only present in `en`.
        assert_eq!(
            i18n.translate("demo.mini.description", &[]),
            "Produce the minimal bundle."
        );
        // Missing everywhere: the key is echoed.
        assert_eq!(i18n.translate("no.such.key", &[]), "no.such.key");
    }

    #[test]
    fn test_translate_interpolates_variables() {
        let i18n = I18n::new("en");
        assert_eq!(
            i18n.translate("error.command_not_found", &[("name", "deploy")]),
            "Command \"deploy\" not found."
        );
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        assert_eq!(
            interpolate(
                "Invalid value \"{value}\" for \"--{flag}\": expected {expected}.",
                &[("flag", "env"), ("value", "{expected}"), ("expected", "dev")],
            ),
            "Invalid value \"{expected}\" for \"--env\": expected dev."
        );
        assert_eq!(interpolate("{unknown} and {", &[("x", "y")]), "{unknown} and {");
    }

    #[test]
    fn test_application_messages_override_and_extend() {
        let mut i18n = I18n::new("fr");
        i18n.add_messages("fr", [("app.greeting", "Bonjour {who}")]);
        assert_eq!(i18n.translate("app.greeting", &[("who", "Ada")]), "Bonjour Ada");

        i18n.add_toml("en", "\"app.farewell\" = \"Bye\"").unwrap();
        assert_eq!(i18n.translate("app.farewell", &[]), "Bye");
        assert!(i18n.add_toml("en", "not = [valid").is_err());
    }
}
