// build.rs

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

/// The locale every other catalog falls back to. It must exist.
const BASE_LOCALE: &str = "en";

fn main() {
    // --- 1. Inform Cargo about rerun triggers ---
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=locales/");

    // --- 2. Load the base catalog first; a broken base is a build error ---
    let base_path = format!("locales/{}.toml", BASE_LOCALE);
    let base_content = fs::read_to_string(&base_path)
        .unwrap_or_else(|_| panic!("Failed to read base language file: {}", base_path));
    let base: BTreeMap<String, String> = toml::from_str(&base_content)
        .unwrap_or_else(|_| panic!("Failed to parse {}", base_path));

    let mut catalogs: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    catalogs.insert(BASE_LOCALE.to_string(), base);

    // --- 3. Load every other locale file found in `locales/` ---
    let entries = fs::read_dir("locales").expect("Failed to list the locales/ directory");
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let Some(locale) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if locale == BASE_LOCALE {
            continue;
        }
        match fs::read_to_string(&path) {
            Ok(content) => {
                let messages: BTreeMap<String, String> = toml::from_str(&content)
                    .unwrap_or_else(|_| panic!("Failed to parse {}", path.display()));
                catalogs.insert(locale.to_string(), messages);
            }
            Err(_) => {
                // Warn but keep building; lookups fall back to the base catalog.
                println!(
                    "cargo:warning=Language file '{}' could not be read. Skipping it.",
                    path.display()
                );
            }
        }
    }

    // --- 4. Generate the embedded catalog table ---
    let mut code = String::from(
        "/// Message catalogs embedded at build time from `locales/*.toml`.\n\
         pub(crate) static EMBEDDED_CATALOGS: &[(&str, &[(&str, &str)])] = &[\n",
    );
    for (locale, messages) in &catalogs {
        code.push_str(&format!("    ({:?}, &[\n", locale));
        for (key, value) in messages {
            // Debug formatting yields a valid, escaped Rust string literal.
            code.push_str(&format!("        ({:?}, {:?}),\n", key, value));
        }
        code.push_str("    ]),\n");
    }
    code.push_str("];\n");
    code.push_str(&format!(
        "/// Locale used when a key is missing from the requested catalog.\n\
         pub(crate) const BASE_LOCALE: &str = {:?};\n",
        BASE_LOCALE
    ));

    // --- 5. Write the generated code to the `OUT_DIR` directory ---
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is always set by Cargo");
    let dest_path = Path::new(&out_dir).join("translations.rs");
    fs::write(&dest_path, code).expect("Failed to write translations.rs");
}
