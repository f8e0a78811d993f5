// src/bin/cmdchain.rs

//! Demo command tree driven by the dispatcher.

use clap::Parser;
use cmdchain::{
    Command, Control, DispatchError, Dispatcher, FlagDef, I18n, InterceptorArgs, ProcessArgs,
    SubContextArgs,
    cli::Cli,
    core::flag_parser::{FlagParser, TokenFlagParser},
};
use colored::*;
use serde_json::{Value, json};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// The demo tree: `build → evolve → {mini, maxi}` and `info`.
fn command_tree() -> Command {
    Command::root()
        .process(|args: ProcessArgs| async move {
            println!("{}", args.i18n.translate("demo.root.welcome", &[]).bold());
            Ok(())
        })
        .subcommand(
            Command::new("build")
                .description("demo.build.description")
                .flag(
                    "projectCwd",
                    FlagDef::string().default_value("user/project/foo"),
                )
                .sub_context_with(|args: SubContextArgs| async move {
                    Ok(json!({ "builtBy": args.info.path }))
                })
                .process(report)
                .subcommand(
                    Command::new("evolve")
                        .description("demo.evolve.description")
                        .flag("compiler", FlagDef::string().alias("c").default_value("rspack"))
                        .flag("env", FlagDef::choice(["dev", "prod"]).default_value("dev"))
                        .sub_context(json!({ "miniConfig": { "miniKey": "mini" } }))
                        .config_file("cmdchain.toml")
                        .process(report)
                        .subcommand(
                            Command::new("mini")
                                .description("demo.mini.description")
                                .flag("version", FlagDef::string().default_value("1.0.0"))
                                .process(report),
                        )
                        .subcommand(
                            Command::new("maxi")
                                .description("demo.maxi.description")
                                .flag("features", FlagDef::list())
                                .process(report),
                        ),
                ),
        )
        .subcommand(
            Command::new("info")
                .description("demo.info.description")
                .process(report),
        )
}

/// Shared process for the demo commands: prints what the command received.
async fn report(args: ProcessArgs) -> anyhow::Result<()> {
    let title = args
        .i18n
        .translate("demo.running", &[("command", args.info.path.as_str())]);
    println!("{}", title.green().bold());
    if let Some(description) = &args.info.description {
        println!("  {}", description.dimmed());
    }
    println!("  flags: {}", Value::from_iter(args.flags.clone()));
    if !args.unknown_flags.is_empty() {
        println!("  unknown: {}", Value::from_iter(args.unknown_flags.clone()));
    }
    if let Some(ctx) = &args.ctx {
        println!("  ctx: {}", ctx);
    }
    if !args.eof_args.is_empty() {
        println!("  after --: {:?}", args.eof_args);
    }
    Ok(())
}

async fn print_version(args: InterceptorArgs) -> anyhow::Result<Control> {
    if args.flags.get("version") == Some(&Value::Bool(true)) {
        println!("cmdchain {}", env!("CARGO_PKG_VERSION"));
        return Ok(Control::Halt);
    }
    Ok(Control::Next)
}

fn global_flags() -> [(&'static str, FlagDef); 4] {
    [
        ("verbose", FlagDef::boolean().alias("V")),
        ("version", FlagDef::boolean()),
        ("config", FlagDef::string()),
        ("locale", FlagDef::string()),
    ]
}

/// Picks the locale from `--locale` before the dispatcher exists, so that
/// resolution errors are already localized.
fn requested_locale(args: &[String]) -> Option<String> {
    let schema = global_flags()
        .into_iter()
        .map(|(name, def)| (name.to_string(), def))
        .collect();
    let parsed = TokenFlagParser.parse(&schema, args).ok()?;
    parsed
        .flags
        .get("locale")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn build_dispatcher(locale: &str, failed: Arc<AtomicBool>) -> Dispatcher {
    let dispatcher = global_flags()
        .into_iter()
        .fold(Dispatcher::new(command_tree()), |d, (name, def)| {
            d.global_flag(name, def)
        })
        .locale(locale)
        .interceptor(print_version)
        .on("build.evolve.mini", |args| {
            log::info!("'{}' finished", args.info.path);
        });

    let i18n = Arc::clone(dispatcher.i18n());
    dispatcher.register_error_handler(move |err: Arc<DispatchError>| {
        let i18n = Arc::clone(&i18n);
        let failed = Arc::clone(&failed);
        async move {
            failed.store(true, Ordering::SeqCst);
            eprintln!(
                "\n{}: {}",
                i18n.translate("demo.error", &[]).red().bold(),
                err.localize(&i18n)
            );
        }
    })
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("CLI args parsed: {:?}", cli);

    let locale = requested_locale(&cli.args).unwrap_or_else(|| I18n::default_locale().to_string());
    let failed = Arc::new(AtomicBool::new(false));
    let dispatcher = build_dispatcher(&locale, Arc::clone(&failed));

    if let Err(e) = dispatcher.parse(cli.args).await {
        let i18n = dispatcher.i18n();
        eprintln!("\n{}: {}", i18n.translate("demo.error", &[]).red().bold(), e.localize(i18n));
        std::process::exit(1);
    }
    if failed.load(Ordering::SeqCst) {
        std::process::exit(1);
    }
}
