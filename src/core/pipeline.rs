// src/core/pipeline.rs

//! The execution engine.
//!
//! A resolved chain is turned into an ordered list of stages: every global
//! interceptor, then one stage per command (root → leaf), then a catch-all.
//! A single driver loop walks the list carrying an error slot. A failing
//! stage fills the slot, the remaining command stages are skipped, and the
//! catch-all hands the error to the registered handlers.

use crate::{
    constants::{PATH_SEPARATOR, ROOT_SENTINEL},
    core::{
        config_loader::{ConfigLoader, merge_contexts},
        events::{ErrorHandler, EventBus, report_error},
        flag_parser::{ParsedArgs, filter_flags},
        registry::CommandNode,
    },
    error::DispatchError,
    i18n::I18n,
    models::{
        CommandInfo, ConfigFile, Control, FlagSchema, FlagValues, Interceptor, InterceptorArgs,
        ProcessArgs, SubContextArgs,
    },
};
use serde_json::Value;
use std::{fmt, sync::Arc};

/// Per-invocation state threaded through every stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineContext {
    /// Positional arguments.
    pub args: Vec<String>,
    /// Arguments after `--`.
    pub eof_args: Vec<String>,
    /// Every parsed flag, global and chain-wide.
    pub flags: FlagValues,
    /// Flags no schema declares.
    pub unknown_flags: FlagValues,
    /// Overwritten by each intermediate command's sub-context.
    pub ctx: Option<Value>,
    /// The argument vector as received.
    pub raw_invocation: Vec<String>,
}

impl PipelineContext {
    /// Starting context for a parsed argument vector; `ctx` is empty.
    pub fn from_parsed(parsed: ParsedArgs, raw_invocation: &[String]) -> Self {
        Self {
            args: parsed.positional,
            eof_args: parsed.eof_args,
            flags: parsed.flags,
            unknown_flags: parsed.unknown_flags,
            ctx: None,
            raw_invocation: raw_invocation.to_vec(),
        }
    }
}

/// One step of the pipeline.
#[derive(Clone)]
pub enum Stage {
    /// A global interceptor, run before any command.
    Interceptor(Interceptor),
    /// One command of the chain.
    Command {
        /// The command's registry node.
        node: Arc<CommandNode>,
        /// Dotted path; the root sentinel for the root.
        path: String,
        /// `true` for the matched command (or a command without children).
        terminal: bool,
        /// Nearest config marker, leaf → root. Only set on terminal stages.
        config_file: Option<ConfigFile>,
    },
    /// Reports a pending error; always last.
    CatchAll,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interceptor(_) => f.write_str("Interceptor"),
            Self::Command { path, terminal, .. } => f
                .debug_struct("Command")
                .field("path", path)
                .field("terminal", terminal)
                .finish_non_exhaustive(),
            Self::CatchAll => f.write_str("CatchAll"),
        }
    }
}

/// Everything a stage may need that outlives the invocation.
#[derive(Clone, Copy)]
pub struct PipelineEnv<'a> {
    /// Active message resolver.
    pub i18n: &'a Arc<I18n>,
    /// Schema of the global flags.
    pub global_flags: &'a FlagSchema,
    /// Listeners notified on success and on error.
    pub events: &'a EventBus,
    /// Handlers the catch-all hands errors to, in order.
    pub error_handlers: &'a [ErrorHandler],
    /// Source of config-file contexts.
    pub config_loader: &'a dyn ConfigLoader,
}

impl fmt::Debug for PipelineEnv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEnv")
            .field("locale", &self.i18n.locale())
            .field("global_flags", &self.global_flags.keys().collect::<Vec<_>>())
            .field("error_handlers", &self.error_handlers.len())
            .field("config_loader", &self.config_loader)
            .finish_non_exhaustive()
    }
}

/// An ordered stage list ready to be driven.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    /// Dotted path of the matched command, handed to interceptors.
    command: Option<String>,
}

/// Builds the stage list for `chain`. An empty chain yields interceptors
/// and the catch-all only.
pub fn build_pipeline(interceptors: &[Interceptor], chain: &[Arc<CommandNode>]) -> Pipeline {
    let mut stages: Vec<Stage> = interceptors
        .iter()
        .map(|interceptor| Stage::Interceptor(Arc::clone(interceptor)))
        .collect();

    let mut names: Vec<&str> = Vec::new();
    let mut nearest_marker: Option<&ConfigFile> = None;
    let mut command = None;

    for (index, node) in chain.iter().enumerate() {
        let path = if node.is_root() {
            ROOT_SENTINEL.to_string()
        } else {
            names.push(&node.name);
            names.join(PATH_SEPARATOR)
        };
        if node.config_file.is_some() {
            nearest_marker = node.config_file.as_ref();
        }

        let terminal = index + 1 == chain.len() || !node.has_children();
        if terminal && !node.is_root() {
            command = Some(path.clone());
        }
        stages.push(Stage::Command {
            node: Arc::clone(node),
            path,
            terminal,
            config_file: if terminal { nearest_marker.cloned() } else { None },
        });
    }

    stages.push(Stage::CatchAll);
    Pipeline { stages, command }
}

impl Pipeline {
    /// Interceptors, then commands root → leaf, then the catch-all.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Drives every stage in order.
    ///
    /// Returns an error only when a stage failed and no error handler took it.
    pub async fn run(
        &self,
        env: &PipelineEnv<'_>,
        context: &mut PipelineContext,
    ) -> Result<(), DispatchError> {
        let mut error: Option<DispatchError> = None;
        let mut halted = false;

        for stage in &self.stages {
            if let Stage::CatchAll = stage {
                if let Some(err) = error.take() {
                    report_error(err, env.events, env.error_handlers).await?;
                }
                continue;
            }
            if error.is_some() || halted {
                log::trace!("Skipping {:?}", stage);
                continue;
            }

            log::trace!("Entering {:?}", stage);
            let outcome = match stage {
                Stage::Interceptor(interceptor) => {
                    self.run_interceptor(interceptor, env, context).await
                }
                Stage::Command {
                    node,
                    path,
                    terminal: false,
                    ..
                } => resolve_sub_context(node, path, env, context).await.map(|()| Control::Next),
                Stage::Command {
                    node,
                    path,
                    terminal: true,
                    config_file,
                } => run_process(node, path, config_file.as_ref(), env, context)
                    .await
                    .map(|()| Control::Next),
                Stage::CatchAll => Ok(Control::Next),
            };

            match outcome {
                Ok(Control::Next) => {}
                Ok(Control::Halt) => {
                    log::debug!("Pipeline halted by an interceptor");
                    halted = true;
                }
                Err(err) => error = Some(err),
            }
        }

        // Only reachable with an error when the list had no catch-all.
        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_interceptor(
        &self,
        interceptor: &Interceptor,
        env: &PipelineEnv<'_>,
        context: &PipelineContext,
    ) -> Result<Control, DispatchError> {
        let args = InterceptorArgs {
            flags: filter_flags(&context.flags, &[env.global_flags]),
            locale: env.i18n.locale().to_string(),
            i18n: Arc::clone(env.i18n),
            command: self.command.clone(),
        };
        interceptor(args).await.map_err(DispatchError::from_handler)
    }
}

async fn resolve_sub_context(
    node: &CommandNode,
    path: &str,
    env: &PipelineEnv<'_>,
    context: &mut PipelineContext,
) -> Result<(), DispatchError> {
    let Some(source) = &node.sub_context else {
        return Ok(());
    };
    let args = SubContextArgs {
        info: node.info(path, env.i18n),
        locale: env.i18n.locale().to_string(),
        i18n: Arc::clone(env.i18n),
        ctx: context.ctx.clone(),
    };
    let ctx = source.resolve(args).await.map_err(DispatchError::from_handler)?;
    context.ctx = Some(ctx);
    Ok(())
}

async fn run_process(
    node: &CommandNode,
    path: &str,
    config_file: Option<&ConfigFile>,
    env: &PipelineEnv<'_>,
    context: &mut PipelineContext,
) -> Result<(), DispatchError> {
    let Some(process) = &node.process else {
        return Err(DispatchError::CommandProcessNotFound {
            command: path.to_string(),
        });
    };

    let info = node.info(path, env.i18n);
    let loaded = match config_file {
        Some(marker) => load_context(marker, path, &info, env, context).await?,
        None => None,
    };

    let args = ProcessArgs {
        info,
        locale: env.i18n.locale().to_string(),
        i18n: Arc::clone(env.i18n),
        ctx: merge_contexts(loaded, context.ctx.clone()),
        flags: filter_flags(&context.flags, &[env.global_flags, &node.flags]),
        unknown_flags: context.unknown_flags.clone(),
        eof_args: context.eof_args.clone(),
    };

    process(args.clone())
        .await
        .map_err(DispatchError::from_handler)?;

    let notified = env.events.emit(path, &args);
    log::debug!("Command '{}' finished; {} listener(s) notified", path, notified);
    Ok(())
}

async fn load_context(
    marker: &ConfigFile,
    path: &str,
    info: &CommandInfo,
    env: &PipelineEnv<'_>,
    context: &PipelineContext,
) -> Result<Option<Value>, DispatchError> {
    let global_view = filter_flags(&context.flags, &[env.global_flags]);
    let contexts = env.config_loader.load(&global_view, marker)?;
    let Some(source) = contexts.get(path) else {
        return Ok(None);
    };

    let args = SubContextArgs {
        info: info.clone(),
        locale: env.i18n.locale().to_string(),
        i18n: Arc::clone(env.i18n),
        ctx: context.ctx.clone(),
    };
    source
        .resolve(args)
        .await
        .map(Some)
        .map_err(DispatchError::from_handler)
}
