// src/cli/dispatcher.rs

//! The public facade: declare a tree once, then hand it argument vectors.
//!
//! Resolution is a pure function of the dispatcher and the argument vector.
//! Every invocation builds its own registry snapshot, chain and pipeline
//! context and carries them in a [`ResolvedInvocation`], so one dispatcher
//! can serve concurrent invocations.

use crate::{
    constants::{PATH_SEPARATOR, ROOT_SENTINEL},
    core::{
        chain::{assemble_chain, chain_schema, check_required_flags, validate_chain},
        config_loader::{ConfigLoader, TomlConfigLoader},
        events::{ErrorHandler, EventBus, error_handler, report_error},
        flag_parser::{FlagParser, TokenFlagParser},
        pipeline::{PipelineContext, PipelineEnv, build_pipeline},
        registry::{CommandNode, CommandTree, Registry, build_registry},
        resolver::resolve_command,
    },
    error::DispatchError,
    i18n::I18n,
    models::{
        BoxFuture, Command, Control, FlagDef, FlagSchema, Interceptor, InterceptorArgs,
        ProcessArgs,
    },
};
use std::{fmt, future::Future, slice, sync::Arc};

/// Resolves argument vectors against a command tree and runs them.
pub struct Dispatcher {
    tree: Arc<CommandTree>,
    global_flags: FlagSchema,
    interceptors: Vec<Interceptor>,
    error_handlers: Vec<ErrorHandler>,
    events: EventBus,
    i18n: Arc<I18n>,
    flag_parser: Arc<dyn FlagParser>,
    config_loader: Arc<dyn ConfigLoader>,
}

impl Dispatcher {
    /// A dispatcher for the tree under `root`, in the environment's locale.
    pub fn new(root: Command) -> Self {
        Self {
            tree: Arc::new(CommandTree::from_root(root)),
            global_flags: FlagSchema::new(),
            interceptors: Vec::new(),
            error_handlers: Vec::new(),
            events: EventBus::default(),
            i18n: Arc::new(I18n::from_env()),
            flag_parser: Arc::new(TokenFlagParser),
            config_loader: Arc::new(TomlConfigLoader),
        }
    }

    /// Declares a flag accepted by every command.
    pub fn global_flag(mut self, name: impl Into<String>, def: FlagDef) -> Self {
        self.global_flags.insert(name.into(), def);
        self
    }

    /// Adds a stage that runs before any command, in registration order.
    pub fn interceptor<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(InterceptorArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Control>> + Send + 'static,
    {
        self.interceptors.push(Arc::new(
            move |args| -> BoxFuture<'static, anyhow::Result<Control>> { Box::pin(f(args)) },
        ));
        self
    }

    /// Adds an error handler. Handlers are awaited in registration order for
    /// every error; with none registered, errors are returned to the caller.
    pub fn register_error_handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<DispatchError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.error_handlers.push(error_handler(f));
        self
    }

    /// Subscribes to the successful completion of the command at `event`
    /// (its dotted path).
    pub fn on<F>(mut self, event: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&ProcessArgs) + Send + Sync + 'static,
    {
        self.events.on(event, listener);
        self
    }

    /// Subscribes to every reported error.
    pub fn on_error<F>(mut self, listener: F) -> Self
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.events.on_error(listener);
        self
    }

    /// Selects the locale used for messages and error reports.
    pub fn locale(mut self, locale: &str) -> Self {
        self.i18n = Arc::new(self.i18n.with_locale(locale));
        self
    }

    /// Adds application messages (command descriptions and the like).
    pub fn messages<I, K, V>(mut self, locale: &str, messages: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Arc::make_mut(&mut self.i18n).add_messages(locale, messages);
        self
    }

    /// Replaces the default [`TokenFlagParser`].
    pub fn flag_parser(mut self, parser: impl FlagParser + 'static) -> Self {
        self.flag_parser = Arc::new(parser);
        self
    }

    /// Replaces the default [`TomlConfigLoader`].
    pub fn config_loader(mut self, loader: impl ConfigLoader + 'static) -> Self {
        self.config_loader = Arc::new(loader);
        self
    }

    /// The active message resolver.
    pub fn i18n(&self) -> &Arc<I18n> {
        &self.i18n
    }

    /// Flags every command accepts.
    pub fn global_flags(&self) -> &FlagSchema {
        &self.global_flags
    }

    /// Resolves and validates `argv` without running anything.
    pub fn resolve(&self, argv: &[String]) -> Result<ResolvedInvocation, DispatchError> {
        let registry = build_registry(&self.tree)?;
        let resolution =
            resolve_command(&registry, &self.global_flags, self.flag_parser.as_ref(), argv)?;

        let Some(resolution) = resolution else {
            let root_only = registry.root().map(slice::from_ref).unwrap_or_default();
            let schema = chain_schema(&self.global_flags, root_only);
            let parsed = self.flag_parser.parse(&schema, argv)?;
            return Ok(ResolvedInvocation {
                registry,
                chain: Vec::new(),
                path: None,
                context: PipelineContext::from_parsed(parsed, argv),
            });
        };

        let chain = assemble_chain(&resolution.path, &registry);
        let schema = chain_schema(&self.global_flags, &chain);
        let parsed = self.flag_parser.parse(&schema, argv)?;
        if resolution.is_root() {
            check_required_flags("", &schema, &parsed.flags)?;
        } else {
            validate_chain(&schema, &parsed, &chain)?;
        }

        log::debug!(
            "Invocation {:?} resolved to a chain of {} command(s)",
            argv,
            chain.len()
        );
        Ok(ResolvedInvocation {
            registry,
            chain,
            path: Some(resolution.path),
            context: PipelineContext::from_parsed(parsed, argv),
        })
    }

    /// Runs a resolved invocation and returns the final pipeline context.
    pub async fn execute(
        &self,
        invocation: &ResolvedInvocation,
    ) -> Result<PipelineContext, DispatchError> {
        let pipeline = build_pipeline(&self.interceptors, &invocation.chain);
        let env = PipelineEnv {
            i18n: &self.i18n,
            global_flags: &self.global_flags,
            events: &self.events,
            error_handlers: &self.error_handlers,
            config_loader: self.config_loader.as_ref(),
        };

        let mut context = invocation.context.clone();
        pipeline.run(&env, &mut context).await?;
        Ok(context)
    }

    /// Resolves `request` and, unless it asks not to, runs it.
    ///
    /// Resolution errors are reported exactly like pipeline errors: they go to
    /// the error handlers, or back to the caller when none are registered.
    /// Returns `Ok(None)` when a handler took a resolution error.
    pub async fn parse(
        &self,
        request: impl Into<ParseRequest>,
    ) -> Result<Option<ResolvedInvocation>, DispatchError> {
        let request = request.into();
        log::debug!("Dispatching {:?} (run: {})", request.argv, request.run);

        let invocation = match self.resolve(&request.argv) {
            Ok(invocation) => invocation,
            Err(err) => {
                report_error(err, &self.events, &self.error_handlers).await?;
                return Ok(None);
            }
        };

        if request.run {
            self.execute(&invocation).await?;
        }
        Ok(Some(invocation))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.tree.len())
            .field("global_flags", &self.global_flags.keys().collect::<Vec<_>>())
            .field("interceptors", &self.interceptors.len())
            .field("error_handlers", &self.error_handlers.len())
            .field("events", &self.events)
            .field("locale", &self.i18n.locale())
            .field("flag_parser", &self.flag_parser)
            .field("config_loader", &self.config_loader)
            .finish()
    }
}

/// An argument vector plus whether to run it once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequest {
    /// Arguments without the program name.
    pub argv: Vec<String>,
    /// `false` stops after resolution and validation.
    pub run: bool,
}

impl ParseRequest {
    /// A request that runs once resolved.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            run: true,
        }
    }

    /// Whether to run the pipeline after resolving.
    pub fn run(mut self, run: bool) -> Self {
        self.run = run;
        self
    }
}

impl From<Vec<String>> for ParseRequest {
    fn from(argv: Vec<String>) -> Self {
        Self::new(argv)
    }
}

impl From<Vec<&str>> for ParseRequest {
    fn from(argv: Vec<&str>) -> Self {
        Self::new(argv)
    }
}

impl From<&[&str]> for ParseRequest {
    fn from(argv: &[&str]) -> Self {
        Self::new(argv.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for ParseRequest {
    fn from(argv: [&str; N]) -> Self {
        Self::new(argv)
    }
}

/// The outcome of resolving one argument vector. Immutable; running it does
/// not change it.
#[derive(Debug, Clone)]
pub struct ResolvedInvocation {
    registry: Registry,
    chain: Vec<Arc<CommandNode>>,
    path: Option<String>,
    context: PipelineContext,
}

impl ResolvedInvocation {
    /// Dotted path of the matched command. `None` for a flags-only
    /// invocation, the root sentinel for the root fallback.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The invocation fell back to the root's process.
    pub fn is_root(&self) -> bool {
        self.path.as_deref() == Some(ROOT_SENTINEL)
    }

    /// `true` when no command will run.
    pub fn is_noop(&self) -> bool {
        self.chain.is_empty()
    }

    /// Root → leaf.
    pub fn chain(&self) -> &[Arc<CommandNode>] {
        &self.chain
    }

    /// Names of the non-root commands in the chain, root → leaf.
    pub fn chain_names(&self) -> Vec<&str> {
        self.chain
            .iter()
            .filter(|node| !node.is_root())
            .map(|node| node.name.as_str())
            .collect()
    }

    /// The event the matched command emits on success.
    pub fn event_name(&self) -> Option<String> {
        if self.is_root() {
            return self.path.clone();
        }
        let names = self.chain_names();
        (!names.is_empty()).then(|| names.join(PATH_SEPARATOR))
    }

    /// The registry the invocation was resolved against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The pipeline context the invocation starts from.
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, models::FlagValues};
    use serde_json::json;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    fn to_argv(params: &[&str]) -> Vec<String> {
        params.iter().map(|s| s.to_string()).collect()
    }

    fn sample_dispatcher() -> Dispatcher {
        Dispatcher::new(
            Command::root().subcommand(
                Command::new("build")
                    .flag("projectCwd", FlagDef::string().default_value("user/project/foo"))
                    .process(|_| async { Ok(()) })
                    .subcommand(Command::new("evolve").process(|_| async { Ok(()) })),
            ),
        )
        .locale("en")
        .global_flag("verbose", FlagDef::boolean().alias("v"))
    }

    #[test]
    fn test_resolve_builds_an_immutable_invocation() {
        let dispatcher = sample_dispatcher();
        let invocation = dispatcher
            .resolve(&to_argv(&["build", "evolve", "-v"]))
            .unwrap();

        assert_eq!(invocation.path(), Some("build.evolve"));
        assert_eq!(invocation.chain_names(), vec!["build", "evolve"]);
        assert_eq!(invocation.event_name().as_deref(), Some("build.evolve"));
        assert_eq!(invocation.context().args, vec!["build", "evolve"]);
        assert_eq!(invocation.context().flags.get("verbose"), Some(&json!(true)));
        assert_eq!(invocation.registry().len(), 3);
        assert!(!invocation.is_noop());
    }

    #[test]
    fn test_flags_only_invocation_is_a_noop() {
        let dispatcher = sample_dispatcher();
        let invocation = dispatcher.resolve(&to_argv(&["--verbose"])).unwrap();
        assert!(invocation.is_noop());
        assert_eq!(invocation.path(), None);
        assert_eq!(invocation.event_name(), None);
    }

    #[test]
    fn test_root_fallback_checks_required_flags() {
        let dispatcher = Dispatcher::new(Command::root().process(|_| async { Ok(()) }))
            .global_flag("token", FlagDef::string().required());

        let err = dispatcher.resolve(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandFlagNotProvided);

        let invocation = dispatcher
            .resolve(&to_argv(&["--token", "abc"]))
            .unwrap();
        assert!(invocation.is_root());
        assert_eq!(invocation.event_name().as_deref(), Some(ROOT_SENTINEL));
    }

    #[tokio::test]
    async fn test_parse_without_run_does_not_execute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dispatcher = Dispatcher::new(Command::root().subcommand(
            Command::new("info").process(move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        ));

        let invocation = dispatcher
            .parse(ParseRequest::new(["info"]).run(false))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invocation.path(), Some("info"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        dispatcher.execute(&invocation).await.unwrap();
        dispatcher.parse(["info"]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolution_errors_reach_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let dispatcher = sample_dispatcher().register_error_handler(move |err| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().unwrap().push(err.kind()) }
        });

        let outcome = dispatcher.parse(["nonexistent"]).await.unwrap();
        assert!(outcome.is_none());
        assert_eq!(*seen.lock().unwrap(), vec![ErrorKind::CommandNotFound]);
    }

    #[tokio::test]
    async fn test_interceptor_sees_global_flags_only() {
        let seen: Arc<Mutex<Option<FlagValues>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let dispatcher = sample_dispatcher().interceptor(move |args: InterceptorArgs| {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock().unwrap() = Some(args.flags);
                Ok(Control::Next)
            }
        });

        dispatcher.parse(["build", "--verbose"]).await.unwrap();
        let flags = seen.lock().unwrap().clone().unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags.get("verbose"), Some(&json!(true)));
    }

    #[test]
    fn test_messages_extend_the_catalog() {
        let dispatcher = sample_dispatcher().messages("en", [("app.hello", "Hello {who}")]);
        assert_eq!(
            dispatcher.i18n().translate("app.hello", &[("who", "there")]),
            "Hello there"
        );
    }

    #[test]
    fn test_dispatcher_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dispatcher>();
        assert_send_sync::<ResolvedInvocation>();
    }
}
