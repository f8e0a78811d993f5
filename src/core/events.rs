// src/core/events.rs

//! Success events, error listeners and the error reporting stage.

use crate::{
    error::DispatchError,
    models::{BoxFuture, ProcessArgs},
};
use std::{collections::HashMap, fmt, future::Future, sync::Arc};

/// Called after a command's process returned successfully.
pub type Listener = Arc<dyn Fn(&ProcessArgs) + Send + Sync>;

/// Called for every error that reaches the reporting stage.
pub type ErrorListener = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// An error handler. Handlers run in registration order and are awaited.
pub type ErrorHandler = Arc<dyn Fn(Arc<DispatchError>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure as an [`ErrorHandler`].
pub fn error_handler<F, Fut>(f: F) -> ErrorHandler
where
    F: Fn(Arc<DispatchError>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |err| -> BoxFuture<'static, ()> { Box::pin(f(err)) })
}

/// Subscriptions keyed by dotted event name.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: HashMap<String, Vec<Listener>>,
    error_listeners: Vec<ErrorListener>,
}

impl EventBus {
    /// Subscribes to the success event of one command, by dotted path.
    pub fn on<F>(&mut self, event: impl Into<String>, listener: F)
    where
        F: Fn(&ProcessArgs) + Send + Sync + 'static,
    {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Arc::new(listener));
    }

    /// Subscribes to every reported error.
    pub fn on_error<F>(&mut self, listener: F)
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        self.error_listeners.push(Arc::new(listener));
    }

    /// Notifies every listener of `event`. Returns how many were called.
    pub fn emit(&self, event: &str, args: &ProcessArgs) -> usize {
        let Some(listeners) = self.listeners.get(event) else {
            log::trace!("No listeners for '{}'", event);
            return 0;
        };
        for listener in listeners {
            listener(args);
        }
        listeners.len()
    }

    /// Notifies every error listener.
    pub fn emit_error(&self, err: &DispatchError) {
        for listener in &self.error_listeners {
            listener(err);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.listeners.keys().collect::<Vec<_>>())
            .field("error_listeners", &self.error_listeners.len())
            .finish()
    }
}

/// Hands `err` to the registered handlers.
///
/// The error is logged at its severity and announced to error listeners
/// first. With no handlers registered it is returned to the caller; it is
/// never dropped silently.
pub async fn report_error(
    err: DispatchError,
    events: &EventBus,
    handlers: &[ErrorHandler],
) -> Result<(), DispatchError> {
    log::log!(err.severity(), "{}", err);
    events.emit_error(&err);

    if handlers.is_empty() {
        return Err(err);
    }

    let err = Arc::new(err);
    for handler in handlers {
        handler(Arc::clone(&err)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, i18n::I18n, models::CommandInfo};
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    fn args() -> ProcessArgs {
        let i18n = Arc::new(I18n::new("en"));
        ProcessArgs {
            info: CommandInfo::default(),
            locale: i18n.locale().to_string(),
            i18n,
            ctx: None,
            flags: Default::default(),
            unknown_flags: Default::default(),
            eof_args: Vec::new(),
        }
    }

    #[test]
    fn test_emit_reaches_only_matching_listeners() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::default();
        let counter = Arc::clone(&hits);
        bus.on("build.evolve", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.emit("build.evolve", &args()), 1);
        assert_eq!(bus.emit("build", &args()), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_report_error_without_handlers_propagates() {
        let bus = EventBus::default();
        let err = report_error(DispatchError::CommandNotConfigured, &bus, &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommandNotConfigured);
    }

    #[tokio::test]
    async fn test_report_error_runs_handlers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers: Vec<ErrorHandler> = (0..3)
            .map(|n| {
                let seen = Arc::clone(&seen);
                error_handler(move |err: Arc<DispatchError>| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().unwrap().push((n, err.kind()));
                    }
                })
            })
            .collect();

        let mut bus = EventBus::default();
        let announced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&announced);
        bus.on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = DispatchError::CommandNotFound {
            name: "nope".to_string(),
        };
        assert!(report_error(err, &bus, &handlers).await.is_ok());
        assert_eq!(announced.load(Ordering::SeqCst), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (0, ErrorKind::CommandNotFound),
                (1, ErrorKind::CommandNotFound),
                (2, ErrorKind::CommandNotFound)
            ]
        );
    }
}
