//! Process-wide unhandled-error hook.
//!
//! Errors that reach a subscription with no `on_error` callback, or that
//! arrive after the subscription has already closed, are not silently
//! swallowed: they are routed here. The hook is a single replaceable handler
//! for the whole process, not a per-subscription setting.

use std::sync::{Arc, RwLock};

use crate::error::StreamError;

/// Handler invoked for every unhandled stream error. The flag is true when
/// the error came out of a user-supplied fallible function ("thrown") rather
/// than the `error` channel.
pub type UnhandledErrorHandler = Arc<dyn Fn(&StreamError, bool) + Send + Sync>;

lazy_static::lazy_static! {
    static ref HANDLER: RwLock<UnhandledErrorHandler> =
        RwLock::new(Arc::new(default_handler) as UnhandledErrorHandler);
}

fn default_handler(error: &StreamError, is_uncaught_thrown_error: bool) {
    if is_uncaught_thrown_error {
        log::error!("uncaught error in stream callback: {}", error);
    } else {
        log::warn!("unhandled stream error: {}", error);
    }
}

/// Replace the process-wide unhandled-error handler.
///
/// The default handler logs: `error` level for thrown errors, `warn` for
/// emitted ones. Reassignment is serialized internally, but installing a
/// handler while streams are emitting on other threads means in-flight errors
/// may still reach the previous handler.
pub fn on_unhandled_error<F>(handler: F)
where
    F: Fn(&StreamError, bool) + Send + Sync + 'static,
{
    *HANDLER.write().unwrap() = Arc::new(handler);
}

/// Restore the default logging handler.
pub fn reset_unhandled_error_handler() {
    *HANDLER.write().unwrap() = Arc::new(default_handler) as UnhandledErrorHandler;
}

// The handler is cloned out before invocation so a handler may itself call
// on_unhandled_error without deadlocking.
pub(crate) fn handle_unhandled_error(error: &StreamError, is_uncaught_thrown_error: bool) {
    let handler = Arc::clone(&*HANDLER.read().unwrap());
    handler(error, is_uncaught_thrown_error);
}
