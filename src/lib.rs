pub mod dedup;
pub mod error;
pub mod hooks;
pub mod observable;
pub mod replay;

// Re-export the public surface at the crate root
pub use dedup::RequestCache;
pub use error::{StreamError, StreamResult};
pub use hooks::{on_unhandled_error, reset_unhandled_error_handler};
pub use observable::{Cleanup, Observable, Observer, Sink, Subscription};
pub use replay::ReplaySubject;
