//! Observable constructors.
//!
//! Each constructor covers one input shape: a plain value, a future, or
//! nothing at all. An existing [`Observable`] needs no wrapping: cloning it
//! is the identity conversion.

use std::future::Future;

use futures::FutureExt;

use crate::error::StreamError;
use crate::observable::core::{Cleanup, Observable};

impl<T: Send + 'static> Observable<T> {
    /// An observable that completes immediately without emitting.
    pub fn empty() -> Observable<T> {
        Observable::create(|sink| {
            sink.complete();
            Ok(Cleanup::None)
        })
    }

    /// Emit a single value, then complete, synchronously on subscribe.
    ///
    /// The value is emitted as a value no matter what it is: a
    /// [`StreamError`] passed here travels the `next` channel, not the
    /// `error` channel.
    pub fn from_value(value: T) -> Observable<T>
    where
        T: Clone + Sync,
    {
        Observable::create(move |sink| {
            sink.next(value.clone());
            sink.complete();
            Ok(Cleanup::None)
        })
    }

    /// Bridge a future into an observable.
    ///
    /// The future is shared, so every subscription observes the same single
    /// execution. Delivery always happens on a Tokio task: `next` followed by
    /// `complete` on `Ok`, `error` (tagged as thrown) on `Err`, never
    /// synchronously inside `subscribe`. Unsubscribing aborts the delivery
    /// task; the future itself keeps running for any other subscribers.
    ///
    /// Requires a Tokio runtime.
    pub fn from_future<Fut>(future: Fut) -> Observable<T>
    where
        T: Clone + Sync,
        Fut: Future<Output = Result<T, StreamError>> + Send + 'static,
    {
        let shared = future.shared();
        Observable::create(move |sink| {
            let future = shared.clone();
            let handle = tokio::spawn(async move {
                match future.await {
                    Ok(value) => {
                        sink.next(value);
                        sink.complete();
                    }
                    Err(error) => sink.error(error, true),
                }
            });
            Ok(Cleanup::Call(Box::new(move || handle.abort())))
        })
    }
}
