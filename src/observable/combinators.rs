//! Sequential combinators: `map`, `catch`, `concat`, `if_empty`.
//!
//! Every combinator is expressed through `create` + `subscribe` on the
//! upstream observable. Per-subscription state lives inside the source
//! closure, so the combinator result is as reusable as any other observable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::StreamError;
use crate::observable::core::{Cleanup, Observable, Observer, Sink, Subscription};

/// Observer that forwards all three channels of one leg into `sink`.
pub(crate) fn forward_observer<T: Send + 'static>(sink: &Sink<T>) -> Observer<T> {
    let next_sink = sink.clone();
    let error_sink = sink.clone();
    let complete_sink = sink.clone();
    Observer::new()
        .on_next(move |value| next_sink.next(value))
        .on_error(move |error| error_sink.error(error, false))
        .on_complete(move || complete_sink.complete())
}

/// Store the first leg's subscription unless a synchronous handoff already
/// installed its successor.
fn install_active(active: &Mutex<Option<Subscription>>, subscription: Subscription) {
    let mut slot = active.lock().unwrap();
    if slot.is_none() {
        *slot = Some(subscription);
    }
}

/// Teardown for combinators that keep exactly one leg live at a time.
fn teardown_active(active: Arc<Mutex<Option<Subscription>>>) -> Cleanup {
    Cleanup::Call(Box::new(move || {
        if let Some(subscription) = active.lock().unwrap().take() {
            subscription.unsubscribe();
        }
    }))
}

impl<T: Send + 'static> Observable<T> {
    /// Transform every value with a fallible function.
    ///
    /// `error` and `complete` pass through untouched. An `Err` from `f`
    /// terminates the stream with that error, tagged as thrown; values
    /// emitted before the failure are unaffected.
    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U, StreamError> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Observable::create(move |sink| {
            let f = Arc::clone(&f);
            let next_sink = sink.clone();
            let error_sink = sink.clone();
            let complete_sink = sink.clone();
            let subscription = upstream.subscribe(
                Observer::new()
                    .on_next(move |value| match f(value) {
                        Ok(mapped) => next_sink.next(mapped),
                        Err(error) => next_sink.error(error, true),
                    })
                    .on_error(move |error| error_sink.error(error, false))
                    .on_complete(move || complete_sink.complete()),
            );
            Ok(Cleanup::Unsubscribe(subscription))
        })
    }

    /// Recover from an upstream error by switching to a replacement stream.
    ///
    /// On upstream `error`, `f` produces the replacement, which is subscribed
    /// in place and forwarded as if it were the original stream, so a
    /// replacement that errors can itself be wrapped in another `catch`. An
    /// `Err` from `f` terminates the result with that error, tagged as
    /// thrown. Values and `complete` pass through untouched.
    pub fn catch<F>(&self, f: F) -> Observable<T>
    where
        F: Fn(StreamError) -> Result<Observable<T>, StreamError> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Observable::create(move |sink| {
            let f = Arc::clone(&f);
            let active = Arc::new(Mutex::new(None::<Subscription>));
            let next_sink = sink.clone();
            let complete_sink = sink.clone();
            let recover_sink = sink.clone();
            let recover_slot = Arc::clone(&active);
            let first = upstream.subscribe(
                Observer::new()
                    .on_next(move |value| next_sink.next(value))
                    .on_complete(move || complete_sink.complete())
                    .on_error(move |error| match f(error) {
                        Ok(replacement) => {
                            let continuation =
                                replacement.subscribe(forward_observer(&recover_sink));
                            *recover_slot.lock().unwrap() = Some(continuation);
                        }
                        Err(error) => recover_sink.error(error, true),
                    }),
            );
            install_active(&active, first);
            Ok(teardown_active(active))
        })
    }

    /// Emit this stream's values, then `next`'s values once this completes.
    ///
    /// An upstream error terminates the whole chain without ever starting
    /// `next`. Unsubscribing tears down whichever leg is currently active.
    pub fn concat(&self, next: Observable<T>) -> Observable<T> {
        let upstream = self.clone();
        Observable::create(move |sink| {
            let active = Arc::new(Mutex::new(None::<Subscription>));
            let next = next.clone();
            let next_sink = sink.clone();
            let error_sink = sink.clone();
            let handoff_sink = sink.clone();
            let handoff_slot = Arc::clone(&active);
            let first = upstream.subscribe(
                Observer::new()
                    .on_next(move |value| next_sink.next(value))
                    .on_error(move |error| error_sink.error(error, false))
                    .on_complete(move || {
                        let continuation = next.subscribe(forward_observer(&handoff_sink));
                        *handoff_slot.lock().unwrap() = Some(continuation);
                    }),
            );
            install_active(&active, first);
            Ok(teardown_active(active))
        })
    }

    /// Fall back to `alternate` if this stream completes without emitting.
    ///
    /// If at least one value arrived before `complete`, the result behaves
    /// identically to this stream and `alternate` is never subscribed.
    pub fn if_empty(&self, alternate: Observable<T>) -> Observable<T> {
        let upstream = self.clone();
        Observable::create(move |sink| {
            let active = Arc::new(Mutex::new(None::<Subscription>));
            let got_value = Arc::new(AtomicBool::new(false));
            let alternate = alternate.clone();
            let seen = Arc::clone(&got_value);
            let next_sink = sink.clone();
            let error_sink = sink.clone();
            let handoff_sink = sink.clone();
            let handoff_slot = Arc::clone(&active);
            let first = upstream.subscribe(
                Observer::new()
                    .on_next(move |value| {
                        seen.store(true, Ordering::SeqCst);
                        next_sink.next(value);
                    })
                    .on_error(move |error| error_sink.error(error, false))
                    .on_complete(move || {
                        if got_value.load(Ordering::SeqCst) {
                            handoff_sink.complete();
                        } else {
                            let continuation =
                                alternate.subscribe(forward_observer(&handoff_sink));
                            *handoff_slot.lock().unwrap() = Some(continuation);
                        }
                    }),
            );
            install_active(&active, first);
            Ok(teardown_active(active))
        })
    }
}
