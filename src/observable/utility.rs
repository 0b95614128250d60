//! Utility combinators: `inspect`, `finalize`, `poll`, `to_future`.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::oneshot;

use crate::error::StreamResult;
use crate::observable::combinators::forward_observer;
use crate::observable::core::{Cleanup, Observable, Observer, Sink, Subscription};

struct PollContext<T> {
    source: Observable<T>,
    sink: Sink<T>,
    interval: Duration,
    state: Mutex<PollState>,
}

struct PollState {
    active: Option<Subscription>,
    timer: Option<tokio::task::JoinHandle<()>>,
    stopped: bool,
}

fn poll_cycle<T: Send + 'static>(context: &Arc<PollContext<T>>) {
    if context.state.lock().unwrap().stopped {
        return;
    }
    let next_sink = context.sink.clone();
    let error_sink = context.sink.clone();
    let timer_context = Arc::clone(context);
    let subscription = context.source.subscribe(
        Observer::new()
            .on_next(move |value| next_sink.next(value))
            .on_error(move |error| error_sink.error(error, false))
            .on_complete(move || {
                let cycle_context = Arc::clone(&timer_context);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(cycle_context.interval).await;
                    poll_cycle(&cycle_context);
                });
                timer_context.state.lock().unwrap().timer = Some(handle);
            }),
    );
    let mut state = context.state.lock().unwrap();
    if state.stopped {
        drop(state);
        subscription.unsubscribe();
    } else {
        state.active = Some(subscription);
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Run side-effect callbacks before forwarding each event.
    ///
    /// The side-effect observer sees `start`, every value, the terminal
    /// event, and `unsubscribe`; values and errors are handed to it as
    /// clones, so forwarding to the real subscriber is unaffected by whatever
    /// it does with them.
    pub fn inspect(&self, observer: Observer<T>) -> Observable<T>
    where
        T: Clone,
    {
        let upstream = self.clone();
        let side = Arc::new(Mutex::new(observer));
        Observable::create(move |sink| {
            let next_sink = sink.clone();
            let error_sink = sink.clone();
            let complete_sink = sink.clone();
            let start_side = Arc::clone(&side);
            let next_side = Arc::clone(&side);
            let error_side = Arc::clone(&side);
            let complete_side = Arc::clone(&side);
            let unsubscribe_side = Arc::clone(&side);
            let subscription = upstream.subscribe(
                Observer::new()
                    .on_start(move |subscription| {
                        if let Some(callback) = start_side.lock().unwrap().start.as_mut() {
                            callback(subscription);
                        }
                    })
                    .on_next(move |value: T| {
                        if let Some(callback) = next_side.lock().unwrap().next.as_mut() {
                            callback(value.clone());
                        }
                        next_sink.next(value);
                    })
                    .on_error(move |error| {
                        if let Some(callback) = error_side.lock().unwrap().error.as_mut() {
                            callback(error.clone());
                        }
                        error_sink.error(error, false);
                    })
                    .on_complete(move || {
                        if let Some(callback) = complete_side.lock().unwrap().complete.as_mut() {
                            callback();
                        }
                        complete_sink.complete();
                    })
                    .on_unsubscribe(move |subscription| {
                        if let Some(callback) = unsubscribe_side.lock().unwrap().unsubscribe.as_mut()
                        {
                            callback(subscription);
                        }
                    }),
            );
            Ok(Cleanup::Unsubscribe(subscription))
        })
    }

    /// Call `f` exactly once per subscription, after teardown.
    ///
    /// Whatever ends the subscription (`complete`, `error` or an external
    /// `unsubscribe`), `f` runs after the underlying subscription's own
    /// cleanup has finished.
    pub fn finalize<F>(&self, f: F) -> Observable<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Observable::create(move |sink| {
            let subscription = upstream.subscribe(forward_observer(&sink));
            let f = Arc::clone(&f);
            Ok(Cleanup::Call(Box::new(move || {
                subscription.unsubscribe();
                f();
            })))
        })
    }

    /// Re-subscribe the source `interval` after every completion.
    ///
    /// Values and errors are forwarded as they occur; the polled stream never
    /// completes on its own. Unsubscribing cancels the pending timer and the
    /// active subscription. Requires a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn poll(&self, interval: Duration) -> Observable<T> {
        assert!(interval > Duration::ZERO, "poll interval must be positive");
        let upstream = self.clone();
        Observable::create(move |sink| {
            let context = Arc::new(PollContext {
                source: upstream.clone(),
                sink: sink.clone(),
                interval,
                state: Mutex::new(PollState {
                    active: None,
                    timer: None,
                    stopped: false,
                }),
            });
            poll_cycle(&context);
            Ok(Cleanup::Call(Box::new(move || {
                let (active, timer) = {
                    let mut state = context.state.lock().unwrap();
                    state.stopped = true;
                    (state.active.take(), state.timer.take())
                };
                if let Some(timer) = timer {
                    timer.abort();
                }
                if let Some(subscription) = active {
                    subscription.unsubscribe();
                }
            })))
        })
    }

    /// Resolve with the first value, `None` on empty completion, or the
    /// first error.
    ///
    /// The source is NOT cancelled when the future settles: the stream keeps
    /// running to its own terminal event. A source that never terminates
    /// yields a future that never resolves.
    pub fn to_future(&self) -> impl Future<Output = StreamResult<Option<T>>> + Send + 'static {
        let upstream = self.clone();
        async move {
            let (sender, receiver) = oneshot::channel::<StreamResult<Option<T>>>();
            let sender = Arc::new(Mutex::new(Some(sender)));
            let next_sender = Arc::clone(&sender);
            let error_sender = Arc::clone(&sender);
            let complete_sender = Arc::clone(&sender);
            let _subscription = upstream.subscribe(
                Observer::new()
                    .on_next(move |value| {
                        if let Some(sender) = next_sender.lock().unwrap().take() {
                            let _ = sender.send(Ok(Some(value)));
                        }
                    })
                    .on_error(move |error| {
                        if let Some(sender) = error_sender.lock().unwrap().take() {
                            let _ = sender.send(Err(error));
                        }
                    })
                    .on_complete(move || {
                        if let Some(sender) = complete_sender.lock().unwrap().take() {
                            let _ = sender.send(Ok(None));
                        }
                    }),
            );
            match receiver.await {
                Ok(outcome) => outcome,
                // The execution dropped its sink without a terminal event;
                // the future never settles, matching a promise that is never
                // resolved nor rejected.
                Err(_cancelled) => futures::future::pending().await,
            }
        }
    }
}
