//! Concurrent flattening: `merge_map`.

use std::sync::{Arc, Mutex};

use crate::error::StreamError;
use crate::observable::core::{Cleanup, Observable, Observer, Subscription};

struct MergeState {
    /// Outstanding completions: the outer stream plus every live inner one.
    live: usize,
    subscriptions: Vec<Subscription>,
}

impl<T: Send + 'static> Observable<T> {
    /// Map every value to an inner observable and merge all of them.
    ///
    /// Inner observables are subscribed as their values arrive and run
    /// concurrently, without any cap or backpressure; every inner `next` is
    /// forwarded immediately in whatever order it fires. The merged stream
    /// completes only once the outer stream and all inner streams have
    /// completed. An outer error passes straight through without waiting for
    /// the inners; an `Err` from `f` terminates the stream tagged as thrown.
    /// Unsubscribing tears down the outer subscription and every live inner
    /// one.
    pub fn merge_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<Observable<U>, StreamError> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Observable::create(move |sink| {
            let f = Arc::clone(&f);
            let state = Arc::new(Mutex::new(MergeState {
                live: 1,
                subscriptions: Vec::new(),
            }));

            let spawn_sink = sink.clone();
            let spawn_state = Arc::clone(&state);
            let error_sink = sink.clone();
            let complete_sink = sink.clone();
            let complete_state = Arc::clone(&state);

            let outer = upstream.subscribe(
                Observer::new()
                    .on_next(move |value| {
                        let inner = match f(value) {
                            Ok(inner) => inner,
                            Err(error) => {
                                spawn_sink.error(error, true);
                                return;
                            }
                        };
                        spawn_state.lock().unwrap().live += 1;
                        let inner_next = spawn_sink.clone();
                        let inner_error = spawn_sink.clone();
                        let inner_complete = spawn_sink.clone();
                        let inner_state = Arc::clone(&spawn_state);
                        let inner_subscription = inner.subscribe(
                            Observer::new()
                                .on_next(move |value| inner_next.next(value))
                                .on_error(move |error| inner_error.error(error, false))
                                .on_complete(move || {
                                    let all_done = {
                                        let mut state = inner_state.lock().unwrap();
                                        state.live -= 1;
                                        state.live == 0
                                    };
                                    if all_done {
                                        inner_complete.complete();
                                    }
                                }),
                        );
                        spawn_state
                            .lock()
                            .unwrap()
                            .subscriptions
                            .push(inner_subscription);
                    })
                    .on_error(move |error| error_sink.error(error, false))
                    .on_complete(move || {
                        let all_done = {
                            let mut state = complete_state.lock().unwrap();
                            state.live -= 1;
                            state.live == 0
                        };
                        if all_done {
                            complete_sink.complete();
                        }
                    }),
            );

            Ok(Cleanup::Call(Box::new(move || {
                outer.unsubscribe();
                let inner_subscriptions = std::mem::take(&mut state.lock().unwrap().subscriptions);
                for subscription in inner_subscriptions {
                    subscription.unsubscribe();
                }
            })))
        })
    }
}
