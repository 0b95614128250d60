//! Replay multicast subject.
//!
//! A [`ReplaySubject`] records every event pushed into it and replays the
//! full log, synchronously and in order, to each new subscriber before that
//! subscriber starts receiving live events. The request cache uses it to fan
//! one underlying fetch out to any number of late-joining callers.

use std::sync::{Arc, Mutex};

use crate::error::StreamError;
use crate::observable::{Cleanup, Observable, Observer, Sink, Subscription};

#[derive(Clone)]
enum ReplayEvent<T> {
    Next(T),
    Error(StreamError),
    Complete,
}

fn deliver<T>(sink: &Sink<T>, event: ReplayEvent<T>) {
    match event {
        ReplayEvent::Next(value) => sink.next(value),
        ReplayEvent::Error(error) => sink.error(error, false),
        ReplayEvent::Complete => sink.complete(),
    }
}

struct ReplayInner<T> {
    events: Vec<ReplayEvent<T>>,
    sinks: Vec<(u64, Sink<T>)>,
    next_sink_id: u64,
    terminated: bool,
}

/// Multi-subscriber subject with full-history replay.
///
/// `next`/`error`/`complete` append to an internal log and broadcast to every
/// live subscriber in registration order; after a terminal event they become
/// no-ops. Clones share the same subject.
pub struct ReplaySubject<T> {
    inner: Arc<Mutex<ReplayInner<T>>>,
    observable: Observable<T>,
}

impl<T> Clone for ReplaySubject<T> {
    fn clone(&self) -> Self {
        ReplaySubject {
            inner: Arc::clone(&self.inner),
            observable: self.observable.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ReplaySubject<T> {
    pub fn new() -> Self {
        let inner = Arc::new(Mutex::new(ReplayInner {
            events: Vec::new(),
            sinks: Vec::new(),
            next_sink_id: 0,
            terminated: false,
        }));
        let source_inner = Arc::clone(&inner);
        let observable = Observable::create(move |sink| {
            let (id, backlog) = {
                let mut state = source_inner.lock().unwrap();
                let id = state.next_sink_id;
                state.next_sink_id += 1;
                state.sinks.push((id, sink.clone()));
                (id, state.events.clone())
            };
            // Synchronous catch-up for this subscriber alone. A replayed
            // terminal event (or a re-entrant unsubscribe) closes the sink;
            // stop replaying the moment that happens.
            for event in backlog {
                if sink.closed() {
                    break;
                }
                deliver(&sink, event);
            }
            let cleanup_inner = Arc::clone(&source_inner);
            Ok(Cleanup::Call(Box::new(move || {
                cleanup_inner
                    .lock()
                    .unwrap()
                    .sinks
                    .retain(|(sink_id, _)| *sink_id != id);
            })))
        });
        ReplaySubject { inner, observable }
    }

    /// Record and broadcast a value. No-op after a terminal event.
    pub fn next(&self, value: T) {
        self.publish(ReplayEvent::Next(value));
    }

    /// Record and broadcast the terminal error. No-op after a terminal event.
    pub fn error(&self, error: StreamError) {
        self.publish(ReplayEvent::Error(error));
    }

    /// Record and broadcast completion. No-op after a terminal event.
    pub fn complete(&self) {
        self.publish(ReplayEvent::Complete);
    }

    fn publish(&self, event: ReplayEvent<T>) {
        let recipients = {
            let mut inner = self.inner.lock().unwrap();
            if inner.terminated {
                return;
            }
            if !matches!(event, ReplayEvent::Next(_)) {
                inner.terminated = true;
            }
            inner.events.push(event.clone());
            // Delivery happens outside the lock so subscribers can
            // re-entrantly subscribe or unsubscribe.
            inner.sinks.clone()
        };
        for (_, sink) in recipients {
            deliver(&sink, event.clone());
        }
    }

    /// Subscribe to the subject's internally held observable: the full log
    /// replays synchronously, then live events follow.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        self.observable.subscribe(observer)
    }

    /// The subject as a plain observable.
    pub fn as_observable(&self) -> Observable<T> {
        self.observable.clone()
    }

    /// Number of currently attached live subscribers.
    pub fn observer_count(&self) -> usize {
        self.inner.lock().unwrap().sinks.len()
    }
}

impl<T: Clone + Send + 'static> Default for ReplaySubject<T> {
    fn default() -> Self {
        ReplaySubject::new()
    }
}
