//! Core observable types and the subscribe state machine.
//!
//! An [`Observable`] is an immutable, reusable description of how to produce
//! a sequence of values over time. Subscribing runs the description: the
//! source function receives a write-side [`Sink`], the caller receives a
//! [`Subscription`], and both share a single `closed` flag. Everything else
//! in this crate (combinators, the replay subject, the request cache) is
//! built on `create` + `subscribe`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::StreamError;
use crate::hooks;

type SourceFn<T> = dyn Fn(Sink<T>) -> Result<Cleanup, StreamError> + Send + Sync;

type StartFn = Box<dyn FnMut(&Subscription) + Send>;
type NextFn<T> = Box<dyn FnMut(T) + Send>;
type ErrorFn = Box<dyn FnMut(StreamError) + Send>;
type CompleteFn = Box<dyn FnMut() + Send>;
type UnsubscribeFn = Box<dyn FnMut(&Subscription) + Send>;

/// Resource teardown returned by a source function.
///
/// The source may have nothing to release, a closure to run, or an inner
/// subscription to cancel. Whichever it is, the core runs it exactly once per
/// subscription, on the first of complete, error or unsubscribe.
pub enum Cleanup {
    /// Nothing to release
    None,
    /// Run a closure on teardown
    Call(Box<dyn FnOnce() + Send>),
    /// Cancel an inner subscription on teardown
    Unsubscribe(Subscription),
}

impl Cleanup {
    fn run(self) {
        match self {
            Cleanup::None => {}
            Cleanup::Call(f) => f(),
            Cleanup::Unsubscribe(subscription) => subscription.unsubscribe(),
        }
    }
}

impl From<Subscription> for Cleanup {
    fn from(subscription: Subscription) -> Self {
        Cleanup::Unsubscribe(subscription)
    }
}

/// Tracks whether the per-subscription cleanup has been handed over by the
/// source yet, and whether a terminal event already asked for it to run.
enum CleanupPhase {
    /// Source still running, nothing to tear down yet
    Pending,
    /// A terminal/unsubscribe fired before the source returned its cleanup
    Fired,
    /// Cleanup stored, waiting for a terminal event
    Armed(Cleanup),
    /// Cleanup has run (or was consumed); nothing left to do
    Done,
}

struct SubscriptionCore {
    closed: AtomicBool,
    cleanup: Mutex<CleanupPhase>,
    on_unsubscribe: Mutex<Option<UnsubscribeFn>>,
}

fn arm_cleanup(core: &SubscriptionCore, cleanup: Cleanup) {
    let mut phase = core.cleanup.lock().unwrap();
    match std::mem::replace(&mut *phase, CleanupPhase::Done) {
        // Normal path: subscription still live when the source returned.
        CleanupPhase::Pending => *phase = CleanupPhase::Armed(cleanup),
        // The sink closed while the source was still running; run the
        // freshly returned cleanup now, outside the lock.
        CleanupPhase::Fired => {
            drop(phase);
            cleanup.run();
        }
        CleanupPhase::Armed(previous) => *phase = CleanupPhase::Armed(previous),
        CleanupPhase::Done => {}
    }
}

fn settle_cleanup(core: &SubscriptionCore) {
    let mut phase = core.cleanup.lock().unwrap();
    match std::mem::replace(&mut *phase, CleanupPhase::Done) {
        CleanupPhase::Pending => *phase = CleanupPhase::Fired,
        CleanupPhase::Armed(cleanup) => {
            drop(phase);
            cleanup.run();
        }
        CleanupPhase::Fired => *phase = CleanupPhase::Fired,
        CleanupPhase::Done => {}
    }
}

/// Caller-held handle to an active stream execution.
///
/// `unsubscribe` is idempotent and synchronous. Dropping a `Subscription`
/// does not cancel anything: cancellation is always an explicit call, so
/// handles can be stashed, cloned or discarded freely while the stream runs
/// to completion.
pub struct Subscription {
    core: Arc<SubscriptionCore>,
}

impl Clone for Subscription {
    fn clone(&self) -> Self {
        Subscription {
            core: Arc::clone(&self.core),
        }
    }
}

impl Subscription {
    /// Cancel the execution this handle belongs to.
    ///
    /// The first call marks the subscription closed, invokes the observer's
    /// `on_unsubscribe` callback and runs the source's cleanup; every later
    /// call is a no-op.
    pub fn unsubscribe(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = self.core.on_unsubscribe.lock().unwrap().take();
        if let Some(mut callback) = callback {
            callback(self);
        }
        settle_cleanup(&self.core);
    }

    /// True once the execution has completed, errored or been unsubscribed.
    pub fn closed(&self) -> bool {
        self.core.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.closed())
            .finish()
    }
}

struct CallbackSlots<T> {
    next: Mutex<Option<NextFn<T>>>,
    error: Mutex<Option<ErrorFn>>,
    complete: Mutex<Option<CompleteFn>>,
}

/// Write-side handle passed to a source function.
///
/// Events are delivered synchronously, in the calling stack, to the observer
/// of this execution. Once the sink is closed, by a terminal event or by the
/// subscriber unsubscribing, `next` and `complete` become no-ops and `error`
/// is routed to the process-wide unhandled-error hook instead.
pub struct Sink<T> {
    core: Arc<SubscriptionCore>,
    slots: Arc<CallbackSlots<T>>,
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Sink {
            core: Arc::clone(&self.core),
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> Sink<T> {
    /// Emit a value. No-op once the sink is closed.
    pub fn next(&self, value: T) {
        if self.closed() {
            return;
        }
        // The callback is taken out of its slot for the duration of the call
        // so delivery never runs under a lock.
        let callback = self.slots.next.lock().unwrap().take();
        if let Some(mut callback) = callback {
            callback(value);
            *self.slots.next.lock().unwrap() = Some(callback);
        }
    }

    /// Terminate the stream with an error.
    ///
    /// `is_uncaught_thrown_error` tags errors that came out of a fallible
    /// user function rather than being emitted deliberately; the flag is
    /// forwarded to the unhandled-error hook when no `on_error` callback is
    /// present, or when the sink is already closed.
    pub fn error(&self, error: StreamError, is_uncaught_thrown_error: bool) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            hooks::handle_unhandled_error(&error, is_uncaught_thrown_error);
            return;
        }
        let callback = self.slots.error.lock().unwrap().take();
        match callback {
            Some(mut callback) => callback(error),
            None => hooks::handle_unhandled_error(&error, is_uncaught_thrown_error),
        }
        settle_cleanup(&self.core);
    }

    /// Terminate the stream successfully. No-op once the sink is closed.
    pub fn complete(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = self.slots.complete.lock().unwrap().take();
        if let Some(mut callback) = callback {
            callback();
        }
        settle_cleanup(&self.core);
    }

    /// True once a terminal event has fired or the subscriber unsubscribed.
    pub fn closed(&self) -> bool {
        self.core.closed.load(Ordering::SeqCst)
    }
}

/// Caller-supplied event callbacks, every one of them optional.
///
/// Lifecycle: `on_start` (once, synchronously, before the source runs), then
/// zero or more `on_next`, then exactly one of `on_error`/`on_complete`, or
/// `on_unsubscribe` if the caller cancels first.
pub struct Observer<T> {
    pub(crate) start: Option<StartFn>,
    pub(crate) next: Option<NextFn<T>>,
    pub(crate) error: Option<ErrorFn>,
    pub(crate) complete: Option<CompleteFn>,
    pub(crate) unsubscribe: Option<UnsubscribeFn>,
}

impl<T> Default for Observer<T> {
    fn default() -> Self {
        Observer {
            start: None,
            next: None,
            error: None,
            complete: None,
            unsubscribe: None,
        }
    }
}

impl<T> Observer<T> {
    /// An observer with no callbacks. Emitted errors on such an observer are
    /// unhandled and go to the process-wide hook.
    pub fn new() -> Self {
        Observer::default()
    }

    /// Called once with the subscription handle, before the source runs.
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Subscription) + Send + 'static,
    {
        self.start = Some(Box::new(f));
        self
    }

    /// Called for every emitted value.
    pub fn on_next<F>(mut self, f: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        self.next = Some(Box::new(f));
        self
    }

    /// Called at most once, with the terminal error.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnMut(StreamError) + Send + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    /// Called at most once, on successful completion.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.complete = Some(Box::new(f));
        self
    }

    /// Called at most once, when the caller cancels the subscription.
    /// Terminal events do not trigger it.
    pub fn on_unsubscribe<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Subscription) + Send + 'static,
    {
        self.unsubscribe = Some(Box::new(f));
        self
    }
}

/// An immutable, reusable description of an asynchronous value sequence.
///
/// The observable holds exactly one thing: a source function. Every call to
/// [`subscribe`](Observable::subscribe) invokes the source with a fresh
/// [`Sink`], producing an independent execution: no state is shared between
/// subscriptions, and cloning an observable is cheap (the source is shared
/// behind an `Arc`).
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use pushstream::{Cleanup, Observable, Observer};
///
/// let numbers = Observable::create(|sink| {
///     sink.next(1);
///     sink.next(2);
///     sink.complete();
///     Ok(Cleanup::None)
/// });
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink_log = Arc::clone(&seen);
/// numbers.subscribe(Observer::new().on_next(move |n| sink_log.lock().unwrap().push(n)));
///
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
/// ```
pub struct Observable<T> {
    source: Arc<SourceFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Observable {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Wrap a source function into an observable.
    ///
    /// The source receives the sink for one execution and may emit any number
    /// of `next` events followed by at most one terminal event. It returns
    /// the teardown for resources it acquired ([`Cleanup::None`] when there
    /// are none), or an `Err`, which the core converts into
    /// `sink.error(e, true)` exactly as if the source had failed mid-flight.
    pub fn create<F>(source: F) -> Self
    where
        F: Fn(Sink<T>) -> Result<Cleanup, StreamError> + Send + Sync + 'static,
    {
        Observable {
            source: Arc::new(source),
        }
    }

    /// Run this observable with the given observer.
    ///
    /// `on_start` is invoked synchronously before the source runs; if it
    /// unsubscribes, the source is never invoked. The source itself runs
    /// synchronously inside this call, so a synchronous source delivers all
    /// of its events before `subscribe` returns. The returned handle is the
    /// only way to cancel the execution.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let Observer {
            start,
            next,
            error,
            complete,
            unsubscribe,
        } = observer;

        let core = Arc::new(SubscriptionCore {
            closed: AtomicBool::new(false),
            cleanup: Mutex::new(CleanupPhase::Pending),
            on_unsubscribe: Mutex::new(unsubscribe),
        });
        let subscription = Subscription {
            core: Arc::clone(&core),
        };

        if let Some(mut start) = start {
            start(&subscription);
            if subscription.closed() {
                return subscription;
            }
        }

        let sink = Sink {
            core: Arc::clone(&core),
            slots: Arc::new(CallbackSlots {
                next: Mutex::new(next),
                error: Mutex::new(error),
                complete: Mutex::new(complete),
            }),
        };

        match (self.source)(sink.clone()) {
            Ok(cleanup) => arm_cleanup(&core, cleanup),
            Err(error) => sink.error(error, true),
        }

        subscription
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}
