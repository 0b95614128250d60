//! Request deduplication cache.
//!
//! [`RequestCache`] collapses concurrent identical fetches (same cache key in
//! the same cache instance) into one underlying stream execution, fanned out
//! to every caller through a replay subject.
//! One cache belongs to one environment: create a `RequestCache` per client
//! instance and hand clones (which share the same map) to its subsystems.
//! Distinct caches never share entries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::error::StreamResult;
use crate::observable::combinators::forward_observer;
use crate::observable::{Cleanup, Observable, Observer, Subscription};
use crate::replay::ReplaySubject;

struct CacheEntry<T> {
    subject: ReplaySubject<T>,
    status_subject: ReplaySubject<()>,
    subscription: Subscription,
}

type EntryMap<T> = Arc<Mutex<HashMap<String, CacheEntry<T>>>>;

/// In-flight request cache keyed by an opaque, stable identifier.
///
/// Guarantees: at most one concurrent underlying fetch per key; late
/// subscribers synchronously catch up on everything already produced; one
/// caller unsubscribing never affects the others; the underlying request is
/// cancelled only when the last interested caller has gone away. A terminal
/// event always removes the entry, so a later call with the same key starts
/// a fresh fetch, and failures never leave a poisoned entry behind.
pub struct RequestCache<T> {
    entries: EntryMap<T>,
}

impl<T> Clone for RequestCache<T> {
    fn clone(&self) -> Self {
        RequestCache {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for RequestCache<T> {
    fn default() -> Self {
        RequestCache {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Clone + Send + 'static> RequestCache<T> {
    pub fn new() -> Self {
        RequestCache::default()
    }

    /// True while a fetch for `cache_key` is in flight.
    pub fn is_in_flight(&self, cache_key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(cache_key)
    }

    /// A stream of the (possibly already running) fetch for `cache_key`.
    ///
    /// Subscribing checks the cache: on a miss, `make_stream()` is invoked
    /// and its `start` callback installs the entry synchronously, before any
    /// event can flow; on a hit, the existing entry is reused and the
    /// subscriber replays everything the fetch already produced. Either way
    /// the subscriber is attached to the entry's replay subject, never to the
    /// underlying stream directly.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    /// use pushstream::{Cleanup, Observable, Observer, RequestCache};
    ///
    /// let cache: RequestCache<i32> = RequestCache::new();
    /// let fetches = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&fetches);
    /// let stream = cache.fetch_deduped("query:42", move || {
    ///     let counter = Arc::clone(&counter);
    ///     Observable::create(move |sink| {
    ///         counter.fetch_add(1, Ordering::SeqCst);
    ///         sink.next(42);
    ///         Ok(Cleanup::None) // still in flight
    ///     })
    /// });
    ///
    /// let first = stream.subscribe(Observer::new().on_next(|n| assert_eq!(n, 42)));
    /// let second = stream.subscribe(Observer::new().on_next(|n| assert_eq!(n, 42)));
    /// assert_eq!(fetches.load(Ordering::SeqCst), 1); // one underlying fetch
    ///
    /// first.unsubscribe();
    /// second.unsubscribe(); // last caller gone: underlying request cancelled
    /// ```
    pub fn fetch_deduped<F>(&self, cache_key: impl Into<String>, make_stream: F) -> Observable<T>
    where
        F: Fn() -> Observable<T> + Send + Sync + 'static,
    {
        let entries = Arc::clone(&self.entries);
        let cache_key = cache_key.into();
        let make_stream = Arc::new(make_stream);
        Observable::create(move |sink| {
            let cached = entries
                .lock()
                .unwrap()
                .get(&cache_key)
                .map(|entry| entry.subject.clone());
            let subject = match cached {
                Some(subject) => {
                    log::debug!("request cache hit for {}", cache_key);
                    subject
                }
                None => {
                    log::debug!("request cache miss for {}, starting fetch", cache_key);
                    start_fetch(&entries, &cache_key, make_stream.as_ref())
                }
            };

            let fan_subscription = subject.subscribe(forward_observer(&sink));

            let cleanup_entries = Arc::clone(&entries);
            let cleanup_key = cache_key.clone();
            Ok(Cleanup::Call(Box::new(move || {
                fan_subscription.unsubscribe();
                // If that was the last subscriber and the fetch is still
                // running, nobody needs the replay any more: cancel the
                // underlying request and drop the entry early.
                let orphaned = {
                    let mut map = cleanup_entries.lock().unwrap();
                    let abandoned = match map.get(&cleanup_key) {
                        Some(entry) => {
                            entry.subject.observer_count() == 0 && !entry.subscription.closed()
                        }
                        None => false,
                    };
                    if abandoned {
                        map.remove(&cleanup_key)
                    } else {
                        None
                    }
                };
                if let Some(entry) = orphaned {
                    log::debug!(
                        "last subscriber left {}, cancelling underlying request",
                        cleanup_key
                    );
                    entry.subscription.unsubscribe();
                }
            })))
        })
    }

    /// Watch whether the surrounding system still considers the in-flight
    /// request for `cache_key` active.
    ///
    /// Returns `None` when no request is in flight. Otherwise the stream
    /// checks the caller-supplied `is_active` predicate up front and on every
    /// event the underlying fetch produces, completing as soon as it turns
    /// false, which may be well after the network call itself finished. The
    /// request's error, if any, is forwarded.
    pub fn active_request_observable<F>(
        &self,
        cache_key: &str,
        is_active: F,
    ) -> Option<Observable<()>>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let status_subject = self
            .entries
            .lock()
            .unwrap()
            .get(cache_key)
            .map(|entry| entry.status_subject.clone())?;
        let is_active = Arc::new(is_active);
        Some(Observable::create(move |sink| {
            if !is_active() {
                sink.complete();
                return Ok(Cleanup::None);
            }
            let check = Arc::clone(&is_active);
            let pulse_sink = sink.clone();
            let error_sink = sink.clone();
            let complete_sink = sink.clone();
            let subscription = status_subject.subscribe(
                Observer::new()
                    .on_next(move |_| {
                        if !check() {
                            pulse_sink.complete();
                        }
                    })
                    .on_error(move |error| error_sink.error(error, false))
                    .on_complete(move || complete_sink.complete()),
            );
            Ok(Cleanup::Unsubscribe(subscription))
        }))
    }

    /// Future form of [`active_request_observable`]: resolves once the
    /// request is no longer active, or with the request's error.
    ///
    /// [`active_request_observable`]: RequestCache::active_request_observable
    pub fn active_request_future<F>(
        &self,
        cache_key: &str,
        is_active: F,
    ) -> Option<impl Future<Output = StreamResult<()>> + Send + 'static>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let observable = self.active_request_observable(cache_key, is_active)?;
        let future = observable.to_future();
        Some(async move { future.await.map(|_| ()) })
    }
}

/// Start the underlying fetch for a cache miss. The subscription's
/// synchronous `start` callback installs the cache entry, so by the time this
/// returns the entry exists, unless the fetch already terminated, in which
/// case the entry has come and gone and the returned subject holds the full
/// replay.
fn start_fetch<T, F>(entries: &EntryMap<T>, cache_key: &str, make_stream: &F) -> ReplaySubject<T>
where
    T: Clone + Send + 'static,
    F: Fn() -> Observable<T>,
{
    let subject = ReplaySubject::new();
    let status_subject = ReplaySubject::<()>::new();

    let start_entries = Arc::clone(entries);
    let start_key = cache_key.to_string();
    let start_subject = subject.clone();
    let start_status = status_subject.clone();

    let next_subject = subject.clone();
    let next_status = status_subject.clone();

    let error_entries = Arc::clone(entries);
    let error_key = cache_key.to_string();
    let error_subject = subject.clone();
    let error_status = status_subject.clone();

    let complete_entries = Arc::clone(entries);
    let complete_key = cache_key.to_string();
    let complete_subject = subject.clone();
    let complete_status = status_subject.clone();

    let unsubscribe_entries = Arc::clone(entries);
    let unsubscribe_key = cache_key.to_string();
    let unsubscribe_status = status_subject.clone();

    make_stream().subscribe(
        Observer::new()
            .on_start(move |subscription| {
                start_entries.lock().unwrap().insert(
                    start_key.clone(),
                    CacheEntry {
                        subject: start_subject.clone(),
                        status_subject: start_status.clone(),
                        subscription: subscription.clone(),
                    },
                );
            })
            .on_next(move |value| {
                next_subject.next(value);
                next_status.next(());
            })
            .on_error(move |error| {
                error_entries.lock().unwrap().remove(&error_key);
                error_subject.error(error.clone());
                error_status.error(error);
            })
            .on_complete(move || {
                complete_entries.lock().unwrap().remove(&complete_key);
                complete_subject.complete();
                complete_status.complete();
            })
            .on_unsubscribe(move |_| {
                unsubscribe_entries.lock().unwrap().remove(&unsubscribe_key);
                unsubscribe_status.complete();
            }),
    );

    subject
}
