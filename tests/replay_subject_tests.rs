use std::sync::{Arc, Mutex};

use pushstream::{Observer, ReplaySubject, StreamError, Subscription};

fn recording_observer(log: &Arc<Mutex<Vec<String>>>) -> Observer<i32> {
    let next_log = Arc::clone(log);
    let error_log = Arc::clone(log);
    let complete_log = Arc::clone(log);
    Observer::new()
        .on_next(move |value| next_log.lock().unwrap().push(format!("next:{}", value)))
        .on_error(move |error| error_log.lock().unwrap().push(format!("error:{}", error)))
        .on_complete(move || complete_log.lock().unwrap().push("complete".to_string()))
}

#[test]
fn test_live_events_broadcast_to_all_subscribers_in_order() {
    let subject = ReplaySubject::new();
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));

    subject.subscribe(recording_observer(&first));
    subject.subscribe(recording_observer(&second));

    subject.next(1);
    subject.next(2);
    subject.complete();

    assert_eq!(first.lock().unwrap().join(","), "next:1,next:2,complete");
    assert_eq!(second.lock().unwrap().join(","), "next:1,next:2,complete");
}

#[test]
fn test_late_subscriber_replays_the_full_log_then_goes_live() {
    let subject = ReplaySubject::new();
    let early = Arc::new(Mutex::new(Vec::new()));
    let late = Arc::new(Mutex::new(Vec::new()));

    subject.subscribe(recording_observer(&early));
    subject.next(1);
    subject.next(2);

    // Catch-up happens synchronously inside subscribe.
    subject.subscribe(recording_observer(&late));
    assert_eq!(late.lock().unwrap().join(","), "next:1,next:2");

    subject.next(3);
    assert_eq!(early.lock().unwrap().join(","), "next:1,next:2,next:3");
    assert_eq!(late.lock().unwrap().join(","), "next:1,next:2,next:3");
}

#[test]
fn test_subscriber_after_terminal_replays_everything_including_the_terminal() {
    let subject = ReplaySubject::new();
    subject.next(1);
    subject.error(StreamError::custom("boom"));

    let log = Arc::new(Mutex::new(Vec::new()));
    subject.subscribe(recording_observer(&log));

    assert_eq!(
        log.lock().unwrap().join(","),
        "next:1,error:stream error: boom"
    );
}

#[test]
fn test_events_after_a_terminal_are_ignored() {
    let subject = ReplaySubject::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    subject.subscribe(recording_observer(&log));

    subject.next(1);
    subject.complete();
    subject.next(2);
    subject.error(StreamError::custom("late"));
    subject.complete();

    assert_eq!(log.lock().unwrap().join(","), "next:1,complete");

    // The ignored events were not logged either: a late subscriber sees the
    // same history.
    let late = Arc::new(Mutex::new(Vec::new()));
    subject.subscribe(recording_observer(&late));
    assert_eq!(late.lock().unwrap().join(","), "next:1,complete");
}

#[test]
fn test_observer_count_tracks_live_subscribers() {
    let subject: ReplaySubject<i32> = ReplaySubject::new();
    assert_eq!(subject.observer_count(), 0);

    let first = subject.subscribe(Observer::new());
    let second = subject.subscribe(Observer::new());
    assert_eq!(subject.observer_count(), 2);

    first.unsubscribe();
    assert_eq!(subject.observer_count(), 1);

    // A terminal event closes and detaches the remaining subscribers.
    subject.complete();
    assert_eq!(subject.observer_count(), 0);
    second.unsubscribe();
    assert_eq!(subject.observer_count(), 0);
}

#[test]
fn test_replay_bails_out_when_a_replayed_event_closes_the_sink() {
    let subject = ReplaySubject::new();
    subject.next(1);
    subject.next(2);
    subject.next(3);

    let log = Arc::new(Mutex::new(Vec::new()));
    let next_log = Arc::clone(&log);
    let handle: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let stored = Arc::clone(&handle);
    let cancel = Arc::clone(&handle);

    subject.subscribe(
        Observer::new()
            .on_start(move |subscription| {
                *stored.lock().unwrap() = Some(subscription.clone());
            })
            .on_next(move |value| {
                next_log.lock().unwrap().push(format!("next:{}", value));
                if value == 2 {
                    if let Some(subscription) = cancel.lock().unwrap().as_ref() {
                        subscription.unsubscribe();
                    }
                }
            }),
    );

    // The third logged event was never replayed.
    assert_eq!(log.lock().unwrap().join(","), "next:1,next:2");
    assert_eq!(subject.observer_count(), 0);
}

#[test]
fn test_clones_share_the_same_subject() {
    let subject = ReplaySubject::new();
    let alias = subject.clone();
    let log = Arc::new(Mutex::new(Vec::new()));

    subject.subscribe(recording_observer(&log));
    alias.next(5);

    assert_eq!(log.lock().unwrap().join(","), "next:5");
    assert_eq!(alias.observer_count(), 1);
}

#[test]
fn test_as_observable_subscriptions_attach_to_the_subject() {
    let subject = ReplaySubject::new();
    subject.next(1);

    let log = Arc::new(Mutex::new(Vec::new()));
    subject.as_observable().subscribe(recording_observer(&log));
    subject.next(2);

    assert_eq!(log.lock().unwrap().join(","), "next:1,next:2");
}
