use std::sync::{Arc, Mutex};

use serial_test::serial;

use pushstream::{
    on_unhandled_error, reset_unhandled_error_handler, Cleanup, Observable, Observer, StreamError,
};

// The hook is process-wide, so every test here installs its own capture and
// runs serially.
fn install_capture_hook() -> Arc<Mutex<Vec<(StreamError, bool)>>> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let capture = Arc::clone(&captured);
    on_unhandled_error(move |error, is_uncaught_thrown_error| {
        capture
            .lock()
            .unwrap()
            .push((error.clone(), is_uncaught_thrown_error));
    });
    captured
}

#[test]
#[serial]
fn test_error_after_complete_goes_to_the_hook_not_the_observer() {
    let captured = install_capture_hook();
    let log = Arc::new(Mutex::new(Vec::new()));
    let next_log = Arc::clone(&log);
    let error_log = Arc::clone(&log);
    let complete_log = Arc::clone(&log);

    let observable = Observable::create(|sink| {
        sink.next(1);
        sink.complete();
        sink.error(StreamError::custom("too late"), false);
        Ok(Cleanup::None)
    });
    observable.subscribe(
        Observer::new()
            .on_next(move |value| next_log.lock().unwrap().push(format!("next:{}", value)))
            .on_error(move |error| error_log.lock().unwrap().push(format!("error:{}", error)))
            .on_complete(move || complete_log.lock().unwrap().push("complete".to_string())),
    );

    assert_eq!(log.lock().unwrap().join(","), "next:1,complete");
    assert_eq!(
        *captured.lock().unwrap(),
        vec![(StreamError::custom("too late"), false)]
    );
    reset_unhandled_error_handler();
}

#[test]
#[serial]
fn test_emitted_error_without_a_handler_is_unhandled() {
    let captured = install_capture_hook();

    let observable: Observable<i32> = Observable::create(|sink| {
        sink.error(StreamError::Timeout, false);
        Ok(Cleanup::None)
    });
    observable.subscribe(Observer::new());

    assert_eq!(*captured.lock().unwrap(), vec![(StreamError::Timeout, false)]);
    reset_unhandled_error_handler();
}

#[test]
#[serial]
fn test_source_failure_without_a_handler_is_flagged_as_thrown() {
    let captured = install_capture_hook();

    let observable: Observable<i32> =
        Observable::create(|_sink| Err(StreamError::custom("exploded")));
    observable.subscribe(Observer::new());

    assert_eq!(
        *captured.lock().unwrap(),
        vec![(StreamError::custom("exploded"), true)]
    );
    reset_unhandled_error_handler();
}

#[test]
#[serial]
fn test_map_failure_without_a_handler_is_flagged_as_thrown() {
    let captured = install_capture_hook();

    let numbers = Observable::create(|sink| {
        sink.next(1);
        sink.complete();
        Ok(Cleanup::None)
    });
    numbers
        .map(|_: i32| Err::<i32, _>(StreamError::custom("bad map")))
        .subscribe(Observer::new());

    assert_eq!(
        *captured.lock().unwrap(),
        vec![(StreamError::custom("bad map"), true)]
    );
    reset_unhandled_error_handler();
}

#[test]
#[serial]
fn test_error_after_unsubscribe_goes_to_the_hook() {
    let captured = install_capture_hook();
    let sink_slot = Arc::new(Mutex::new(None));
    let source_slot = Arc::clone(&sink_slot);

    let observable: Observable<i32> = Observable::create(move |sink| {
        *source_slot.lock().unwrap() = Some(sink);
        Ok(Cleanup::None)
    });
    let subscription = observable.subscribe(
        // Even a subscriber with an error handler no longer receives errors
        // once it has unsubscribed.
        Observer::new().on_error(|_| panic!("must not be delivered")),
    );
    subscription.unsubscribe();

    let sink = sink_slot.lock().unwrap().clone().unwrap();
    sink.error(StreamError::Cancelled, false);

    assert_eq!(
        *captured.lock().unwrap(),
        vec![(StreamError::Cancelled, false)]
    );
    reset_unhandled_error_handler();
}

#[test]
#[serial]
fn test_handler_replacement_takes_effect_immediately() {
    let first = install_capture_hook();
    let second = install_capture_hook();

    let observable: Observable<i32> = Observable::create(|sink| {
        sink.error(StreamError::Timeout, false);
        Ok(Cleanup::None)
    });
    observable.subscribe(Observer::new());

    assert!(first.lock().unwrap().is_empty());
    assert_eq!(second.lock().unwrap().len(), 1);
    reset_unhandled_error_handler();
}
