//! End-to-end: the current-result slot is strictly per-thread, and the
//! process-wide error-result count reflects exactly how many threads are
//! currently sitting on an `err`.

use std::sync::mpsc;
use std::thread;

use fimo_runtime::error::{Error, ErrorKind};
use fimo_runtime::result;

#[test]
fn error_result_is_thread_local_and_counted() {
    result::clear_result();
    let baseline = result::error_result_count().count();

    let (set_tx, set_rx) = mpsc::channel::<()>();
    let (clear_tx, clear_rx) = mpsc::channel::<()>();

    let worker = thread::spawn(move || {
        assert!(!result::has_error_result(), "a fresh thread starts ok");
        result::set_result(Some(Error::new(ErrorKind::NotFound, "worker failed")));
        set_tx.send(()).unwrap();

        // Hold the error result until the main thread has observed the
        // count, so the two threads' views can't race.
        clear_rx.recv().unwrap();
        assert!(result::has_error_result());
        result::clear_result();
    });

    set_rx.recv().unwrap();
    // The main thread's own slot is untouched by the worker's error.
    assert!(!result::has_error_result());
    assert_eq!(result::error_result_count().count(), baseline + 1);

    clear_tx.send(()).unwrap();
    worker.join().unwrap();

    assert_eq!(result::error_result_count().count(), baseline);
}

#[test]
fn take_result_resets_the_slot_and_returns_the_previous_error() {
    result::clear_result();
    result::set_result(Some(Error::new(ErrorKind::Overflow, "duration overflow")));
    assert!(result::has_error_result());

    let taken = result::take_result().expect("a result was set");
    assert_eq!(taken.kind(), ErrorKind::Overflow);
    assert!(!result::has_error_result());
}

#[test]
fn replace_result_returns_whatever_was_previously_set() {
    result::clear_result();
    let previous = result::replace_result(Some(Error::new(ErrorKind::InvalidInput, "first")));
    assert!(previous.is_none());

    let previous = result::replace_result(Some(Error::new(ErrorKind::Parameter, "second")));
    assert_eq!(previous.unwrap().kind(), ErrorKind::InvalidInput);

    result::clear_result();
}

#[test]
fn report_funnels_ok_and_err_into_the_current_result_slot() {
    result::clear_result();

    let ok: fimo_runtime::error::Result<i32> = result::report(|| Ok(7));
    assert_eq!(ok.unwrap(), 7);
    assert!(!result::has_error_result());

    let err: fimo_runtime::error::Result<i32> =
        result::report(|| Err(Error::new(ErrorKind::User, "boom")));
    assert!(err.is_err());
    assert!(result::has_error_result());
    assert_eq!(result::take_result().unwrap().kind(), ErrorKind::User);
}
