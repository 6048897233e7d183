use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use http_exchange::{Dispatcher, DispatcherConfig, ErrorKind, FAILED_STATUS_CODE, Request};
use httpmock::prelude::*;

fn dispatcher() -> Dispatcher {
    Dispatcher::new(DispatcherConfig::default().with_worker_threads(2)).unwrap()
}

#[test]
fn test_blocking_send_and_text() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/hello").query_param("name", "world");
        then.status(200).body("hello world");
    });

    let dispatcher = dispatcher();
    let mut response = dispatcher
        .send(Request::get(server.url("/hello")).param("name", "world"))
        .unwrap();

    assert_eq!(response.code(), 200);
    assert_eq!(response.text_blocking().unwrap(), "hello world");
    assert!(response.is_closed());
    mock.assert();
}

#[test]
fn test_blocking_write_to_file_reports_progress_and_closes() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/file");
        then.status(200).body(vec![b'f'; 30_000]);
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let dispatcher = dispatcher();
    let mut response = dispatcher
        .send(
            Request::get(server.url("/file"))
                .on_download_progress(move |done, total| sink.lock().unwrap().push((done, total))),
        )
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let written = response.write_to_file_blocking(&path).unwrap();

    assert_eq!(written, 30_000);
    assert_eq!(std::fs::read(&path).unwrap(), vec![b'f'; 30_000]);
    assert!(response.is_closed());
    assert_eq!(response.reader().unwrap_err().kind(), ErrorKind::State);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first(), Some(&(0, Some(30_000))));
    assert_eq!(seen.last(), Some(&(30_000, Some(30_000))));
    assert!(seen.windows(2).all(|pair| pair[0].0 <= pair[1].0));
}

#[test]
fn test_reader_streams_error_body_and_leaves_connection_open() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/denied");
        then.status(403).body("access denied");
    });

    let dispatcher = dispatcher();
    let mut response = dispatcher.send(Request::get(server.url("/denied"))).unwrap();
    assert_eq!(response.code(), 403);
    assert_eq!(response.message(), "Forbidden");

    let mut body = String::new();
    response.reader().unwrap().read_to_string(&mut body).unwrap();
    assert_eq!(body, "access denied");

    assert!(!response.is_closed());
    response.close();
    assert!(response.is_closed());
}

#[test]
fn test_callback_runs_once_off_caller_thread() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/async");
        then.status(200).body("from callback");
    });

    let dispatcher = dispatcher();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let (tx, rx) = mpsc::channel();

    dispatcher.submit_with(Request::get(server.url("/async")), move |mut response| {
        counter.fetch_add(1, Ordering::SeqCst);
        let body = response.text_blocking();
        tx.send((thread::current().id(), response.code(), body)).unwrap();
    });

    let (callback_thread, code, body) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_ne!(callback_thread, thread::current().id());
    assert_eq!(code, 200);
    assert_eq!(body.unwrap(), "from callback");

    dispatcher.shutdown();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callback_receives_sentinel_on_failure() {
    let dispatcher = dispatcher();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let (tx, rx) = mpsc::channel();

    let request = Request::get("http://127.0.0.1:1/").connect_timeout(Duration::from_secs(2));
    dispatcher.submit_with(request, move |mut response| {
        counter.fetch_add(1, Ordering::SeqCst);
        let read = response.bytes_blocking().map(|_| ());
        tx.send((
            thread::current().id(),
            response.code(),
            response.status(),
            response.message().to_owned(),
            response.failure().map(http_exchange::ClientError::kind),
            read.map_err(|e| e.kind()),
        ))
        .unwrap();
    });

    let (callback_thread, code, status, message, failure, read) =
        rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_ne!(callback_thread, thread::current().id());
    assert_eq!(code, FAILED_STATUS_CODE);
    assert_eq!(status, None);
    assert!(!message.is_empty());
    assert_eq!(failure, Some(ErrorKind::Io));
    assert_eq!(read, Err(ErrorKind::State));

    dispatcher.shutdown();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_submit_wait() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(DELETE).path("/items/7");
        then.status(204);
    });

    let dispatcher = dispatcher();
    let pending = dispatcher.submit(Request::delete(server.url("/items/7")));
    let response = pending.wait().unwrap();

    assert_eq!(response.code(), 204);
    mock.assert();
}

#[test]
fn test_abort_yields_state_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200).delay(Duration::from_secs(5));
    });

    let dispatcher = dispatcher();
    let pending = dispatcher.submit(Request::get(server.url("/slow")));
    pending.abort();

    let err = pending.wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn test_read_timeout_is_io_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/stall");
        then.status(200).delay(Duration::from_secs(3));
    });

    let dispatcher = dispatcher();
    let err = dispatcher
        .send(Request::get(server.url("/stall")).read_timeout(Duration::from_millis(200)))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.is_retryable());
}

#[test]
fn test_dispatchers_are_independent() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/ping");
        then.status(200).body("pong");
    });

    let first = dispatcher();
    let second = Dispatcher::new(DispatcherConfig::default().with_thread_name("second-pool")).unwrap();

    let mut a = first.send(Request::get(server.url("/ping"))).unwrap();
    let mut b = second.send(Request::get(server.url("/ping"))).unwrap();
    assert_eq!(a.text_blocking().unwrap(), "pong");
    assert_eq!(b.text_blocking().unwrap(), "pong");

    first.shutdown();
    second.shutdown();
    mock.assert_hits(2);
}
