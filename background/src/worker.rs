//! Background worker thread owning the request router.
//!
//! Requests arrive over an mpsc channel together with a reply sender. Between requests the
//! worker wakes up every `tick` to run the retention sweep when it is due.

use clipshelf_core::{RequestRouter, Response};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

pub enum Message {
    /// One raw JSON request line.
    Request {
        raw: String,
        reply: Sender<Response>,
    },
    Shutdown,
}

pub struct WorkerHandle {
    tx: Sender<Message>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Sends a request and waits for its response. Returns `None` once the worker is gone.
    pub fn request(&self, raw: String) -> Option<Response> {
        let (reply, response) = mpsc::channel();
        self.tx.send(Message::Request { raw, reply }).ok()?;
        response.recv().ok()
    }

    pub fn shutdown(self) {
        let _ = self.tx.send(Message::Shutdown);
        if self.join.join().is_err() {
            warn!("worker thread panicked");
        }
    }
}

/// Starts the worker thread. It runs a due sweep before serving the first request.
pub fn start(router: RequestRouter, tick: Duration) -> WorkerHandle {
    let (tx, rx) = mpsc::channel::<Message>();
    let join = thread::spawn(move || worker_loop(router, rx, tick));
    WorkerHandle { tx, join }
}

fn worker_loop(mut router: RequestRouter, requests: mpsc::Receiver<Message>, tick: Duration) {
    maintain(&router);
    let mut last_check = Instant::now();

    loop {
        match requests.recv_timeout(tick) {
            Ok(Message::Request { raw, reply }) => {
                let response = router.handle_json(&raw, SystemTime::now());
                let _ = reply.send(response);

                // A busy stream never times out, so check here too.
                if last_check.elapsed() >= tick {
                    maintain(&router);
                    last_check = Instant::now();
                }
            }
            Ok(Message::Shutdown) => {
                debug!("worker shutting down");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                maintain(&router);
                last_check = Instant::now();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn maintain(router: &RequestRouter) {
    match router.shelf().run_maintenance_if_due(SystemTime::now()) {
        Ok(Some(outcome)) => info!(
            evicted = outcome.evicted,
            orphans_removed = outcome.orphans_removed,
            failures = outcome.failures,
            "scheduled maintenance ran"
        ),
        Ok(None) => {}
        Err(e) => warn!(error = %e, kind = %e.kind(), "scheduled maintenance failed"),
    }
}
