// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Scripted in-memory transport for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::{Inbound, Transport, TransportError, TransportFuture, TransportKind};

/// Maps every sent buffer to the chunks delivered back.
pub(crate) type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

pub(crate) struct MockTransport {
    responder: Responder,
    /// Opens that succeed before every later one is refused.
    open_budget: Option<usize>,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    sent: Mutex<Vec<Vec<u8>>>,
    inbound: Mutex<Option<mpsc::Sender<Inbound>>>,
    opens: AtomicUsize,
}

/// Test-side view of a [`MockTransport`] that was moved into a task.
#[derive(Clone)]
pub(crate) struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    pub(crate) fn new(responder: Responder) -> (Self, MockHandle) {
        let shared = Arc::new(Shared::default());
        let handle = MockHandle {
            shared: shared.clone(),
        };
        (
            Self {
                responder,
                open_budget: None,
                shared,
            },
            handle,
        )
    }

    /// Never replies.
    pub(crate) fn silent() -> (Self, MockHandle) {
        Self::new(Box::new(|_| Vec::new()))
    }

    pub(crate) fn failing_open() -> (Self, MockHandle) {
        Self::with_open_budget(0)
    }

    /// Opens once, then refuses to reopen.
    pub(crate) fn failing_reopen() -> (Self, MockHandle) {
        Self::with_open_budget(1)
    }

    fn with_open_budget(budget: usize) -> (Self, MockHandle) {
        let (mut transport, handle) = Self::silent();
        transport.open_budget = Some(budget);
        (transport, handle)
    }
}

impl MockHandle {
    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.shared.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub(crate) fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Deliver something as if the device produced it.
    pub(crate) async fn push(&self, inbound: Inbound) {
        let tx = self.shared.inbound.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(inbound).await;
        }
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ByteStream
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }

    fn open<'a>(&'a mut self, inbound: mpsc::Sender<Inbound>) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let opens = self.shared.opens.fetch_add(1, Ordering::SeqCst) + 1;
            if self.open_budget.is_some_and(|budget| opens > budget) {
                return Err(TransportError::Connection("mock refused".into()));
            }
            *self.shared.inbound.lock().unwrap() = Some(inbound);
            Ok(())
        })
    }

    fn send<'a>(&'a mut self, bytes: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let tx = self
                .shared
                .inbound
                .lock()
                .unwrap()
                .clone()
                .ok_or(TransportError::NotConnected)?;
            self.shared.sent.lock().unwrap().push(bytes.to_vec());
            for chunk in (self.responder)(bytes) {
                let _ = tx.send(Inbound::data(chunk)).await;
            }
            Ok(())
        })
    }

    fn close<'a>(&'a mut self) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.shared.inbound.lock().unwrap().take();
            Ok(())
        })
    }
}
