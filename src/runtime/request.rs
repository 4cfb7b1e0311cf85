//! Requests from outside the actor system
//!
//! A [`RequestClient`] stands in for an actor: it sends a request envelope
//! whose requester is a one-slot inbox, then waits on that inbox with a
//! timeout. Once the client times out or is dropped the inbox is abandoned
//! and a late response is dropped silently. The callee is never cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace};

use crate::error::{RuntimeError, RuntimeResult};
use crate::kernel::{ActorRef, ActorRefObj, Complete, Envelope, ValueOrVar, Var};
use crate::types::Address;

/// Response slot of one request
pub struct ClientInbox {
    address: Address,
    tx: Sender<Complete>,
    abandoned: AtomicBool,
}

impl ClientInbox {
    fn new() -> (Arc<Self>, Receiver<Complete>) {
        let (tx, rx) = bounded(1);
        let inbox = ClientInbox {
            address: Address::generate("client"),
            tx,
            abandoned: AtomicBool::new(false),
        };
        (Arc::new(inbox), rx)
    }

    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl ActorRef for ClientInbox {
    fn address(&self) -> &Address {
        &self.address
    }

    fn send(&self, envelope: Envelope) {
        match envelope {
            Envelope::Response { value, .. } => {
                if self.is_abandoned() {
                    debug!(client = %self.address, value = %value, "dropping late response");
                    return;
                }
                if self.tx.try_send(value).is_err() {
                    debug!(client = %self.address, "response slot full; dropping response");
                }
            }
            other => debug!(client = %self.address, kind = other.kind(), "client ignores envelope"),
        }
    }
}

/// One-shot ask from a non-actor caller
pub struct RequestClient {
    actor: ActorRefObj,
    inbox: Arc<ClientInbox>,
    rx: Receiver<Complete>,
}

impl RequestClient {
    pub fn new(actor: ActorRefObj) -> Self {
        let (inbox, rx) = ClientInbox::new();
        RequestClient { actor, inbox, rx }
    }

    /// Address responses are sent to
    pub fn address(&self) -> &Address {
        self.inbox.address()
    }

    /// Enqueue the request envelope
    pub fn send(&self, message: Complete) {
        trace!(client = %self.inbox.address(), to = %self.actor.address(), "sending request");
        self.actor.send(Envelope::Request {
            message,
            requester: self.inbox.clone(),
            target: ValueOrVar::Var(Var::new()),
        });
    }

    /// Wait for the response. On timeout the request is abandoned.
    pub fn await_response(self, timeout: Duration) -> RuntimeResult<Complete> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                self.inbox.abandon();
                Err(RuntimeError::RequestTimeout {
                    address: self.actor.address().clone(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(RuntimeError::Disconnected(self.actor.address().clone()))
            }
        }
    }
}

impl Drop for RequestClient {
    fn drop(&mut self) {
        self.inbox.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Literal;

    fn response(text: &str) -> Envelope {
        Envelope::Response {
            value: Complete::from(Literal::str(text)),
            target: ValueOrVar::Var(Var::new()),
        }
    }

    #[test]
    fn test_inbox_delivers_first_response() {
        let (inbox, rx) = ClientInbox::new();
        inbox.send(response("first"));
        inbox.send(response("second"));
        assert_eq!(rx.try_recv().unwrap().to_string(), "'first'");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_abandoned_inbox_drops_response() {
        let (inbox, rx) = ClientInbox::new();
        inbox.abandon();
        inbox.send(response("late"));
        assert!(rx.try_recv().is_err());
    }
}
