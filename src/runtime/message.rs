//! Mailbox items and the per-actor mailbox

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::kernel::{ActorCfg, Envelope, Stack};

/// Internal control items
pub enum Signal {
    /// Evaluate the handlers constructor
    Configure(Arc<ActorCfg>),
    /// Continue a preempted or woken computation of the given activity
    Resume { activity: u64, stack: Stack },
    /// Stop accepting items
    Stop,
}

/// Anything an actor's mailbox holds
pub enum MailboxItem {
    Envelope(Envelope),
    Signal(Signal),
}

impl MailboxItem {
    pub fn kind(&self) -> &'static str {
        match self {
            MailboxItem::Envelope(envelope) => envelope.kind(),
            MailboxItem::Signal(Signal::Configure(_)) => "configure",
            MailboxItem::Signal(Signal::Resume { .. }) => "resume",
            MailboxItem::Signal(Signal::Stop) => "stop",
        }
    }
}

impl fmt::Debug for MailboxItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxItem::Envelope(envelope) => write!(f, "{:?}", envelope),
            MailboxItem::Signal(Signal::Resume { activity, .. }) => {
                write!(f, "Resume(activity {})", activity)
            }
            other => f.write_str(other.kind()),
        }
    }
}

/// FIFO mailbox. Once closed, pushes are refused.
#[derive(Default)]
pub struct Mailbox {
    items: Mutex<VecDeque<MailboxItem>>,
    closed: AtomicBool,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an item. Returns the item back if the mailbox is closed.
    pub fn push(&self, item: MailboxItem) -> Result<(), MailboxItem> {
        let mut items = self.items.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(item);
        }
        items.push_back(item);
        Ok(())
    }

    pub fn pop(&self) -> Option<MailboxItem> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Refuse further pushes and drop whatever is queued
    pub fn close(&self) -> usize {
        let mut items = self.items.lock();
        self.closed.store(true, Ordering::SeqCst);
        let dropped = items.len();
        items.clear();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Complete, Literal};

    fn notify(text: &str) -> MailboxItem {
        MailboxItem::Envelope(Envelope::Notify {
            message: Complete::from(Literal::str(text)),
        })
    }

    #[test]
    fn test_mailbox_fifo() {
        let mailbox = Mailbox::new();
        mailbox.push(notify("a")).unwrap();
        mailbox.push(MailboxItem::Signal(Signal::Stop)).unwrap();
        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.pop().unwrap().kind(), "notify");
        assert_eq!(mailbox.pop().unwrap().kind(), "stop");
        assert!(mailbox.pop().is_none());
    }

    #[test]
    fn test_closed_mailbox_refuses() {
        let mailbox = Mailbox::new();
        mailbox.push(notify("a")).unwrap();
        assert_eq!(mailbox.close(), 1);
        assert!(mailbox.is_closed());
        assert!(mailbox.push(notify("b")).is_err());
        assert!(mailbox.is_empty());
    }
}
