//! Synchronous rendezvous mailboxes.
//!
//! A mailbox is a FIFO of pending messages plus at most one blocked
//! receiver. `send` never blocks: it either hands the message straight to
//! a waiting receiver or queues it. `recv` either takes the head of the
//! queue immediately or parks the caller as the mailbox's sole receiver.
//! A second concurrent receiver on the same mailbox is a system-down
//! invariant violation (P5), not a recoverable error.

use core::ptr::NonNull;

use crate::task::TaskId;

/// One pending message. Ownership of the payload passes from sender to
/// receiver at delivery; the kernel never copies the bytes it points to.
#[derive(Clone, Copy)]
pub struct Message {
    pub sender: TaskId,
    pub size: usize,
    pub payload: NonNull<u8>,
}

const MAX_QUEUED: usize = 8;

/// Fixed-capacity FIFO of pending messages. A bound is required because
/// this kernel has no dynamic container types available in `no_std`
/// without the allocator crate feature; `MAX_QUEUED` is generous relative
/// to `config::THREAD_NUM` senders that could race to fill one mailbox.
#[derive(Clone, Copy)]
pub struct Mailbox {
    queue: [Option<Message>; MAX_QUEUED],
    head: usize,
    len: usize,
    pub(crate) receiver: Option<TaskId>,
}

impl Mailbox {
    pub const fn new() -> Self {
        Mailbox {
            queue: [None; MAX_QUEUED],
            head: 0,
            len: 0,
            receiver: None,
        }
    }

    fn push(&mut self, msg: Message) -> Result<(), ()> {
        if self.len == MAX_QUEUED {
            return Err(());
        }
        let slot = (self.head + self.len) % MAX_QUEUED;
        self.queue[slot] = Some(msg);
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<Message> {
        if self.len == 0 {
            return None;
        }
        let msg = self.queue[self.head].take();
        self.head = (self.head + 1) % MAX_QUEUED;
        self.len -= 1;
        msg
    }

    pub fn has_pending(&self) -> bool {
        self.len > 0
    }

    /// Enqueue `msg`. Returns it back if the mailbox's bounded queue is
    /// full (treated by the caller as mailbox allocation exhaustion,
    /// §4.2's documented system-down policy).
    pub fn enqueue(&mut self, msg: Message) -> Result<(), Message> {
        self.push(msg).map_err(|_| msg)
    }

    /// Take the head message, for a receiver that arrived after messages
    /// were already queued.
    pub fn dequeue(&mut self) -> Option<Message> {
        self.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(i: u16) -> TaskId {
        TaskId { index: i, generation: 0 }
    }

    fn payload() -> NonNull<u8> {
        static BYTE: u8 = 0;
        NonNull::from(&BYTE).cast()
    }

    #[test]
    fn fifo_order_preserved() {
        let mut mbox = Mailbox::new();
        mbox.enqueue(Message { sender: tid(1), size: 1, payload: payload() }).unwrap();
        mbox.enqueue(Message { sender: tid(2), size: 2, payload: payload() }).unwrap();
        assert_eq!(mbox.dequeue().unwrap().sender, tid(1));
        assert_eq!(mbox.dequeue().unwrap().sender, tid(2));
        assert!(mbox.dequeue().is_none());
    }

    #[test]
    fn payload_and_size_preserved_verbatim() {
        let mut mbox = Mailbox::new();
        let p = payload();
        mbox.enqueue(Message { sender: tid(3), size: 14, payload: p }).unwrap();
        let got = mbox.dequeue().unwrap();
        assert_eq!(got.size, 14);
        assert_eq!(got.payload, p);
    }
}
