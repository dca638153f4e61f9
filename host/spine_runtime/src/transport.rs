use crate::protocol::ClientMessage;
use std::cell::Cell;
use std::sync::mpsc::{SyncSender, TrySendError};
use tracing::{debug, warn};

/// Outbound half of a server connection.
pub trait Transport {
    fn send(&self, message: ClientMessage);
}

/// Sends into the bounded queue drained by the writer thread. A full queue
/// drops the message and counts it instead of blocking the render loop.
#[derive(Debug)]
pub struct QueueTransport {
    tx: SyncSender<ClientMessage>,
    capacity: usize,
    dropped: Cell<u64>,
}

impl QueueTransport {
    pub fn new(tx: SyncSender<ClientMessage>, capacity: usize) -> Self {
        Self {
            tx,
            capacity,
            dropped: Cell::new(0),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

impl Transport for QueueTransport {
    fn send(&self, message: ClientMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                let dropped = self.dropped.get() + 1;
                self.dropped.set(dropped);
                if dropped == 1 || dropped.is_power_of_two() {
                    warn!(
                        capacity = self.capacity,
                        dropped,
                        tag = message.tag(),
                        "outbound queue full; dropping message"
                    );
                }
            }
            Err(TrySendError::Disconnected(message)) => {
                debug!(tag = message.tag(), "connection writer is gone; dropping message");
            }
        }
    }
}
