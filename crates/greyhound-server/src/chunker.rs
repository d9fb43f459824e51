//! Hand-off from a blocking chunk producer to the HTTP response body.
//!
//! The producer runs on a worker task, appending into a pooled buffer and
//! calling [`Chunker::write`] after each step. The first write decides the
//! body mode: a query that finished inside its first buffer becomes a
//! `Content-Length` reply; anything longer becomes a streamed body fed
//! through a bounded channel, with `blocking_send` as the back-pressure
//! point. A dropped receiver means the client went away; the chunker then
//! marks itself cancelled and every later write short-circuits. A failure
//! after streaming has begun is forwarded as an `Err` chunk, which aborts
//! the response body without its terminator.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::HttpError;

/// Bytes accumulated before a chunk is emitted mid-stream.
pub const CHUNK_THRESHOLD: usize = 64 * 1024;

/// Channel depth for in-flight chunks; one keeps the producer a single
/// chunk ahead of the network writer.
const CHUNK_QUEUE: usize = 1;

/// One frame of a streamed body.
pub type Chunk = Result<Bytes, HttpError>;

/// What the handler receives once the body mode is known.
pub enum Payload {
    /// The whole body, to be sent with a `Content-Length` header.
    Complete(Bytes),
    /// A streamed body; chunks arrive on the receiver.
    Streaming(mpsc::Receiver<Chunk>),
    /// The producer failed before anything was sent.
    Failed(HttpError),
}

pub struct Chunker {
    head: Option<oneshot::Sender<Payload>>,
    tx: Option<mpsc::Sender<Chunk>>,
    rx: Option<mpsc::Receiver<Chunk>>,
    cancelled: bool,
    done: bool,
}

impl Chunker {
    pub fn new(head: oneshot::Sender<Payload>) -> Chunker {
        let (tx, rx) = mpsc::channel(CHUNK_QUEUE);
        Chunker {
            head: Some(head),
            tx: Some(tx),
            rx: Some(rx),
            cancelled: false,
            done: false,
        }
    }

    /// Hand the accumulated bytes onward. Drains `buf` when a chunk or the
    /// complete body is emitted; leaves it accumulating otherwise.
    pub fn write(&mut self, buf: &mut Vec<u8>, last: bool) -> Result<(), HttpError> {
        if self.done {
            return Err(HttpError::Internal("write called after done".to_string()));
        }
        if self.cancelled {
            return Err(HttpError::Disconnected);
        }

        if let Some(head) = self.head.take() {
            if last {
                // Whole body fit the first buffer.
                self.done = true;
                let body = Bytes::copy_from_slice(buf);
                buf.clear();
                return match head.send(Payload::Complete(body)) {
                    Ok(()) => Ok(()),
                    Err(_) => self.cancel(),
                };
            }

            let rx = self.rx.take();
            match rx.map(|rx| head.send(Payload::Streaming(rx))) {
                Some(Ok(())) => {}
                _ => return self.cancel(),
            }
        }

        if buf.len() > CHUNK_THRESHOLD || (last && !buf.is_empty()) {
            let chunk = Bytes::copy_from_slice(buf);
            buf.clear();
            let sent = self
                .tx
                .as_ref()
                .map(|tx| tx.blocking_send(Ok(chunk)))
                .is_some_and(|r| r.is_ok());
            if !sent {
                return self.cancel();
            }
        }

        if last {
            // Dropping the sender completes the stream.
            self.tx = None;
            self.done = true;
        }
        Ok(())
    }

    /// Report a producer failure. Before the body mode is decided this
    /// becomes an error response; afterwards the error is forwarded as a
    /// terminal `Err` chunk, cutting the stream off without its
    /// terminator.
    pub fn fail(&mut self, error: HttpError) {
        if let Some(head) = self.head.take() {
            let _ = head.send(Payload::Failed(error));
        } else if let Some(tx) = self.tx.take() {
            debug!(error = %error, "aborting response stream");
            let _ = tx.blocking_send(Err(error));
        }
        self.tx = None;
        self.done = true;
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn done(&self) -> bool {
        self.done
    }

    fn cancel(&mut self) -> Result<(), HttpError> {
        self.cancelled = true;
        self.done = true;
        self.tx = None;
        Err(HttpError::Disconnected)
    }
}
