//! Connection intake: read one payload per connection, enqueue it.

use std::io::Read;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::queue::AdmissionQueue;

use super::LISTENER_TARGET;

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: UnixStream);
}

/// Reads each connection to end-of-stream and pushes the payload onto the
/// admission queue.
///
/// The connection boundary is the message boundary: a client writes its
/// payload, closes the write side, and the accumulated bytes become one
/// queue entry. No response is sent; submission is fire-and-forget. A read
/// error discards that connection only, never the intake loop.
pub(crate) struct IntakeHandler {
    queue: Arc<AdmissionQueue>,
}

impl IntakeHandler {
    pub(crate) fn new(queue: Arc<AdmissionQueue>) -> Self {
        Self { queue }
    }
}

impl ConnectionHandler for IntakeHandler {
    fn handle(&self, mut stream: UnixStream) {
        let mut payload = Vec::new();
        if let Err(error) = stream.read_to_end(&mut payload) {
            warn!(
                target: LISTENER_TARGET,
                error = %error,
                "discarding connection after read error"
            );
            return;
        }
        if payload.is_empty() {
            debug!(target: LISTENER_TARGET, "ignoring empty submission");
            return;
        }
        let bytes = payload.len();
        if self.queue.push(payload) {
            debug!(
                target: LISTENER_TARGET,
                payload_bytes = bytes,
                "payload enqueued"
            );
        } else {
            warn!(
                target: LISTENER_TARGET,
                payload_bytes = bytes,
                "queue closed; submission dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixListener;
    use std::thread;

    fn socket_pair(dir: &tempfile::TempDir) -> (UnixListener, UnixStream) {
        let path = dir.path().join("intake.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let client = UnixStream::connect(&path).unwrap();
        (listener, client)
    }

    #[test]
    fn payload_lands_on_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, mut client) = socket_pair(&dir);
        let queue = Arc::new(AdmissionQueue::new());
        let handler = IntakeHandler::new(Arc::clone(&queue));

        let writer = thread::spawn(move || {
            client.write_all(b"job payload").unwrap();
            // Closing the stream marks the end of the message.
        });
        let (stream, _) = listener.accept().unwrap();
        handler.handle(stream);
        writer.join().unwrap();

        assert_eq!(queue.pop().unwrap(), b"job payload");
    }

    #[test]
    fn empty_connection_enqueues_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, client) = socket_pair(&dir);
        let queue = Arc::new(AdmissionQueue::new());
        let handler = IntakeHandler::new(Arc::clone(&queue));

        drop(client);
        let (stream, _) = listener.accept().unwrap();
        handler.handle(stream);

        assert!(queue.is_empty());
    }

    #[test]
    fn closed_queue_drops_submission() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, mut client) = socket_pair(&dir);
        let queue = Arc::new(AdmissionQueue::new());
        queue.close();
        let handler = IntakeHandler::new(Arc::clone(&queue));

        client.write_all(b"late").unwrap();
        drop(client);
        let (stream, _) = listener.accept().unwrap();
        handler.handle(stream);

        assert!(queue.pop().is_none());
    }
}
