//! Unidirectional byte pump.
//!
//! One pump runs per direction per connection. Each pump owns its source
//! read half and destination write half; the handler owns the sockets and
//! closes them only after both directions have terminated.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Forwarding buffer size.
pub const BUFFER_SIZE: usize = 8192;

/// Copy bytes from `source` to `dest` until end-of-stream or failure.
///
/// Every successful read adds to `counter` before the corresponding write,
/// so the counter reflects bytes read from `source` even when the write
/// side fails mid-connection. A zero-length read is a clean end-of-stream,
/// not an error.
///
/// On termination for any reason the destination's write side is shut down,
/// so the pump running the opposite direction observes end-of-stream
/// instead of reading forever. Sockets are never closed here; only the
/// owning handler does that, after both directions have finished.
pub async fn pump<R, W>(mut source: R, mut dest: W, counter: Arc<AtomicU64>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];

    let result = loop {
        match source.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => {
                counter.fetch_add(n as u64, Ordering::Relaxed);
                if let Err(e) = dest.write_all(&buf[..n]).await {
                    break Err(e);
                }
            }
            Err(e) => break Err(e),
        }
    };

    // Half-close for writing; tolerate an already-closed peer.
    let _ = dest.shutdown().await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_pump_counts_bytes_and_ends_cleanly() {
        let (client, mut client_far) = duplex(64);
        let (dest, mut dest_far) = duplex(64);
        let counter = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(pump(client, dest, Arc::clone(&counter)));

        client_far.write_all(b"hello, world").await.unwrap();
        client_far.shutdown().await.unwrap();

        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(counter.load(Ordering::Relaxed), 12);

        let mut out = Vec::new();
        dest_far.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello, world");
    }

    #[tokio::test]
    async fn test_pump_reports_write_error() {
        let (client, mut client_far) = duplex(64);
        let (dest, dest_far) = duplex(8);
        // Closing the far end makes subsequent writes fail.
        drop(dest_far);

        let counter = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(pump(client, dest, Arc::clone(&counter)));

        client_far.write_all(b"payload").await.unwrap();
        client_far.shutdown().await.unwrap();

        let result = handle.await.unwrap();
        assert!(result.is_err());
        // Bytes were read from the source before the write failed.
        assert_eq!(counter.load(Ordering::Relaxed), 7);
    }

    #[tokio::test]
    async fn test_pump_half_closes_destination() {
        let (client, client_far) = duplex(64);
        let (dest, mut dest_far) = duplex(64);
        let counter = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(pump(client, dest, counter));

        // Source end-of-stream with no data.
        drop(client_far);
        handle.await.unwrap().unwrap();

        // The destination's reader sees end-of-stream after the pump exits.
        let mut buf = [0u8; 8];
        let n = dest_far.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
