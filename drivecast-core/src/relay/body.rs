//! Outward body of a relayed media response.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, error, info};

use super::RelayError;
use crate::provider::ByteStream;

/// Pull-based relay of upstream body chunks.
///
/// Each upstream chunk is yielded as-is, so memory stays bounded by the
/// upstream chunk size regardless of file size. Dropping the body drops the
/// upstream stream, which releases the upstream connection.
pub struct RelayBody {
    file_id: String,
    /// First chunk, read before headers are committed
    first: Option<Bytes>,
    upstream: Option<ByteStream>,
    bytes_relayed: u64,
    chunks_relayed: u64,
    finished: bool,
}

impl RelayBody {
    /// Body with no content, used for HEAD and empty upstream bodies.
    pub fn empty(file_id: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            first: None,
            upstream: None,
            bytes_relayed: 0,
            chunks_relayed: 0,
            finished: true,
        }
    }

    /// Reads the first upstream chunk and wraps the rest of the stream.
    ///
    /// Headers have not been sent yet when this runs, so a failure here is
    /// still reportable as a status code.
    ///
    /// # Errors
    ///
    /// - `RelayError::StreamInterrupted` - If the first read from upstream fails
    pub async fn start(file_id: &str, mut upstream: ByteStream) -> Result<Self, RelayError> {
        match upstream.next().await {
            Some(Ok(chunk)) => Ok(Self {
                file_id: file_id.to_string(),
                first: Some(chunk),
                upstream: Some(upstream),
                bytes_relayed: 0,
                chunks_relayed: 0,
                finished: false,
            }),
            Some(Err(e)) => Err(RelayError::StreamInterrupted {
                reason: e.to_string(),
            }),
            None => Ok(Self::empty(file_id)),
        }
    }

    /// Returns true if the body will not yield any bytes.
    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.upstream.is_none()
    }

    pub fn bytes_relayed(&self) -> u64 {
        self.bytes_relayed
    }

    fn record(&mut self, chunk: &Bytes) {
        self.bytes_relayed += chunk.len() as u64;
        self.chunks_relayed += 1;
    }
}

impl Stream for RelayBody {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(chunk) = this.first.take() {
            this.record(&chunk);
            return Poll::Ready(Some(Ok(chunk)));
        }

        let Some(upstream) = this.upstream.as_mut() else {
            return Poll::Ready(None);
        };

        match upstream.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.record(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // Status line is already on the wire; the connection gets aborted
                error!(
                    file_id = %this.file_id,
                    bytes_relayed = this.bytes_relayed,
                    "Upstream stream interrupted mid-relay: {}",
                    e
                );
                this.upstream = None;
                this.finished = true;
                Poll::Ready(Some(Err(io::Error::other(e))))
            }
            Poll::Ready(None) => {
                debug!(
                    file_id = %this.file_id,
                    bytes_relayed = this.bytes_relayed,
                    chunks = this.chunks_relayed,
                    "Relay complete"
                );
                this.upstream = None;
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match (&self.first, &self.upstream) {
            (None, None) => (0, Some(0)),
            (first, Some(upstream)) => {
                let (lower, upper) = upstream.size_hint();
                let extra = usize::from(first.is_some());
                (lower + extra, upper.map(|upper| upper + extra))
            }
            (Some(_), None) => (1, Some(1)),
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                file_id = %self.file_id,
                bytes_relayed = self.bytes_relayed,
                "Client disconnected before relay finished"
            );
        }
    }
}
