use crate::protocol::{self, Reply, Request};

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

/// Maximum number of bytes a single request may occupy.
///
/// Generous because `execute_code` payloads routinely embed whole source
/// files. Exceeding the cap produces an error reply rather than a dropped
/// connection, so the client learns why it was refused.
pub const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// Receive one `Request` from and send one `Reply` to a remote peer.
///
/// Each connection carries exactly one JSON object in each direction, with
/// no pipelining. To read the request, the `Connection` fills an internal
/// buffer until the accumulated bytes parse as a complete JSON document or
/// the peer half-closes. The reply is a single JSON document flushed in
/// full before the server closes the socket.
#[derive(Debug)]
pub struct Connection {
    // The `TcpStream` is decorated with a `BufWriter`, which provides write
    // level buffering. The `BufWriter` implementation provided by Tokio is
    // sufficient for our needs.
    stream: BufWriter<TcpStream>,

    // The buffer used to accumulate the request document.
    buffer: BytesMut,
}

/// Outcome of reading from a connection.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete request document was decoded.
    Request(Request),

    /// The peer closed without sending anything. No reply is owed.
    Closed,
}

/// Error encountered while reading a request.
///
/// The two variants drive the reply policy: an `Invalid` request still gets
/// an error reply on the same socket, while a `Transport` failure means no
/// reply can be attempted and the connection is simply dropped.
#[derive(Debug)]
pub enum ReadError {
    /// The peer sent bytes that do not form a valid request document.
    Invalid(protocol::Error),

    /// The socket failed before a complete document arrived.
    Transport(io::Error),
}

impl Connection {
    /// Create a new `Connection`, backed by `socket`. Read and write
    /// buffers are initialized.
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Read the single request document from the underlying stream.
    ///
    /// The function accumulates bytes until the buffer parses as a complete
    /// JSON document. Parsing is attempted after every read so that a
    /// request followed immediately by more TCP data still decodes; the
    /// peer does not have to half-close for the server to make progress.
    pub async fn read_request(&mut self) -> Result<ReadOutcome, ReadError> {
        loop {
            if self.buffer.len() > MAX_REQUEST_BYTES {
                return Err(ReadError::Invalid(protocol::Error::Oversized));
            }

            if !self.buffer.is_empty() {
                match Request::decode(&self.buffer) {
                    Ok(request) => return Ok(ReadOutcome::Request(request)),
                    Err(protocol::Error::Incomplete) => {}
                    Err(err) => return Err(ReadError::Invalid(err)),
                }
            }

            let read = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(ReadError::Transport)?;

            if read == 0 {
                // The peer half-closed. An empty buffer is a clean close
                // and is silently dropped. Anything else must decode now
                // or the request is malformed.
                if self.buffer.is_empty() {
                    return Ok(ReadOutcome::Closed);
                }
                return match Request::decode(&self.buffer) {
                    Ok(request) => Ok(ReadOutcome::Request(request)),
                    Err(err) => Err(ReadError::Invalid(err)),
                };
            }
        }
    }

    /// Write a single `Reply` document to the underlying stream.
    ///
    /// The document is written into the buffered stream and then flushed so
    /// the full reply is on the wire before the caller closes the socket.
    pub async fn write_reply(&mut self, reply: &Reply) -> io::Result<()> {
        let payload = serde_json::to_vec(reply)?;
        self.stream.write_all(&payload).await?;
        self.stream.flush().await
    }
}
