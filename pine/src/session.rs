//! Transport session: one connection to an emulator's IPC endpoint.
//!
//! The session owns the stream, the sticky result code of the last operation, the
//! batch being accumulated (if any) and the reply fragments of the last batch.
//!
//! ```text
//! open ──▶ Open::Idle ◀──────▶ Open::BatchPending ──▶ (close / drop) Closed
//!              begin()/finalize()
//! ```

use std::io::{Read, Write};

use tracing::{debug, trace, warn};

use crate::address::Endpoint;
use crate::sansio::protocol::{self, HEADER_SIZE, IPC_FAIL, IPC_OK};
use crate::sansio::types::{Command, EmuStatus, ErrorCode, Opcode, ParseResult, Platform, Width};
use crate::sansio::Batch;
use crate::stream::Stream;
use crate::{context, Error, ErrorKind, Result};

pub struct Session {
    platform: Platform,
    endpoint: Option<Endpoint>,
    stream: Option<Box<dyn Stream>>,
    last_error: ErrorCode,
    batch: Option<Batch>,
    replies: Vec<Option<Vec<u8>>>,
    released: bool,
}

impl Session {
    /// Connect to the emulator at `endpoint`.
    ///
    /// Fails with `TransportError(NoConnection)` if the endpoint does not accept the
    /// connection.
    pub fn open(endpoint: &Endpoint, platform: Platform) -> Result<Self> {
        let stream = endpoint.connect()?;
        debug!("Opened {} session on {}", platform, endpoint);

        let mut session = Session::with_stream(stream, platform);
        session.endpoint = Some(endpoint.clone());
        Ok(session)
    }

    /// Wrap an already connected stream. The session cannot reconnect once the stream
    /// is lost.
    pub fn with_stream(stream: Box<dyn Stream>, platform: Platform) -> Self {
        Session {
            platform,
            endpoint: None,
            stream: Some(stream),
            last_error: ErrorCode::Success,
            batch: None,
            replies: Vec::new(),
            released: false,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// The result code of the most recent operation on this session.
    pub fn last_error(&self) -> ErrorCode {
        self.last_error
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_batch_pending(&self) -> bool {
        self.batch.is_some()
    }

    /// Start a batch.
    ///
    /// Only one batch can be pending per session. A second `begin()` fails with
    /// `AlreadyOpen` and leaves the pending batch untouched.
    pub fn begin(&mut self) -> Result<()> {
        if self.batch.is_some() {
            return Err(context!(ErrorKind::AlreadyOpen));
        }
        self.batch = Some(Batch::new());
        Ok(())
    }

    /// Add `command` to the pending batch and return its reply slot.
    pub fn append(&mut self, command: Command) -> Result<usize> {
        let batch = self
            .batch
            .as_mut()
            .ok_or_else(|| context!(ErrorKind::BatchNotOpen))?;

        match batch.append(&command) {
            Ok(slot) => {
                trace!("Batched {} in slot {}", command.opcode, slot);
                Ok(slot)
            }
            Err(e) => {
                if let ErrorKind::CommandFailed { code, .. } = e.kind() {
                    self.last_error = *code;
                }
                Err(e)
            }
        }
    }

    /// Drop the pending batch without sending it.
    pub fn abort(&mut self) {
        if let Some(batch) = self.batch.take() {
            debug!("Discarding batch of {} commands", batch.len());
        }
    }

    /// Send the pending batch as one request and wait for the reply.
    ///
    /// Returns the number of commands sent; their replies are then available in slots
    /// `0..count`. The batch is closed on every path. Fails with `TransportError` if the
    /// emulator cannot be reached or rejects the request, `last_error()` tells which.
    pub fn finalize(&mut self) -> Result<usize> {
        let batch = self
            .batch
            .take()
            .ok_or_else(|| context!(ErrorKind::BatchNotOpen))?;
        self.replies.clear();

        if batch.is_empty() {
            self.last_error = ErrorCode::Success;
            return Ok(0);
        }

        let (frame, opcodes) = batch.finish();
        self.exchange(&frame, &opcodes)
    }

    /// Run a single command as a batch of its own. Its reply is in slot 0.
    pub fn execute(&mut self, command: Command) -> Result<()> {
        self.begin()?;
        if let Err(e) = self.append(command) {
            self.batch = None;
            return Err(e);
        }
        self.finalize().map(|_| ())
    }

    /// Send a complete, already encoded request frame and wait for the reply.
    ///
    /// The reply fragments are stored like those of a batch, so `receive(slot)` returns
    /// the reply to the `slot`-th command of `frame`. Returns the number of commands in
    /// the frame. A malformed frame fails with `InvalidOperand` and is not transmitted.
    pub fn send(&mut self, frame: &[u8]) -> Result<usize> {
        let opcodes = protocol::request_opcodes(frame)?;
        self.replies.clear();

        if opcodes.is_empty() {
            self.last_error = ErrorCode::Success;
            return Ok(0);
        }

        self.exchange(frame, &opcodes)
    }

    /// Reply fragment of `slot` from the most recent request.
    pub fn receive(&self, slot: usize) -> Result<&[u8]> {
        match self.replies.get(slot) {
            Some(Some(fragment)) => Ok(fragment),
            _ => Err(context!(ErrorKind::SlotNotFound(slot))),
        }
    }

    /// Free the reply fragment of `slot`.
    pub fn release(&mut self, slot: usize) {
        if let Some(fragment) = self.replies.get_mut(slot) {
            *fragment = None;
        }
    }

    pub fn reply_int(&self, slot: usize, width: Width) -> Result<u64> {
        protocol::decode_int(self.receive(slot)?, width)
    }

    pub fn reply_status(&self, slot: usize) -> Result<EmuStatus> {
        protocol::decode_status(self.receive(slot)?)
    }

    /// Copy the string reply of `slot` out and release its buffer, whether or not
    /// decoding succeeds.
    pub fn reply_string(&mut self, slot: usize) -> Result<String> {
        let text = self.receive(slot).and_then(protocol::decode_string);
        self.release(slot);
        text
    }

    /// Release the session.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    /// One round trip: write `frame`, read the reply and split it per command.
    fn exchange(&mut self, frame: &[u8], opcodes: &[Opcode]) -> Result<usize> {
        self.replies.clear();
        self.write_frame(frame)?;
        let payload = self.receive_frame()?;

        let fragments = protocol::split_reply(opcodes, &payload);
        if fragments.len() < opcodes.len() {
            warn!(
                "Short reply: {} of {} fragments",
                fragments.len(),
                opcodes.len()
            );
        }

        self.replies = fragments.into_iter().map(Some).collect();
        self.last_error = ErrorCode::Success;
        Ok(opcodes.len())
    }

    /// Write a request frame, reconnecting first if the connection was lost earlier.
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.ensure_connected()?;

        let result = match self.stream.as_mut() {
            Some(stream) => stream.write_all(frame).and_then(|_| stream.flush()),
            None => return Err(self.fail(ErrorCode::NoConnection)),
        };

        match result {
            Ok(()) => {
                trace!("Sent {} bytes", frame.len());
                Ok(())
            }
            Err(e) => Err(self.lost(e)),
        }
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let connected = match self.endpoint {
            Some(ref endpoint) => endpoint.connect(),
            None => Err(context!(ErrorKind::TransportError(ErrorCode::NoConnection))),
        };

        match connected {
            Ok(stream) => {
                debug!("Reconnected {} session", self.platform);
                self.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.last_error = ErrorCode::NoConnection;
                Err(e)
            }
        }
    }

    fn receive_frame(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; HEADER_SIZE];
        self.read_exact(&mut buf)?;

        let needed = match protocol::parse_frame(&buf) {
            ParseResult::Incomplete { needed } => needed,
            ParseResult::Invalid { error } => {
                warn!("{}", error);
                // The stream position is lost, start over on the next request.
                self.stream = None;
                return Err(self.fail(ErrorCode::Unknown));
            }
            ParseResult::Complete { .. } => return Err(self.fail(ErrorCode::Unknown)),
        };

        buf.resize(HEADER_SIZE + needed, 0);
        self.read_exact(&mut buf[HEADER_SIZE..])?;

        match protocol::parse_frame(&buf) {
            ParseResult::Complete {
                result: IPC_OK,
                payload,
                ..
            } => {
                trace!("Received {} byte reply", buf.len());
                Ok(payload)
            }
            ParseResult::Complete {
                result: IPC_FAIL, ..
            } => Err(self.fail(ErrorCode::Fail)),
            ParseResult::Complete { result, .. } => {
                warn!("Unknown result byte {:#04x}", result);
                Err(self.fail(ErrorCode::Unknown))
            }
            _ => Err(self.fail(ErrorCode::Unknown)),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = match self.stream.as_mut() {
            Some(stream) => stream.read_exact(buf),
            None => return Err(self.fail(ErrorCode::NoConnection)),
        };
        result.map_err(|e| self.lost(e))
    }

    fn fail(&mut self, code: ErrorCode) -> Error {
        debug!("{} session: {}", self.platform, code);
        self.last_error = code;
        context!(ErrorKind::TransportError(code))
    }

    /// The connection broke: drop the stream so the next request reconnects.
    fn lost(&mut self, e: std::io::Error) -> Error {
        warn!("Lost connection to {}: {}", self.platform, e);
        self.stream = None;
        self.last_error = ErrorCode::NoConnection;
        Error::new(
            ErrorKind::TransportError(ErrorCode::NoConnection),
            Some(Box::from(e)),
            Some(format!("{}:{}: ", file!(), line!())),
        )
    }

    /// Both emulators listen on plain sockets, so every platform is released the same
    /// way: by shutting the stream down.
    fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.abort();
        self.replies.clear();

        debug!("Releasing {} session", self.platform);

        match self.stream.take() {
            Some(mut stream) => match stream.shutdown() {
                Err(ref e) if e.kind() == &ErrorKind::TransportError(ErrorCode::NoConnection) => {
                    Ok(())
                }
                r => r,
            },
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Releasing {} session: {}", self.platform, e);
        }
    }
}
