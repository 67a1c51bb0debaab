//! Pure protocol encoding and decoding functions.
//!
//! All multi-byte integers on the wire are little-endian.
//!
//! Request frame:
//!
//! ```text
//! ┌───────────┬──────────────────────────────────────────────┐
//! │ size: u32 │ command records, back to back                │
//! └───────────┴──────────────────────────────────────────────┘
//!   record = opcode: u8 [address: u32] [value: 1/2/4/8 bytes] [slot: u8]
//! ```
//!
//! Reply frame:
//!
//! ```text
//! ┌───────────┬────────────┬─────────────────────────────────┐
//! │ size: u32 │ result: u8 │ reply fragments, in request order│
//! └───────────┴────────────┴─────────────────────────────────┘
//! ```
//!
//! `size` counts the whole frame including the size field itself.

use std::convert::TryFrom;

use super::types::{Command, EmuStatus, Opcode, ParseResult, Width, STATE_SLOTS};
use crate::{context, ErrorKind, Result};

/// Largest request frame the emulator accepts.
pub const MAX_IPC_SIZE: usize = 650_000;

/// Largest reply frame the emulator produces.
pub const MAX_IPC_RETURN_SIZE: usize = 450_000;

/// Size of the request frame header.
pub const HEADER_SIZE: usize = 4;

/// Size of the reply frame header (size + result byte).
pub const REPLY_HEADER_SIZE: usize = 5;

/// Result byte of a successful reply.
pub const IPC_OK: u8 = 0x00;

/// Result byte of a rejected request.
pub const IPC_FAIL: u8 = 0xFF;

fn invalid(what: String) -> crate::Error {
    context!(ErrorKind::InvalidOperand(what))
}

/// Check that `command` carries exactly the operands its opcode takes.
pub fn validate(command: &Command) -> Result<()> {
    let op = command.opcode;

    match (op.is_read() || op.is_write(), command.address) {
        (true, None) => return Err(invalid(format!("{} without address", op))),
        (false, Some(a)) => {
            return Err(invalid(format!("{} does not take an address ({:#x})", op, a)))
        }
        _ => {}
    }

    match (op.is_write(), command.value) {
        (true, None) => return Err(invalid(format!("{} without value", op))),
        (false, Some(v)) => {
            return Err(invalid(format!("{} does not take a value ({:#x})", op, v)))
        }
        _ => {}
    }

    match (op.takes_slot(), command.slot) {
        (true, None) => Err(invalid(format!("{} without slot", op))),
        (true, Some(s)) if s as usize >= STATE_SLOTS => {
            Err(invalid(format!("state slot {} out of range", s)))
        }
        (false, Some(s)) => Err(invalid(format!("{} does not take a slot ({})", op, s))),
        _ => Ok(()),
    }
}

/// Append the wire record of `command` to `buf`.
///
/// Returns the number of bytes written. Nothing is written if the command is invalid.
pub fn encode_into(command: &Command, buf: &mut Vec<u8>) -> Result<usize> {
    validate(command)?;

    let start = buf.len();
    buf.push(command.opcode.into());

    if let Some(address) = command.address {
        buf.extend_from_slice(&address.to_le_bytes());
    }

    if let (Some(value), Some(width)) = (command.value, command.opcode.width()) {
        let bytes = width.truncate(value).to_le_bytes();
        buf.extend_from_slice(&bytes[..width.bytes()]);
    }

    if let Some(slot) = command.slot {
        buf.push(slot);
    }

    Ok(buf.len() - start)
}

/// Encode one command into its wire record.
///
/// # Example
///
/// ```
/// use pine::sansio::protocol::encode;
/// use pine::sansio::types::{Command, Width};
///
/// let bytes = encode(&Command::write(Width::W16, 0x0010_0000, 0xBEEF)).unwrap();
/// assert_eq!(bytes, [0x05, 0x00, 0x00, 0x10, 0x00, 0xEF, 0xBE]);
/// ```
pub fn encode(command: &Command) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(14);
    encode_into(command, &mut buf)?;
    Ok(buf)
}

/// Decode a fixed-width integer reply fragment. The value is zero-extended.
pub fn decode_int(bytes: &[u8], width: Width) -> Result<u64> {
    if bytes.len() != width.bytes() {
        return Err(invalid(format!(
            "{} byte fragment for a {} bit reply",
            bytes.len(),
            width.bits()
        )));
    }

    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

/// Copy the text out of a string reply fragment (`len: u32` followed by `len` bytes,
/// NUL-terminated).
///
/// The fragment itself is not consumed; releasing it is up to the owner of the buffer.
pub fn decode_string(bytes: &[u8]) -> Result<String> {
    if bytes.len() < 4 {
        return Err(invalid(format!("{} byte string fragment", bytes.len())));
    }

    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let text = &bytes[4..];

    if text.len() < len {
        return Err(invalid(format!(
            "string of {} bytes in a {} byte fragment",
            len,
            text.len()
        )));
    }

    let text = &text[..len];
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
    Ok(String::from_utf8_lossy(&text[..end]).into_owned())
}

pub fn decode_status(bytes: &[u8]) -> Result<EmuStatus> {
    Ok(EmuStatus::from(decode_int(bytes, Width::W32)? as u32))
}

/// Parse one reply frame from the start of `buf`.
///
/// # Example
///
/// ```
/// use pine::sansio::protocol::parse_frame;
/// use pine::sansio::types::ParseResult;
///
/// let buf = [9, 0, 0, 0, 0x00, 0xEF, 0xBE, 0xAD, 0xDE];
/// match parse_frame(&buf) {
///     ParseResult::Complete { result, payload, consumed } => {
///         assert_eq!(result, 0);
///         assert_eq!(payload, [0xEF, 0xBE, 0xAD, 0xDE]);
///         assert_eq!(consumed, buf.len());
///     }
///     _ => panic!("Expected complete frame"),
/// }
/// ```
pub fn parse_frame(buf: &[u8]) -> ParseResult {
    if buf.len() < HEADER_SIZE {
        return ParseResult::Incomplete {
            needed: HEADER_SIZE - buf.len(),
        };
    }

    let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if size < REPLY_HEADER_SIZE {
        return ParseResult::Invalid {
            error: format!("Reply frame of {} bytes is shorter than its header", size),
        };
    }

    if size > MAX_IPC_RETURN_SIZE {
        return ParseResult::Invalid {
            error: format!(
                "Reply frame of {} bytes exceeds {}",
                size, MAX_IPC_RETURN_SIZE
            ),
        };
    }

    if buf.len() < size {
        return ParseResult::Incomplete {
            needed: size - buf.len(),
        };
    }

    ParseResult::Complete {
        result: buf[HEADER_SIZE],
        payload: buf[REPLY_HEADER_SIZE..size].to_vec(),
        consumed: size,
    }
}

/// Opcodes of the command records in a complete request frame, in order.
///
/// Fails with `InvalidOperand` if the size header does not match the frame or a record
/// is unknown or cut short.
pub fn request_opcodes(frame: &[u8]) -> Result<Vec<Opcode>> {
    if frame.len() < HEADER_SIZE {
        return Err(invalid(format!("{} byte request frame", frame.len())));
    }

    let size = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    if size != frame.len() || size > MAX_IPC_SIZE {
        return Err(invalid(format!(
            "request frame of {} bytes announces {}",
            frame.len(),
            size
        )));
    }

    let mut opcodes = Vec::new();
    let mut rest = &frame[HEADER_SIZE..];

    while let Some((&b, tail)) = rest.split_first() {
        let op = Opcode::try_from(b)?;

        let mut operands = 0;
        if op.is_read() || op.is_write() {
            operands += 4;
        }
        if let (true, Some(width)) = (op.is_write(), op.width()) {
            operands += width.bytes();
        }
        if op.takes_slot() {
            operands += 1;
        }

        if tail.len() < operands {
            return Err(invalid(format!("truncated {} record", op)));
        }
        opcodes.push(op);
        rest = &tail[operands..];
    }

    Ok(opcodes)
}

/// Split a reply payload into one fragment per request opcode.
///
/// Stops at the first fragment that does not fit, so a short reply yields fewer
/// fragments than opcodes.
pub fn split_reply(opcodes: &[Opcode], payload: &[u8]) -> Vec<Vec<u8>> {
    let mut fragments = Vec::with_capacity(opcodes.len());
    let mut rest = payload;

    for op in opcodes {
        let size = match op.reply_size() {
            Some(size) => size,
            None => {
                if rest.len() < 4 {
                    break;
                }
                let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
                match len.checked_add(4) {
                    Some(size) => size,
                    None => break,
                }
            }
        };

        if rest.len() < size {
            break;
        }

        let (fragment, tail) = rest.split_at(size);
        fragments.push(fragment.to_vec());
        rest = tail;
    }

    fragments
}
