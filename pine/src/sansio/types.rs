//! Core types for the sans-io PINE implementation.

use std::convert::TryFrom;
use std::fmt;

use serde_derive::{Deserialize, Serialize};

use crate::{context, Error, ErrorKind, Result};

/// Number of save-state slots addressable through the client.
pub const STATE_SLOTS: usize = 4;

/// The emulator family a session talks to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// PCSX2
    Ps2,
    /// RPCS3
    Ps3,
}

impl Platform {
    /// Base name of the emulator's IPC socket.
    pub fn socket_name(self) -> &'static str {
        match self {
            Platform::Ps2 => "pcsx2",
            Platform::Ps3 => "rpcs3",
        }
    }

    /// The IPC slot the emulator listens on unless configured otherwise.
    pub fn default_slot(self) -> u16 {
        match self {
            Platform::Ps2 => 28011,
            Platform::Ps3 => 28012,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.socket_name())
    }
}

/// Operand width of a memory read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            8 => Ok(Width::W8),
            16 => Ok(Width::W16),
            32 => Ok(Width::W32),
            64 => Ok(Width::W64),
            n => Err(context!(ErrorKind::InvalidOperand(format!("width {}", n)))),
        }
    }

    /// Cuts `value` down to the low `self.bits()` bits.
    pub fn truncate(self, value: u64) -> u64 {
        match self {
            Width::W64 => value,
            w => value & ((1u64 << w.bits()) - 1),
        }
    }
}

/// PINE wire opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Read8,
    Read16,
    Read32,
    Read64,
    Write8,
    Write16,
    Write32,
    Write64,
    Version,
    SaveState,
    LoadState,
    GameTitle,
    GameId,
    GameUuid,
    GameVersion,
    Status,
    Unimplemented,
}

impl Opcode {
    pub fn read(width: Width) -> Self {
        match width {
            Width::W8 => Opcode::Read8,
            Width::W16 => Opcode::Read16,
            Width::W32 => Opcode::Read32,
            Width::W64 => Opcode::Read64,
        }
    }

    pub fn write(width: Width) -> Self {
        match width {
            Width::W8 => Opcode::Write8,
            Width::W16 => Opcode::Write16,
            Width::W32 => Opcode::Write32,
            Width::W64 => Opcode::Write64,
        }
    }

    /// Operand width of memory opcodes, `None` for everything else.
    pub fn width(self) -> Option<Width> {
        match self {
            Opcode::Read8 | Opcode::Write8 => Some(Width::W8),
            Opcode::Read16 | Opcode::Write16 => Some(Width::W16),
            Opcode::Read32 | Opcode::Write32 => Some(Width::W32),
            Opcode::Read64 | Opcode::Write64 => Some(Width::W64),
            _ => None,
        }
    }

    pub fn is_read(self) -> bool {
        matches!(
            self,
            Opcode::Read8 | Opcode::Read16 | Opcode::Read32 | Opcode::Read64
        )
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            Opcode::Write8 | Opcode::Write16 | Opcode::Write32 | Opcode::Write64
        )
    }

    pub fn takes_slot(self) -> bool {
        matches!(self, Opcode::SaveState | Opcode::LoadState)
    }

    /// Whether the reply is a length-prefixed string.
    pub fn returns_string(self) -> bool {
        matches!(
            self,
            Opcode::Version
                | Opcode::GameTitle
                | Opcode::GameId
                | Opcode::GameUuid
                | Opcode::GameVersion
        )
    }

    /// Size of the reply fragment, or `None` when it is a variable length string.
    pub fn reply_size(self) -> Option<usize> {
        if self.returns_string() {
            return None;
        }
        match self {
            Opcode::Read8 | Opcode::Read16 | Opcode::Read32 | Opcode::Read64 => {
                self.width().map(Width::bytes)
            }
            Opcode::Status => Some(4),
            _ => Some(0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Read8 => "READ_8",
            Opcode::Read16 => "READ_16",
            Opcode::Read32 => "READ_32",
            Opcode::Read64 => "READ_64",
            Opcode::Write8 => "WRITE_8",
            Opcode::Write16 => "WRITE_16",
            Opcode::Write32 => "WRITE_32",
            Opcode::Write64 => "WRITE_64",
            Opcode::Version => "VERSION",
            Opcode::SaveState => "SAVE_STATE",
            Opcode::LoadState => "LOAD_STATE",
            Opcode::GameTitle => "GAME_TITLE",
            Opcode::GameId => "GAME_ID",
            Opcode::GameUuid => "GAME_UUID",
            Opcode::GameVersion => "GAME_VERSION",
            Opcode::Status => "STATUS",
            Opcode::Unimplemented => "UNIMPLEMENTED",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        match op {
            Opcode::Read8 => 0x00,
            Opcode::Read16 => 0x01,
            Opcode::Read32 => 0x02,
            Opcode::Read64 => 0x03,
            Opcode::Write8 => 0x04,
            Opcode::Write16 => 0x05,
            Opcode::Write32 => 0x06,
            Opcode::Write64 => 0x07,
            Opcode::Version => 0x08,
            Opcode::SaveState => 0x09,
            Opcode::LoadState => 0x0A,
            Opcode::GameTitle => 0x0B,
            Opcode::GameId => 0x0C,
            Opcode::GameUuid => 0x0D,
            Opcode::GameVersion => 0x0E,
            Opcode::Status => 0x0F,
            Opcode::Unimplemented => 0xFF,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        Ok(match b {
            0x00 => Opcode::Read8,
            0x01 => Opcode::Read16,
            0x02 => Opcode::Read32,
            0x03 => Opcode::Read64,
            0x04 => Opcode::Write8,
            0x05 => Opcode::Write16,
            0x06 => Opcode::Write32,
            0x07 => Opcode::Write64,
            0x08 => Opcode::Version,
            0x09 => Opcode::SaveState,
            0x0A => Opcode::LoadState,
            0x0B => Opcode::GameTitle,
            0x0C => Opcode::GameId,
            0x0D => Opcode::GameUuid,
            0x0E => Opcode::GameVersion,
            0x0F => Opcode::Status,
            0xFF => Opcode::Unimplemented,
            b => {
                return Err(context!(ErrorKind::InvalidOperand(format!(
                    "opcode {:#04x}",
                    b
                ))))
            }
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One PINE command.
///
/// Use the constructors, which only set the operands the opcode takes.
/// Hand-built commands are checked by [`encode`](super::protocol::encode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub opcode: Opcode,
    pub address: Option<u32>,
    pub value: Option<u64>,
    pub slot: Option<u8>,
}

impl Command {
    /// A command without operands (queries like `VERSION` or `STATUS`).
    pub fn new(opcode: Opcode) -> Self {
        Command {
            opcode,
            address: None,
            value: None,
            slot: None,
        }
    }

    pub fn read(width: Width, address: u32) -> Self {
        Command {
            address: Some(address),
            ..Command::new(Opcode::read(width))
        }
    }

    /// `value` is truncated to `width` when encoded.
    pub fn write(width: Width, address: u32, value: u64) -> Self {
        Command {
            address: Some(address),
            value: Some(value),
            ..Command::new(Opcode::write(width))
        }
    }

    pub fn save_state(slot: u8) -> Self {
        Command {
            slot: Some(slot),
            ..Command::new(Opcode::SaveState)
        }
    }

    pub fn load_state(slot: u8) -> Self {
        Command {
            slot: Some(slot),
            ..Command::new(Opcode::LoadState)
        }
    }
}

/// The sticky per-session result code.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Success,
    Fail,
    OutOfMemory,
    NoConnection,
    Unimplemented,
    Unknown,
}

impl ErrorCode {
    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = Error;

    fn try_from(i: i32) -> Result<Self> {
        match i {
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Fail),
            2 => Ok(ErrorCode::OutOfMemory),
            3 => Ok(ErrorCode::NoConnection),
            4 => Ok(ErrorCode::Unimplemented),
            5 => Ok(ErrorCode::Unknown),
            i => Err(context!(ErrorKind::InvalidOperand(format!(
                "error code {}",
                i
            )))),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ErrorCode::Success => "SUCCESS",
            ErrorCode::Fail => "FAIL",
            ErrorCode::OutOfMemory => "OUT_OF_MEMORY",
            ErrorCode::NoConnection => "NO_CONNECTION",
            ErrorCode::Unimplemented => "UNIMPLEMENTED",
            ErrorCode::Unknown => "UNKNOWN",
        })
    }
}

/// Run state of the emulator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmuStatus {
    Error,
    Running,
    Paused,
    Shutdown,
}

impl From<u32> for EmuStatus {
    fn from(raw: u32) -> Self {
        match raw {
            0 => EmuStatus::Running,
            1 => EmuStatus::Paused,
            2 => EmuStatus::Shutdown,
            _ => EmuStatus::Error,
        }
    }
}

/// Result of parsing a reply frame from a byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// A complete frame was parsed
    Complete {
        /// Result byte of the frame (`IPC_OK` or `IPC_FAIL`)
        result: u8,
        /// The reply fragments, concatenated
        payload: Vec<u8>,
        /// Number of bytes consumed from input
        consumed: usize,
    },
    /// More data is needed to complete the frame
    Incomplete {
        /// Minimum number of additional bytes needed
        needed: usize,
    },
    /// The buffer does not hold a valid frame
    Invalid {
        /// Description of the parse error
        error: String,
    },
}
