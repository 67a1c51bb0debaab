//! Batch builder: accumulates commands into one request frame.
//!
//! Each appended command gets the next reply slot. Slots are dense and zero-based and
//! match the order in which the emulator returns reply fragments.

use super::protocol::{
    encode_into, HEADER_SIZE, MAX_IPC_RETURN_SIZE, MAX_IPC_SIZE, REPLY_HEADER_SIZE,
};
use super::types::{Command, ErrorCode, Opcode};
use crate::{context, ErrorKind, Result};

#[derive(Debug, Clone)]
pub struct Batch {
    frame: Vec<u8>,
    opcodes: Vec<Opcode>,
    reply_size: usize,
}

impl Batch {
    pub fn new() -> Self {
        let mut frame = Vec::with_capacity(64);
        frame.extend_from_slice(&[0u8; HEADER_SIZE]);
        Batch {
            frame,
            opcodes: Vec::new(),
            reply_size: REPLY_HEADER_SIZE,
        }
    }

    /// Append `command` and return its reply slot.
    ///
    /// Fails with `InvalidOperand` for malformed commands, and with an `OUT_OF_MEMORY`
    /// command failure if the request or its reply would outgrow the emulator's IPC
    /// buffers. The batch is unchanged on failure.
    pub fn append(&mut self, command: &Command) -> Result<usize> {
        let start = self.frame.len();
        let written = encode_into(command, &mut self.frame)?;

        // Strings are variable, only their length prefix is accounted for.
        let reply = command.opcode.reply_size().unwrap_or(4);

        if start + written > MAX_IPC_SIZE || self.reply_size + reply > MAX_IPC_RETURN_SIZE {
            self.frame.truncate(start);
            return Err(context!(ErrorKind::CommandFailed {
                operation: "BatchAppend",
                code: ErrorCode::OutOfMemory,
            }));
        }

        self.reply_size += reply;
        self.opcodes.push(command.opcode);
        Ok(self.opcodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    /// Close the batch: returns the request frame with its size patched in, and the
    /// opcodes needed to split the reply.
    pub fn finish(mut self) -> (Vec<u8>, Vec<Opcode>) {
        let size = self.frame.len() as u32;
        self.frame[..HEADER_SIZE].copy_from_slice(&size.to_le_bytes());
        (self.frame, self.opcodes)
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}
