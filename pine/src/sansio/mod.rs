//! Sans-IO implementation of the PINE protocol.
//!
//! Everything in here works on byte buffers only, so the protocol logic can be tested
//! without an emulator and reused with any transport:
//!
//! - [`protocol`]: encoding of command records, decoding of reply fragments and frames
//! - [`batch`]: accumulation of commands into one request frame with dense reply slots
//! - [`types`]: opcodes, commands, result and status codes
//!
//! # Example
//!
//! ```
//! use pine::sansio::{parse_frame, split_reply, Batch, ParseResult};
//! use pine::sansio::types::{Command, Width};
//!
//! let mut batch = Batch::new();
//! let slot = batch.append(&Command::read(Width::W16, 0x0010_0000))?;
//! let (request, opcodes) = batch.finish();
//! assert_eq!(request.len(), 4 + 5);
//!
//! // The emulator answers with the result byte and a 2 byte fragment.
//! let reply = [7, 0, 0, 0, 0x00, 0x34, 0x12];
//! if let ParseResult::Complete { payload, .. } = parse_frame(&reply) {
//!     let fragments = split_reply(&opcodes, &payload);
//!     assert_eq!(fragments[slot], [0x34, 0x12]);
//! }
//! # Ok::<(), pine::Error>(())
//! ```

pub mod batch;
pub mod protocol;
pub mod types;

pub use self::batch::Batch;
pub use self::protocol::{decode_int, decode_string, encode, parse_frame, split_reply};
pub use self::types::{Command, EmuStatus, ErrorCode, Opcode, ParseResult, Platform, Width};
