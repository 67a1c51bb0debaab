//!Client for the PINE IPC protocol of the PCSX2 and RPCS3 emulators.
//!
//!PINE lets another process read and write emulator memory, save and load states, and
//!query the running game. The emulator listens on a local socket; this crate speaks the
//!protocol over it.
//!
//!```rust,no_run
//!use pine::{Client, EmuStatus, Platform};
//!
//!let mut client = Client::connect(Platform::Ps2)?;
//!
//!if client.status() == EmuStatus::Running {
//!    client.write_u32(0x0010_0000, 0xDEAD_BEEF)?;
//!    assert_eq!(client.read_u32(0x0010_0000)?, 0xDEAD_BEEF);
//!}
//!
//!if let Some(info) = client.game_info() {
//!    println!("{} ({})", info.title, info.id);
//!}
//!# Ok::<(), pine::Error>(())
//!```
//!
//!Several commands can be sent in one round trip through the [`Session`]:
//!
//!```rust,no_run
//!use pine::sansio::{Command, Width};
//!use pine::{Client, Platform};
//!
//!let mut client = Client::open("unix:/run/user/1000/pcsx2.sock", Platform::Ps2)?;
//!let session = client.session_mut();
//!
//!session.begin()?;
//!let lo = session.append(Command::read(Width::W32, 0x0020_0000))?;
//!let hi = session.append(Command::read(Width::W32, 0x0020_0004))?;
//!session.finalize()?;
//!
//!let value = session.reply_int(hi, Width::W32)? << 32 | session.reply_int(lo, Width::W32)?;
//!# let _ = value;
//!# Ok::<(), pine::Error>(())
//!```
//!
//!The protocol logic itself lives in [`sansio`] and works without any I/O.
//!
//!The crate logs through [`tracing`](https://docs.rs/tracing); install a subscriber in the
//!application to see the events.

pub use crate::address::Endpoint;
pub use crate::client::{Client, GameInfo, StateSlot};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::sansio::types::{EmuStatus, ErrorCode, Platform, STATE_SLOTS};
pub use crate::session::Session;
pub use crate::stream::Stream;

pub mod address;
pub mod client;
mod error;
pub mod sansio;
pub mod session;
pub mod stream;

#[cfg(test)]
mod test;
