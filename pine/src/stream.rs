use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::error::*;

/// A byte stream to the emulator's IPC endpoint.
///
/// Implemented for the socket types the emulators listen on. Custom transports can
/// implement it and be handed to [`Session::with_stream`](crate::Session::with_stream).
pub trait Stream: Read + Write + Send + Sync {
    /// Shut down both directions. Called once when the session is released.
    fn shutdown(&mut self) -> Result<()>;
}

impl Stream for TcpStream {
    #[inline]
    fn shutdown(&mut self) -> Result<()> {
        TcpStream::shutdown(self, Shutdown::Both).map_err(crate::map_context!())?;
        Ok(())
    }
}

#[cfg(unix)]
impl Stream for UnixStream {
    #[inline]
    fn shutdown(&mut self) -> Result<()> {
        UnixStream::shutdown(self, Shutdown::Both).map_err(crate::map_context!())?;
        Ok(())
    }
}
