//! Endpoint configuration.
//!
//! Endpoints are written as address URIs:
//!
//! - UNIX socket `unix:/run/user/1000/pcsx2.sock`
//! - TCP `tcp:127.0.0.1:28011` hostname/IP address and port
//!
//! Without an explicit address the emulator's own conventions apply: a socket named
//! after the emulator in the runtime directory on unix, a TCP port on localhost on
//! Windows. The slot (default 28011 for PCSX2, 28012 for RPCS3) selects between
//! several emulator instances.
//!
//! Environment:
//!
//! - `PINE_ADDRESS` overrides the whole address
//! - `PINE_SLOT` overrides the slot

use std::env;
use std::fmt;
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::sansio::types::{ErrorCode, Platform};
use crate::stream::Stream;
use crate::{context, map_context, ErrorKind, Result};

pub const ADDRESS_ENV: &str = "PINE_ADDRESS";
pub const SLOT_ENV: &str = "PINE_SLOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    /// The endpoint an emulator of `platform` listens on for `slot`.
    pub fn default_for(platform: Platform, slot: u16) -> Self {
        if cfg!(windows) {
            Endpoint::Tcp(format!("127.0.0.1:{}", slot))
        } else {
            Endpoint::Unix(socket_path(&runtime_dir(), platform, slot))
        }
    }

    /// Endpoint from `PINE_ADDRESS`/`PINE_SLOT`, falling back to the platform default.
    pub fn from_env(platform: Platform) -> Result<Self> {
        if let Ok(address) = env::var(ADDRESS_ENV) {
            return address.parse();
        }

        let slot = match env::var(SLOT_ENV) {
            Ok(s) => s.trim().parse::<u16>().map_err(map_context!(
                ErrorKind::InvalidAddress(format!("{}={}", SLOT_ENV, s))
            ))?,
            Err(_) => platform.default_slot(),
        };

        Ok(Endpoint::default_for(platform, slot))
    }

    /// Open a stream to the endpoint.
    ///
    /// Fails with `TransportError(NoConnection)` if nothing accepts the connection.
    pub fn connect(&self) -> Result<Box<dyn Stream>> {
        debug!("Connecting to {}", self);
        let no_connection = ErrorKind::TransportError(ErrorCode::NoConnection);

        match self {
            Endpoint::Tcp(addr) => {
                let stream =
                    TcpStream::connect(addr.as_str()).map_err(map_context!(no_connection))?;
                // Requests are small and latency bound.
                stream.set_nodelay(true).map_err(map_context!())?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).map_err(map_context!(no_connection))?;
                Ok(Box::new(stream))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(context!(ErrorKind::InvalidAddress(self.to_string()))),
        }
    }
}

impl FromStr for Endpoint {
    type Err = crate::Error;

    fn from_str(address: &str) -> Result<Self> {
        let address = address.trim();

        if let Some(path) = address.strip_prefix("unix:") {
            if !path.is_empty() {
                return Ok(Endpoint::Unix(PathBuf::from(path)));
            }
        } else if let Some(addr) = address.strip_prefix("tcp:") {
            if addr.rfind(':').map_or(false, |i| i > 0 && i + 1 < addr.len()) {
                return Ok(Endpoint::Tcp(addr.to_string()));
            }
        }

        Err(context!(ErrorKind::InvalidAddress(address.to_string())))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// Directory the emulators create their sockets in.
fn runtime_dir() -> PathBuf {
    let var = if cfg!(target_os = "macos") {
        "TMPDIR"
    } else {
        "XDG_RUNTIME_DIR"
    };

    match env::var_os(var) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from("/tmp"),
    }
}

fn socket_path(dir: &Path, platform: Platform, slot: u16) -> PathBuf {
    let name = if slot == platform.default_slot() {
        format!("{}.sock", platform.socket_name())
    } else {
        format!("{}.sock.{}", platform.socket_name(), slot)
    };
    dir.join(name)
}
