//! Typed access to one emulator.

use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::Endpoint;
use crate::sansio::types::{Command, EmuStatus, ErrorCode, Opcode, Platform, Width, STATE_SLOTS};
use crate::session::Session;
use crate::{context, map_context, Error, ErrorKind, Result};

const STATE_IDS: [u8; STATE_SLOTS] = [0, 1, 2, 3];

/// Metadata of the running game.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GameInfo {
    pub title: String,
    pub id: String,
    pub uuid: String,
    pub version: String,
}

/// A client for one emulator instance.
///
/// Every operation is a full round trip: the request, the reply and the check of the
/// session's result code happen inside the call, so a returned value is always one the
/// emulator acknowledged.
///
/// # Example
///
/// ```no_run
/// use pine::{Client, Platform};
///
/// let mut client = Client::connect(Platform::Ps2)?;
/// client.write_u32(0x0010_0000, 0xDEAD_BEEF)?;
/// assert_eq!(client.read_u32(0x0010_0000)?, 0xDEAD_BEEF);
///
/// client.state_slot(1)?.save()?;
/// client.close()?;
/// # Ok::<(), pine::Error>(())
/// ```
pub struct Client {
    session: Session,
}

impl Client {
    /// Connect to the emulator at `address`.
    ///
    /// An empty `address` selects the endpoint from the environment, or the platform
    /// default (see [`Endpoint::from_env`]).
    pub fn open<S: AsRef<str>>(address: S, platform: Platform) -> Result<Self> {
        let address = address.as_ref();

        let endpoint = if address.is_empty() {
            Endpoint::from_env(platform)
        } else {
            address.parse()
        }
        .map_err(|e| unreachable_at(e, address.to_string()))?;

        Self::with_endpoint(&endpoint, platform)
    }

    /// Connect to the default endpoint of `platform`.
    pub fn connect(platform: Platform) -> Result<Self> {
        Self::open("", platform)
    }

    pub fn with_endpoint(endpoint: &Endpoint, platform: Platform) -> Result<Self> {
        let session =
            Session::open(endpoint, platform).map_err(|e| unreachable_at(e, endpoint.to_string()))?;
        Self::from_session(session)
    }

    /// Take over `session`. Fails with `AllocationFailed` if the session already carries
    /// a failure, in which case it is released.
    pub fn from_session(session: Session) -> Result<Self> {
        let code = session.last_error();
        if !code.is_success() {
            if let Err(e) = session.close() {
                warn!("Releasing failed session: {}", e);
            }
            return Err(context!(ErrorKind::AllocationFailed(code)));
        }

        debug!("{} client ready", session.platform());
        Ok(Client { session })
    }

    pub fn platform(&self) -> Platform {
        self.session.platform()
    }

    /// Result code of the most recent operation.
    pub fn last_error(&self) -> ErrorCode {
        self.session.last_error()
    }

    /// The underlying session, for batched access.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn read_u8(&mut self, address: u32) -> Result<u8> {
        Ok(self.read(Width::W8, address)? as u8)
    }

    pub fn read_u16(&mut self, address: u32) -> Result<u16> {
        Ok(self.read(Width::W16, address)? as u16)
    }

    pub fn read_u32(&mut self, address: u32) -> Result<u32> {
        Ok(self.read(Width::W32, address)? as u32)
    }

    pub fn read_u64(&mut self, address: u32) -> Result<u64> {
        self.read(Width::W64, address)
    }

    /// Reads 32 bits and reinterprets them, NaN payloads included.
    pub fn read_f32(&mut self, address: u32) -> Result<f32> {
        Ok(f32::from_bits(self.read(Width::W32, address)? as u32))
    }

    pub fn read_f64(&mut self, address: u32) -> Result<f64> {
        Ok(f64::from_bits(self.read(Width::W64, address)?))
    }

    pub fn write_u8(&mut self, address: u32, value: u8) -> Result<()> {
        self.write(Width::W8, address, value.into())
    }

    pub fn write_u16(&mut self, address: u32, value: u16) -> Result<()> {
        self.write(Width::W16, address, value.into())
    }

    pub fn write_u32(&mut self, address: u32, value: u32) -> Result<()> {
        self.write(Width::W32, address, value.into())
    }

    pub fn write_u64(&mut self, address: u32, value: u64) -> Result<()> {
        self.write(Width::W64, address, value)
    }

    pub fn write_f32(&mut self, address: u32, value: f32) -> Result<()> {
        self.write(Width::W32, address, value.to_bits().into())
    }

    pub fn write_f64(&mut self, address: u32, value: f64) -> Result<()> {
        self.write(Width::W64, address, value.to_bits())
    }

    /// Version string of the emulator.
    pub fn version(&mut self) -> Result<String> {
        self.run("Version", Command::new(Opcode::Version))?;
        self.session.reply_string(0)
    }

    /// Run state of the emulator. `Error` whenever the query itself failed.
    pub fn status(&mut self) -> EmuStatus {
        let status = self
            .session
            .execute(Command::new(Opcode::Status))
            .and_then(|_| self.session.reply_status(0));

        match status {
            Ok(status) if self.session.last_error().is_success() => status,
            Ok(_) => EmuStatus::Error,
            Err(e) => {
                debug!("Status query failed: {}", e);
                EmuStatus::Error
            }
        }
    }

    /// Title, serial, disc CRC and version of the running game, queried in one batch.
    ///
    /// `None` if any of the four queries fails.
    pub fn game_info(&mut self) -> Option<GameInfo> {
        match self.query_game_info() {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("No game info: {}", e);
                None
            }
        }
    }

    /// Handle for save-state slot `i`, `0 <= i < STATE_SLOTS`.
    pub fn state_slot(&mut self, i: usize) -> Result<StateSlot<'_>> {
        let id = STATE_IDS.get(i).copied().ok_or_else(|| {
            context!(ErrorKind::InvalidOperand(format!(
                "state slot {} out of range",
                i
            )))
        })?;

        Ok(StateSlot { client: self, id })
    }

    pub fn close(self) -> Result<()> {
        self.session.close()
    }

    fn read(&mut self, width: Width, address: u32) -> Result<u64> {
        self.run(Opcode::read(width).name(), Command::read(width, address))?;
        self.session.reply_int(0, width)
    }

    fn write(&mut self, width: Width, address: u32, value: u64) -> Result<()> {
        self.run(
            Opcode::write(width).name(),
            Command::write(width, address, value),
        )
    }

    fn query_game_info(&mut self) -> Result<GameInfo> {
        let queries = [
            Opcode::GameTitle,
            Opcode::GameId,
            Opcode::GameUuid,
            Opcode::GameVersion,
        ];

        self.session.begin()?;
        for &op in queries.iter() {
            if let Err(e) = self.session.append(Command::new(op)) {
                self.session.abort();
                return Err(e);
            }
        }
        let sent = self.session.finalize();
        let sent = self.check("GameInfo", sent.map(|_| ()));

        // Copy every string out, so all reply buffers are released on every path.
        let title = self.session.reply_string(0);
        let id = self.session.reply_string(1);
        let uuid = self.session.reply_string(2);
        let version = self.session.reply_string(3);
        sent?;

        Ok(GameInfo {
            title: title?,
            id: id?,
            uuid: uuid?,
            version: version?,
        })
    }

    fn run(&mut self, operation: &'static str, command: Command) -> Result<()> {
        let result = self.session.execute(command);
        self.check(operation, result)
    }

    /// Turns the outcome of a request and the session's result code into the error the
    /// caller sees.
    fn check(&self, operation: &'static str, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => match self.session.last_error() {
                ErrorCode::Success => Ok(()),
                ErrorCode::NoConnection => Err(context!(ErrorKind::TransportError(
                    ErrorCode::NoConnection
                ))),
                code => Err(context!(ErrorKind::CommandFailed { operation, code })),
            },
            Err(e) => match e.kind().clone() {
                ErrorKind::TransportError(ErrorCode::NoConnection) => Err(e),
                ErrorKind::TransportError(code) => {
                    Err(e).map_err(map_context!(ErrorKind::CommandFailed { operation, code }))
                }
                _ => Err(e),
            },
        }
    }
}

fn unreachable_at(e: Error, address: String) -> Error {
    Error::new(
        ErrorKind::Unreachable(address),
        Some(Box::from(e)),
        Some(format!("{}:{}: ", file!(), line!())),
    )
}

/// A save-state slot of the emulator, borrowed from its [`Client`].
pub struct StateSlot<'a> {
    client: &'a mut Client,
    id: u8,
}

impl<'a> StateSlot<'a> {
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Save the emulator state into this slot.
    pub fn save(&mut self) -> Result<()> {
        self.client.run("StateSave", Command::save_state(self.id))
    }

    /// Restore the emulator state from this slot.
    pub fn load(&mut self) -> Result<()> {
        self.client.run("StateLoad", Command::load_state(self.id))
    }
}
