use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use static_assertions::{assert_impl_all, assert_not_impl_any};

use crate::sansio::protocol::{HEADER_SIZE, IPC_FAIL, IPC_OK, REPLY_HEADER_SIZE};
use crate::sansio::Opcode;
use crate::*;

assert_impl_all!(Client: Send);
assert_impl_all!(Session: Send);
assert_impl_all!(Error: std::error::Error);
assert_not_impl_any!(Session: Clone);
assert_not_impl_any!(Client: Clone);

/// In-process emulator speaking the server side of the protocol on byte buffers.
pub struct FakeEmulator {
    pub memory: HashMap<u32, u8>,
    pub states: HashMap<u8, HashMap<u32, u8>>,
    pub saves: Vec<u8>,
    pub loads: Vec<u8>,
    pub status: u32,
    pub version: String,
    pub title: String,
    pub id: String,
    pub uuid: String,
    pub game_version: String,
    /// Opcodes that make the whole request fail.
    pub failing: HashSet<Opcode>,
    /// Bytes cut from the end of every reply payload.
    pub truncate_reply: usize,
    /// Announce a reply size smaller than the reply header.
    pub corrupt_size: bool,
    pub online: bool,
    pub requests: usize,
    pub shutdowns: usize,
}

impl FakeEmulator {
    pub fn new() -> Self {
        FakeEmulator {
            memory: HashMap::new(),
            states: HashMap::new(),
            saves: Vec::new(),
            loads: Vec::new(),
            status: 0,
            version: "PCSX2 1.7.5".into(),
            title: "Okami".into(),
            id: "SLUS-20946".into(),
            uuid: "c1f86f0f".into(),
            game_version: "1.01".into(),
            failing: HashSet::new(),
            truncate_reply: 0,
            corrupt_size: false,
            online: true,
            requests: 0,
            shutdowns: 0,
        }
    }

    pub fn poke(&mut self, address: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(address.wrapping_add(i as u32), *b);
        }
    }

    pub fn peek(&self, address: u32, len: usize) -> Vec<u8> {
        (0..len as u32)
            .map(|i| *self.memory.get(&address.wrapping_add(i)).unwrap_or(&0))
            .collect()
    }

    /// Answer one complete request frame.
    pub fn handle(&mut self, request: &[u8]) -> Vec<u8> {
        self.requests += 1;

        let (result, mut payload) = match self.execute(&request[HEADER_SIZE..]) {
            Some(payload) => (IPC_OK, payload),
            None => (IPC_FAIL, Vec::new()),
        };
        let keep = payload.len().saturating_sub(self.truncate_reply);
        payload.truncate(keep);

        let size = if self.corrupt_size {
            2
        } else {
            (REPLY_HEADER_SIZE + payload.len()) as u32
        };

        let mut reply = size.to_le_bytes().to_vec();
        reply.push(result);
        reply.extend(payload);
        reply
    }

    fn execute(&mut self, mut records: &[u8]) -> Option<Vec<u8>> {
        let mut reply = Vec::new();

        while let Some((&b, rest)) = records.split_first() {
            records = rest;
            let op = Opcode::try_from(b).ok()?;
            if op == Opcode::Unimplemented || self.failing.contains(&op) {
                return None;
            }

            if let Some(width) = op.width() {
                let address = take(&mut records, 4)?;
                let address = u32::from_le_bytes([address[0], address[1], address[2], address[3]]);
                if op.is_read() {
                    reply.extend(self.peek(address, width.bytes()));
                } else {
                    let value = take(&mut records, width.bytes())?.to_vec();
                    self.poke(address, &value);
                }
                continue;
            }

            match op {
                Opcode::SaveState => {
                    let slot = take(&mut records, 1)?[0];
                    self.states.insert(slot, self.memory.clone());
                    self.saves.push(slot);
                }
                Opcode::LoadState => {
                    let slot = take(&mut records, 1)?[0];
                    self.memory = self.states.get(&slot)?.clone();
                    self.loads.push(slot);
                }
                Opcode::Status => reply.extend_from_slice(&self.status.to_le_bytes()),
                Opcode::Version => push_string(&mut reply, &self.version),
                Opcode::GameTitle => push_string(&mut reply, &self.title),
                Opcode::GameId => push_string(&mut reply, &self.id),
                Opcode::GameUuid => push_string(&mut reply, &self.uuid),
                Opcode::GameVersion => push_string(&mut reply, &self.game_version),
                _ => return None,
            }
        }

        Some(reply)
    }
}

fn take<'a>(records: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    if records.len() < n {
        return None;
    }
    let (head, tail) = records.split_at(n);
    *records = tail;
    Some(head)
}

fn push_string(reply: &mut Vec<u8>, s: &str) {
    reply.extend_from_slice(&(s.len() as u32 + 1).to_le_bytes());
    reply.extend_from_slice(s.as_bytes());
    reply.push(0);
}

/// In-memory [`Stream`] in front of a [`FakeEmulator`].
pub struct MockStream {
    emu: Arc<Mutex<FakeEmulator>>,
    inbox: Vec<u8>,
    outbox: Vec<u8>,
}

impl MockStream {
    pub fn new(emu: Arc<Mutex<FakeEmulator>>) -> Self {
        MockStream {
            emu,
            inbox: Vec::new(),
            outbox: Vec::new(),
        }
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.emu.lock().unwrap().online {
            return Ok(0);
        }
        let n = buf.len().min(self.outbox.len());
        buf[..n].copy_from_slice(&self.outbox[..n]);
        self.outbox.drain(..n);
        Ok(n)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut emu = self.emu.lock().unwrap();
        if !emu.online {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "emulator gone"));
        }

        self.inbox.extend_from_slice(buf);
        while self.inbox.len() >= HEADER_SIZE {
            let size = u32::from_le_bytes([
                self.inbox[0],
                self.inbox[1],
                self.inbox[2],
                self.inbox[3],
            ]) as usize;
            assert!(size >= HEADER_SIZE, "request frame of {} bytes", size);
            if self.inbox.len() < size {
                break;
            }
            let request: Vec<u8> = self.inbox.drain(..size).collect();
            self.outbox.extend(emu.handle(&request));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for MockStream {
    fn shutdown(&mut self) -> Result<()> {
        self.emu.lock().unwrap().shutdowns += 1;
        Ok(())
    }
}

#[test]
fn test_fake_emulator_rejects_unknown_opcode() {
    let mut emu = FakeEmulator::new();
    let reply = emu.handle(&[6, 0, 0, 0, 0x42, 0x00]);
    assert_eq!(reply, [5, 0, 0, 0, IPC_FAIL]);
}

#[cfg(unix)]
mod socket {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;

    /// Serve `connections` connections in turn, each for at most `requests` requests or
    /// until the client hangs up.
    fn serve(
        listener: UnixListener,
        emu: Arc<Mutex<FakeEmulator>>,
        connections: usize,
        requests: Option<usize>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for conn in listener.incoming().take(connections) {
                let mut conn = conn.unwrap();
                let mut served = 0;

                while requests.map_or(true, |max| served < max) {
                    let mut header = [0u8; HEADER_SIZE];
                    if conn.read_exact(&mut header).is_err() {
                        break;
                    }
                    let mut request = header.to_vec();
                    request.resize(u32::from_le_bytes(header) as usize, 0);
                    conn.read_exact(&mut request[HEADER_SIZE..]).unwrap();

                    let reply = emu.lock().unwrap().handle(&request);
                    conn.write_all(&reply).unwrap();
                    served += 1;
                }
            }
        })
    }

    #[test]
    fn test_ps2_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcsx2.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let emu = Arc::new(Mutex::new(FakeEmulator::new()));
        let server = serve(listener, emu.clone(), 1, None);

        let mut client = Client::open(format!("unix:{}", path.display()), Platform::Ps2).unwrap();
        assert_eq!(client.platform(), Platform::Ps2);

        client.write_u32(0x0010_0000, 0xDEAD_BEEF).unwrap();
        assert_eq!(client.read_u32(0x0010_0000).unwrap(), 0xDEAD_BEEF);

        client.state_slot(1).unwrap().save().unwrap();
        assert_eq!(client.last_error(), ErrorCode::Success);
        client.state_slot(1).unwrap().load().unwrap();
        assert_eq!(client.last_error(), ErrorCode::Success);

        let info = client.game_info().unwrap();
        assert_eq!(info.id, "SLUS-20946");
        assert_eq!(client.status(), EmuStatus::Running);

        client.close().unwrap();
        server.join().unwrap();

        let emu = emu.lock().unwrap();
        assert_eq!(emu.requests, 6);
        assert_eq!(emu.saves, vec![1]);
        assert_eq!(emu.loads, vec![1]);
    }

    #[test]
    fn test_reconnect_after_severed_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpcs3.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let emu = Arc::new(Mutex::new(FakeEmulator::new()));
        let server = serve(listener, emu.clone(), 2, Some(1));

        let endpoint = Endpoint::Unix(path);
        let mut client = Client::with_endpoint(&endpoint, Platform::Ps3).unwrap();

        client.write_u64(0x20, 42).unwrap();

        // The server hung up after the first request.
        let e = client.read_u64(0x20).unwrap_err();
        assert_eq!(
            e.kind(),
            &ErrorKind::TransportError(ErrorCode::NoConnection)
        );
        assert_eq!(client.last_error(), ErrorCode::NoConnection);

        assert_eq!(client.read_u64(0x20).unwrap(), 42);
        assert_eq!(client.last_error(), ErrorCode::Success);

        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn test_address_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rpcs3.sock.28100");
        let listener = UnixListener::bind(&path).unwrap();
        let emu = Arc::new(Mutex::new(FakeEmulator::new()));
        let server = serve(listener, emu.clone(), 1, None);

        std::env::set_var(address::ADDRESS_ENV, format!("unix:{}", path.display()));
        let client = Client::connect(Platform::Ps3);
        std::env::remove_var(address::ADDRESS_ENV);

        let mut client = client.unwrap();
        assert_eq!(client.version().unwrap(), "PCSX2 1.7.5");
        client.close().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn test_unreachable_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::Unix(dir.path().join("pcsx2.sock"));

        let e = Client::with_endpoint(&endpoint, Platform::Ps2).err().unwrap();
        assert_eq!(e.kind(), &ErrorKind::Unreachable(endpoint.to_string()));

        let cause = std::error::Error::source(&e).unwrap().to_string();
        assert_eq!(cause, "Transport error: NO_CONNECTION");
    }
}
