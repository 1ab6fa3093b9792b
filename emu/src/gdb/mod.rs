//! Remote debug stub speaking the GDB remote serial protocol over TCP.
//!
//! The listener and the client stream are non-blocking. [`GdbStub::poll`]
//! drains whatever arrived and answers it; it never waits. Attaching halts
//! the target until the client sends `c` or `s`.
//!
//! Register numbering follows GDB's ARM layout:
//!
//! | index  | register                     |
//! |--------|------------------------------|
//! | 0-15   | r0-r15                       |
//! | 16-23  | f0-f7, 12 bytes each, zero   |
//! | 24     | fps, zero                    |
//! | 25     | cpsr                         |

pub mod packet;

use std::collections::BTreeSet;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::time::Duration;

use serde::Serialize;

use crate::error::{EmuError, Result};
use packet::{Frame, PacketReader};

pub const CPSR_INDEX: usize = 25;
const FPS_INDEX: usize = 24;
const FPA_REGISTERS: std::ops::RangeInclusive<usize> = 16..=23;
const GENERAL_REGISTERS: usize = 16;

/// Largest packet payload the stub accepts or sends, in characters.
const PACKET_SIZE: usize = 0x4000;
/// Bytes whose hex encoding still fits one packet.
const MAX_MEMORY_READ: u32 = (PACKET_SIZE / 2) as u32;

const SIGINT: &str = "S02";
const SIGTRAP: &str = "S05";

/// What the stub needs from the debugged core.
pub trait DebugTarget {
    /// `index` is 0-15 or [`CPSR_INDEX`].
    fn read_register(&self, index: usize) -> u32;
    fn write_register(&mut self, index: usize, value: u32);
    fn read_memory(&mut self, address: u32) -> u8;
    fn write_memory(&mut self, address: u32, value: u8);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Reply(String),
    /// Execution resumes; the stop reply is sent later.
    Resume,
    Detach { reply: bool },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebugStats {
    pub connections: u64,
    pub packets: u64,
    pub corrupt_packets: u64,
    pub breakpoint_hits: u64,
}

/// Command state independent of the transport.
#[derive(Debug, Default)]
pub struct DebugSession {
    breakpoints: BTreeSet<u32>,
    halted: bool,
    stepping: bool,
    stats: DebugStats,
}

impl DebugSession {
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    pub const fn halt(&mut self) {
        self.halted = true;
        self.stepping = false;
    }

    fn resume(&mut self, stepping: bool) {
        self.halted = false;
        self.stepping = stepping;
    }

    fn clear(&mut self) {
        self.breakpoints.clear();
        self.halted = false;
        self.stepping = false;
    }

    #[must_use]
    pub fn breakpoints(&self) -> &BTreeSet<u32> {
        &self.breakpoints
    }

    /// Called after every executed instruction. Returns the stop reply when
    /// the target should halt at `pc`.
    pub fn check_stop(&mut self, pc: u32) -> Option<&'static str> {
        if self.halted {
            return None;
        }
        if self.breakpoints.contains(&pc) {
            self.stats.breakpoint_hits += 1;
            tracing::info!("breakpoint hit at {pc:#010x}");
            self.halt();
            return Some(SIGTRAP);
        }
        if self.stepping {
            self.halt();
            return Some(SIGTRAP);
        }
        None
    }

    pub fn handle(&mut self, packet: &str, target: &mut dyn DebugTarget) -> Response {
        self.stats.packets += 1;
        tracing::debug!("gdb <- {packet}");

        let reply = match packet.as_bytes().first() {
            Some(b'?') => SIGTRAP.to_string(),
            Some(b'g') => read_all_registers(target),
            Some(b'G') => ok_or_error(write_all_registers(&packet[1..], target)),
            Some(b'p') => read_one_register(&packet[1..], target).unwrap_or_else(error_reply),
            Some(b'P') => ok_or_error(write_one_register(&packet[1..], target)),
            Some(b'm') => read_memory(&packet[1..], target).unwrap_or_else(error_reply),
            Some(b'M') => ok_or_error(write_memory(&packet[1..], target)),
            Some(b's') => {
                set_resume_address(&packet[1..], target);
                self.resume(true);
                return Response::Resume;
            }
            Some(b'c') => {
                set_resume_address(&packet[1..], target);
                self.resume(false);
                return Response::Resume;
            }
            Some(b'Z') => self.update_breakpoint(&packet[1..], true),
            Some(b'z') => self.update_breakpoint(&packet[1..], false),
            Some(b'H') => "OK".to_string(),
            Some(b'D') => {
                self.clear();
                return Response::Detach { reply: true };
            }
            Some(b'k') => {
                self.clear();
                return Response::Detach { reply: false };
            }
            _ if packet.starts_with("qSupported") => format!("PacketSize={PACKET_SIZE:x}"),
            _ if packet.starts_with("qAttached") => "1".to_string(),
            _ => String::new(),
        };

        Response::Reply(reply)
    }

    /// `Z0`/`Z1` software and hardware breakpoints share one set.
    fn update_breakpoint(&mut self, args: &str, insert: bool) -> String {
        let mut fields = args.split(',');
        let (Some(kind), Some(address)) = (fields.next(), fields.next()) else {
            return error_reply(());
        };
        if kind != "0" && kind != "1" {
            return String::new();
        }
        let Some(address) = packet::parse_hex_u32(address) else {
            return error_reply(());
        };

        if insert {
            self.breakpoints.insert(address);
        } else {
            self.breakpoints.remove(&address);
        }
        "OK".to_string()
    }
}

fn error_reply(_: ()) -> String {
    "E01".to_string()
}

fn ok_or_error(result: Option<()>) -> String {
    result.map_or_else(|| error_reply(()), |()| "OK".to_string())
}

fn register_image(index: usize, target: &dyn DebugTarget) -> Option<String> {
    match index {
        0..GENERAL_REGISTERS | CPSR_INDEX => Some(packet::hex_u32_le(target.read_register(index))),
        _ if FPA_REGISTERS.contains(&index) => Some("0".repeat(24)),
        FPS_INDEX => Some("0".repeat(8)),
        _ => None,
    }
}

fn read_all_registers(target: &dyn DebugTarget) -> String {
    (0..=CPSR_INDEX)
        .filter_map(|index| register_image(index, target))
        .collect()
}

fn write_all_registers(hex: &str, target: &mut dyn DebugTarget) -> Option<()> {
    let mut cursor = 0;
    for index in 0..=CPSR_INDEX {
        let width = if FPA_REGISTERS.contains(&index) { 24 } else { 8 };
        let image = hex.get(cursor..cursor + width)?;
        cursor += width;
        if index < GENERAL_REGISTERS || index == CPSR_INDEX {
            target.write_register(index, packet::parse_u32_le(image)?);
        }
    }
    Some(())
}

fn read_one_register(args: &str, target: &dyn DebugTarget) -> std::result::Result<String, ()> {
    let index = usize::from_str_radix(args, 16).map_err(|_| ())?;
    register_image(index, target).ok_or(())
}

fn write_one_register(args: &str, target: &mut dyn DebugTarget) -> Option<()> {
    let (index, value) = args.split_once('=')?;
    let index = usize::from_str_radix(index, 16).ok()?;
    match index {
        0..GENERAL_REGISTERS | CPSR_INDEX => {
            target.write_register(index, packet::parse_u32_le(value)?);
            Some(())
        }
        _ if index <= FPS_INDEX => Some(()),
        _ => None,
    }
}

fn parse_range(args: &str) -> Option<(u32, u32)> {
    let (address, length) = args.split_once(',')?;
    Some((packet::parse_hex_u32(address)?, packet::parse_hex_u32(length)?))
}

fn read_memory(args: &str, target: &mut dyn DebugTarget) -> std::result::Result<String, ()> {
    let (address, length) = parse_range(args).ok_or(())?;
    if length > MAX_MEMORY_READ {
        return Err(());
    }
    let bytes: Vec<u8> = (0..length)
        .map(|i| target.read_memory(address.wrapping_add(i)))
        .collect();
    Ok(packet::hex_bytes(&bytes))
}

fn write_memory(args: &str, target: &mut dyn DebugTarget) -> Option<()> {
    let (range, data) = args.split_once(':')?;
    let (address, length) = parse_range(range)?;
    let bytes = packet::parse_hex_bytes(data)?;
    if bytes.len() != length as usize {
        return None;
    }
    for (i, byte) in bytes.into_iter().enumerate() {
        target.write_memory(address.wrapping_add(i as u32), byte);
    }
    Some(())
}

fn set_resume_address(args: &str, target: &mut dyn DebugTarget) {
    if let Some(address) = packet::parse_hex_u32(args) {
        target.write_register(15, address);
    }
}

/// TCP transport around a [`DebugSession`].
#[derive(Debug)]
pub struct GdbStub {
    listener: TcpListener,
    stream: Option<TcpStream>,
    reader: PacketReader,
    session: DebugSession,
    last_sent: String,
}

impl GdbStub {
    /// Listens on `127.0.0.1:port`; port 0 picks a free port.
    ///
    /// # Errors
    ///
    /// Fails when the port cannot be bound.
    pub fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .and_then(|listener| listener.set_nonblocking(true).map(|()| listener))
            .map_err(|source| EmuError::DebugPortUnavailable { port, source })?;
        tracing::info!("gdb stub listening on port {port}");

        Ok(Self {
            listener,
            stream: None,
            reader: PacketReader::default(),
            session: DebugSession::default(),
            last_sent: String::new(),
        })
    }

    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_port(&self) -> io::Result<u16> {
        self.listener.local_addr().map(|addr| addr.port())
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.stream.is_some() && self.session.is_halted()
    }

    #[must_use]
    pub const fn stats(&self) -> DebugStats {
        self.session.stats
    }

    /// Accepts a pending client and answers every complete packet.
    pub fn poll(&mut self, target: &mut dyn DebugTarget) {
        if self.stream.is_none() {
            self.accept();
        }
        self.receive();

        while let Some(frame) = self.reader.next_frame() {
            match frame {
                Frame::Packet(packet) => {
                    self.send_raw("+");
                    match self.session.handle(&packet, target) {
                        Response::Reply(reply) => self.send(&reply),
                        Response::Resume => {}
                        Response::Detach { reply } => {
                            if reply {
                                self.send("OK");
                            }
                            self.disconnect();
                        }
                    }
                }
                Frame::Corrupt => {
                    self.session.stats.corrupt_packets += 1;
                    self.send_raw("-");
                }
                Frame::Interrupt => {
                    self.session.halt();
                    self.send(SIGINT);
                }
                Frame::Nack => {
                    let last = std::mem::take(&mut self.last_sent);
                    self.send_raw(&last);
                    self.last_sent = last;
                }
                Frame::Ack => {}
            }
        }
    }

    /// Checks the new PC after an instruction and reports a stop.
    pub fn after_step(&mut self, pc: u32) {
        if self.stream.is_none() {
            return;
        }
        if let Some(reply) = self.session.check_stop(pc) {
            self.send(reply);
        }
    }

    fn accept(&mut self) {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(true) {
                    tracing::warn!("gdb client {peer} rejected: {e}");
                    return;
                }
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::warn!("gdb client {peer}: cannot disable Nagle: {e}");
                }
                tracing::info!("gdb client attached from {peer}");
                self.stream = Some(stream);
                self.reader = PacketReader::default();
                self.session.clear();
                self.session.halt();
                self.session.stats.connections += 1;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => tracing::warn!("gdb accept failed: {e}"),
        }
    }

    fn receive(&mut self) {
        let Some(stream) = &mut self.stream else {
            return;
        };
        let mut buffer = [0u8; 4096];
        loop {
            match stream.read(&mut buffer) {
                Ok(0) => {
                    self.disconnect();
                    return;
                }
                Ok(n) => self.reader.push(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("gdb read failed: {e}");
                    self.disconnect();
                    return;
                }
            }
        }
    }

    fn send(&mut self, payload: &str) {
        tracing::debug!("gdb -> {payload}");
        let framed = packet::encode(payload);
        self.send_raw(&framed);
        self.last_sent = framed;
    }

    fn send_raw(&mut self, data: &str) {
        let Some(stream) = &mut self.stream else {
            return;
        };
        if let Err(e) = write_fully(stream, data.as_bytes()) {
            tracing::warn!("gdb write failed: {e}");
            self.disconnect();
        }
    }

    fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!("gdb client detached");
        }
        self.session.clear();
    }
}

/// Writes all of `data` to a non-blocking stream, waiting out a full send
/// buffer instead of treating it as a disconnect.
fn write_fully(stream: &mut impl Write, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match stream.write(data) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct FakeTarget {
        registers: [u32; 16],
        cpsr: u32,
        memory: BTreeMap<u32, u8>,
    }

    impl DebugTarget for FakeTarget {
        fn read_register(&self, index: usize) -> u32 {
            if index == CPSR_INDEX {
                self.cpsr
            } else {
                self.registers[index]
            }
        }

        fn write_register(&mut self, index: usize, value: u32) {
            if index == CPSR_INDEX {
                self.cpsr = value;
            } else {
                self.registers[index] = value;
            }
        }

        fn read_memory(&mut self, address: u32) -> u8 {
            self.memory.get(&address).copied().unwrap_or(0)
        }

        fn write_memory(&mut self, address: u32, value: u8) {
            self.memory.insert(address, value);
        }
    }

    fn reply(session: &mut DebugSession, target: &mut FakeTarget, packet: &str) -> String {
        match session.handle(packet, target) {
            Response::Reply(reply) => reply,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn register_packets() {
        let mut session = DebugSession::default();
        let mut target = FakeTarget::default();
        target.registers[0] = 0x42;
        target.registers[15] = 0x1000_0000;
        target.cpsr = 0xD3;

        let all = reply(&mut session, &mut target, "g");
        assert_eq!(all.len(), 16 * 8 + 8 * 24 + 8 + 8);
        assert!(all.starts_with("42000000"));
        assert!(all.ends_with("d3000000"));

        assert_eq!(reply(&mut session, &mut target, "pf"), "00000010");
        assert_eq!(reply(&mut session, &mut target, "p10"), "0".repeat(24));
        assert_eq!(reply(&mut session, &mut target, "p1a"), "E01");

        assert_eq!(reply(&mut session, &mut target, "P1=efbeadde"), "OK");
        assert_eq!(target.registers[1], 0xDEAD_BEEF);
        assert_eq!(reply(&mut session, &mut target, "P19=1f000000"), "OK");
        assert_eq!(target.cpsr, 0x1F);
    }

    #[test]
    fn write_all_registers_round_trip() {
        let mut session = DebugSession::default();
        let mut target = FakeTarget::default();
        target.registers[3] = 7;
        target.cpsr = 0x10;
        let image = reply(&mut session, &mut target, "g");

        let mut other = FakeTarget::default();
        assert_eq!(reply(&mut session, &mut other, &format!("G{image}")), "OK");

        assert_eq!(other.registers[3], 7);
        assert_eq!(other.cpsr, 0x10);
        assert_eq!(reply(&mut session, &mut other, "G1234"), "E01");
    }

    #[test]
    fn memory_packets() {
        let mut session = DebugSession::default();
        let mut target = FakeTarget::default();

        assert_eq!(reply(&mut session, &mut target, "M10000000,3:0a0b0c"), "OK");
        assert_eq!(reply(&mut session, &mut target, "m10000000,4"), "0a0b0c00");
        assert_eq!(reply(&mut session, &mut target, "M0,2:0a"), "E01");
    }

    #[test]
    fn memory_reads_fit_one_packet() {
        let mut session = DebugSession::default();
        let mut target = FakeTarget::default();

        let largest = reply(&mut session, &mut target, "m0,2000");
        assert_eq!(largest.len(), PACKET_SIZE);
        assert_eq!(reply(&mut session, &mut target, "m0,2001"), "E01");
        assert_eq!(reply(&mut session, &mut target, "m0,1000000"), "E01");
        assert_eq!(reply(&mut session, &mut target, "qSupported"), "PacketSize=4000");
    }

    #[test]
    fn breakpoints_halt_with_sigtrap() {
        let mut session = DebugSession::default();
        let mut target = FakeTarget::default();

        assert_eq!(reply(&mut session, &mut target, "Z0,10000008,4"), "OK");
        assert_eq!(reply(&mut session, &mut target, "Z2,10000008,4"), "");
        assert_eq!(session.handle("c", &mut target), Response::Resume);

        assert_eq!(session.check_stop(0x1000_0004), None);
        assert_eq!(session.check_stop(0x1000_0008), Some("S05"));
        assert!(session.is_halted());

        assert_eq!(reply(&mut session, &mut target, "z0,10000008,4"), "OK");
        assert!(session.breakpoints().is_empty());
    }

    #[test]
    fn single_step_stops_after_one_instruction() {
        let mut session = DebugSession::default();
        let mut target = FakeTarget::default();
        session.halt();

        assert_eq!(session.handle("s", &mut target), Response::Resume);
        assert!(!session.is_halted());
        assert_eq!(session.check_stop(0x20), Some("S05"));
        assert_eq!(session.check_stop(0x24), None);
    }

    #[test]
    fn misc_queries() {
        let mut session = DebugSession::default();
        let mut target = FakeTarget::default();

        assert_eq!(reply(&mut session, &mut target, "?"), "S05");
        assert_eq!(reply(&mut session, &mut target, "qAttached"), "1");
        assert!(reply(&mut session, &mut target, "qSupported:multiprocess+").starts_with("PacketSize"));
        assert_eq!(reply(&mut session, &mut target, "Hg0"), "OK");
        assert_eq!(reply(&mut session, &mut target, "vMustReplyEmpty"), "");
        assert_eq!(session.handle("D", &mut target), Response::Detach { reply: true });
        assert_eq!(session.handle("k", &mut target), Response::Detach { reply: false });
    }

    #[test]
    fn stub_over_tcp() {
        let mut stub = GdbStub::bind(0).unwrap();
        let port = stub.local_port().unwrap();
        let mut target = FakeTarget::default();
        target.registers[0] = 0x42;

        let mut client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        for _ in 0..100 {
            stub.poll(&mut target);
            if stub.is_attached() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(stub.is_halted());

        client.write_all(packet::encode("p0").as_bytes()).unwrap();
        let expected = format!("+{}", packet::encode("42000000"));
        let mut received = Vec::new();
        let mut buffer = [0u8; 64];
        while received.len() < expected.len() {
            stub.poll(&mut target);
            match client.read(&mut buffer) {
                Ok(n) => received.extend_from_slice(&buffer[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => panic!("{e}"),
            }
        }

        assert_eq!(String::from_utf8(received).unwrap(), expected);
        assert_eq!(stub.stats().packets, 1);
    }

    #[test]
    fn large_reply_survives_full_send_buffer() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();

        let reader = std::thread::spawn(move || {
            let mut received = Vec::new();
            client.read_to_end(&mut received).unwrap();
            received.len()
        });

        let payload = vec![b'5'; 8 << 20];
        write_fully(&mut server, &payload).unwrap();
        drop(server);

        assert_eq!(reader.join().unwrap(), payload.len());
    }

    #[test]
    fn busy_port_is_reported() {
        let first = GdbStub::bind(0).unwrap();
        let port = first.local_port().unwrap();

        let err = GdbStub::bind(port).unwrap_err();

        assert!(matches!(err, EmuError::DebugPortUnavailable { .. }));
    }
}
