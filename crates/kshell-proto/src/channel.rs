//! Blocking message channel over a byte stream.
//!
//! The codec itself has no notion of time. Deadlines come from the
//! socket: a read or write that runs past its timeout surfaces as an I/O
//! error from `send`/`recv`, and the caller decides whether to retry or
//! drop the connection.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use kshell_types::config::ServerConfig;
use kshell_types::error::Result;

use crate::message::{Message, Protocol};

/// Socket timeouts; `None` blocks forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl Timeouts {
    /// Build from millisecond values where 0 means no timeout.
    pub fn from_millis(read_ms: u64, write_ms: u64) -> Self {
        let to_duration = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            read: to_duration(read_ms),
            write: to_duration(write_ms),
        }
    }
}

impl From<&ServerConfig> for Timeouts {
    fn from(server: &ServerConfig) -> Self {
        Timeouts::from_millis(server.read_timeout_ms, server.write_timeout_ms)
    }
}

/// A stream that speaks whole messages.
///
/// One `recv` call yields one complete message or an error; there is no
/// resumption of a partially read message.
pub struct Channel<S = TcpStream> {
    stream: S,
    protocol: Protocol,
}

impl<S: Read + Write> Channel<S> {
    pub fn new(stream: S, protocol: Protocol) -> Self {
        Self { stream, protocol }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Start an outgoing message with this channel's protocol identity.
    pub fn message(&self, cmd: u16, status: u32, req_id: u32) -> Message {
        self.protocol.message(cmd, status, req_id)
    }

    pub fn send(&mut self, msg: &Message) -> Result<usize> {
        msg.send(&mut self.stream)
    }

    pub fn recv(&mut self) -> Result<Message> {
        Message::recv(&mut self.stream, &self.protocol)
    }

    /// Receive the next message, or `None` if the peer closed the stream
    /// cleanly between messages.
    pub fn recv_next(&mut self) -> Result<Option<Message>> {
        Message::recv_next(&mut self.stream, &self.protocol)
    }

    /// Send `request` and wait for the next message.
    ///
    /// Logs a warning when the reply carries a different request id; the
    /// reply is still returned.
    pub fn request(&mut self, request: &Message) -> Result<Message> {
        self.send(request)?;
        let reply = self.recv()?;
        if reply.req_id() != request.req_id() {
            log::warn!(
                "reply req_id {} does not match request {}",
                reply.req_id(),
                request.req_id()
            );
        }
        Ok(reply)
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl Channel<TcpStream> {
    /// Connect to a daemon and apply the timeouts.
    pub fn connect(address: &str, protocol: Protocol, timeouts: Timeouts) -> Result<Self> {
        let stream = TcpStream::connect(address)?;
        Self::from_tcp(stream, protocol, timeouts)
    }

    /// Wrap an accepted connection and apply the timeouts.
    pub fn from_tcp(stream: TcpStream, protocol: Protocol, timeouts: Timeouts) -> Result<Self> {
        stream.set_read_timeout(timeouts.read)?;
        stream.set_write_timeout(timeouts.write)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, protocol))
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }
}
