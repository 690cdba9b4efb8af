//! Blocking request/response listener.
//!
//! Connections are served one at a time on the calling thread: the plugin
//! context is not shared across threads and handlers are expected to be
//! short. Each connection carries any number of request/response pairs
//! until the peer closes it or sends a message that fails to decode.

use std::net::{SocketAddr, TcpListener, TcpStream};

use kshell_proto::{Channel, Protocol, Timeouts};
use kshell_types::config::ServerConfig;
use kshell_types::error::{Result, ShellError};

use crate::dispatch::Dispatcher;

/// How a served connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    /// The peer closed the stream between messages.
    ByPeer,
    /// A message failed to decode, or the stream ended partway through one,
    /// and the stream was dropped.
    Framing,
}

pub struct Server {
    listener: TcpListener,
    protocol: Protocol,
    timeouts: Timeouts,
    dispatcher: Dispatcher,
}

impl Server {
    /// Bind to `server.listen`.
    pub fn bind(server: &ServerConfig, dispatcher: Dispatcher) -> Result<Self> {
        let listener = TcpListener::bind(&server.listen)?;
        log::info!("listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            protocol: Protocol::from(server),
            timeouts: Timeouts::from(server),
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serve connections forever. Per-connection errors are logged.
    pub fn run(&self) -> Result<()> {
        loop {
            if let Err(e) = self.serve_next() {
                log::warn!("connection error: {e}");
            }
        }
    }

    /// Accept one connection and serve it until it closes.
    pub fn serve_next(&self) -> Result<Closed> {
        let (stream, peer) = self.listener.accept()?;
        log::debug!("connection from {peer}");
        let closed = self.serve(stream)?;
        log::debug!("connection from {peer} closed ({closed:?})");
        Ok(closed)
    }

    fn serve(&self, stream: TcpStream) -> Result<Closed> {
        let mut channel = Channel::from_tcp(stream, self.protocol, self.timeouts)?;
        loop {
            let request = match channel.recv_next() {
                Ok(Some(msg)) => msg,
                Ok(None) => return Ok(Closed::ByPeer),
                Err(ShellError::Framing(e)) => {
                    // The stream position is unknown after a bad message.
                    log::warn!("dropping connection: {e}");
                    return Ok(Closed::Framing);
                },
                Err(e) => return Err(e),
            };
            let response = self.dispatcher.handle(&request, &self.protocol);
            channel.send(&response)?;
        }
    }
}
