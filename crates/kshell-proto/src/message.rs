//! Message header, parameter headers, and the encode/decode paths.

use std::fmt;
use std::io::{self, Read, Write};

use kshell_types::config::{DEFAULT_MAX_MESSAGE_LEN, MIN_MESSAGE_LEN, ServerConfig};
use kshell_types::error::{FramingError, Result, ShellError};

use crate::params::{ParamRef, Params};

/// Size of the fixed message header on the wire.
pub const HEADER_LEN: usize = 24;

const _: () = assert!(HEADER_LEN == MIN_MESSAGE_LEN as usize);

/// Size of one parameter header on the wire.
pub const PARAM_HEADER_LEN: usize = 8;

/// Protocol identity and decode limits shared by both peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub magic: u32,
    pub major: u8,
    pub minor: u8,
    /// Largest declared total length the decoder will accept.
    pub max_len: u32,
}

impl Protocol {
    pub fn new(magic: u32, major: u8, minor: u8) -> Self {
        Self {
            magic,
            major,
            minor,
            max_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }

    pub fn with_max_len(mut self, max_len: u32) -> Self {
        self.max_len = max_len;
        self
    }

    /// Start an outgoing message stamped with this protocol's identity.
    pub fn message(&self, cmd: u16, status: u32, req_id: u32) -> Message {
        let mut msg = Message::new(self.magic, self.major, self.minor);
        msg.set_cmd(cmd);
        msg.set_status(status);
        msg.set_req_id(req_id);
        msg
    }

    fn check_header(&self, header: &Header) -> Result<()> {
        if header.magic != self.magic {
            return Err(FramingError::BadMagic {
                expected: self.magic,
                found: header.magic,
            }
            .into());
        }
        if header.major != self.major {
            return Err(FramingError::UnsupportedVersion {
                major: header.major,
                minor: header.minor,
            }
            .into());
        }
        if (header.len as usize) < HEADER_LEN || header.len > self.max_len {
            return Err(FramingError::LengthOutOfRange {
                len: header.len,
                min: MIN_MESSAGE_LEN,
                max: self.max_len,
            }
            .into());
        }
        Ok(())
    }
}

impl From<&ServerConfig> for Protocol {
    fn from(server: &ServerConfig) -> Self {
        Protocol::new(server.magic, server.version_major, server.version_minor)
            .with_max_len(server.max_message_len)
    }
}

/// Fixed message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub major: u8,
    pub minor: u8,
    pub cmd: u16,
    pub status: u32,
    pub req_id: u32,
    pub param_num: u32,
    /// Header + parameter headers + payloads.
    pub len: u32,
}

impl Header {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic.to_be_bytes());
        out.push(self.major);
        out.push(self.minor);
        out.extend_from_slice(&self.cmd.to_be_bytes());
        out.extend_from_slice(&self.status.to_be_bytes());
        out.extend_from_slice(&self.req_id.to_be_bytes());
        out.extend_from_slice(&self.param_num.to_be_bytes());
        out.extend_from_slice(&self.len.to_be_bytes());
    }

    fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let be32 = |at: usize| u32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        Self {
            magic: be32(0),
            major: raw[4],
            minor: raw[5],
            cmd: u16::from_be_bytes([raw[6], raw[7]]),
            status: be32(8),
            req_id: be32(12),
            param_num: be32(16),
            len: be32(20),
        }
    }
}

/// Per-parameter header: type tag and payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamHeader {
    param_type: u16,
    len: u32,
}

impl ParamHeader {
    pub fn new(param_type: u16, len: u32) -> Self {
        Self { param_type, len }
    }

    pub fn param_type(&self) -> u16 {
        self.param_type
    }

    /// Payload length, not counting this header.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.param_type.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.len.to_be_bytes());
    }

    /// `raw` is exactly one parameter header; the reserved bytes are ignored.
    fn decode(raw: &[u8]) -> Self {
        Self {
            param_type: u16::from_be_bytes([raw[0], raw[1]]),
            len: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Param {
    pub(crate) header: ParamHeader,
    pub(crate) data: Vec<u8>,
}

/// A single request or response.
///
/// Parameters can only be appended through [`Message::add_param`], which
/// keeps `param_num` and the total length in step with the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    params: Vec<Param>,
}

impl Message {
    /// Create an empty message: zero parameters, length = header size.
    pub fn new(magic: u32, major: u8, minor: u8) -> Self {
        Self {
            header: Header {
                magic,
                major,
                minor,
                cmd: 0,
                status: 0,
                req_id: 0,
                param_num: 0,
                len: HEADER_LEN as u32,
            },
            params: Vec::new(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn magic(&self) -> u32 {
        self.header.magic
    }

    pub fn version(&self) -> (u8, u8) {
        (self.header.major, self.header.minor)
    }

    pub fn cmd(&self) -> u16 {
        self.header.cmd
    }

    pub fn set_cmd(&mut self, cmd: u16) {
        self.header.cmd = cmd;
    }

    pub fn status(&self) -> u32 {
        self.header.status
    }

    pub fn set_status(&mut self, status: u32) {
        self.header.status = status;
    }

    pub fn req_id(&self) -> u32 {
        self.header.req_id
    }

    pub fn set_req_id(&mut self, req_id: u32) {
        self.header.req_id = req_id;
    }

    pub fn param_num(&self) -> u32 {
        self.header.param_num
    }

    /// Declared length of the whole message in bytes.
    pub fn total_len(&self) -> u32 {
        self.header.len
    }

    /// Append a parameter. Returns the payload length.
    ///
    /// Fails without touching the message if the payload or the resulting
    /// total length does not fit the 32-bit length fields.
    pub fn add_param(&mut self, param_type: u16, data: &[u8]) -> Result<u32> {
        let len = u32::try_from(data.len()).map_err(|_| {
            ShellError::Overflow(format!(
                "parameter of {} bytes exceeds the 32-bit length field",
                data.len()
            ))
        })?;
        let total = self
            .header
            .len
            .checked_add(PARAM_HEADER_LEN as u32)
            .and_then(|t| t.checked_add(len))
            .ok_or_else(|| {
                ShellError::Overflow(format!(
                    "message length {} + {} exceeds {}",
                    self.header.len,
                    PARAM_HEADER_LEN as u64 + u64::from(len),
                    u32::MAX
                ))
            })?;
        let param_num = self
            .header
            .param_num
            .checked_add(1)
            .ok_or_else(|| ShellError::Overflow("too many parameters".to_string()))?;

        self.header.len = total;
        self.header.param_num = param_num;
        self.params.push(Param {
            header: ParamHeader::new(param_type, len),
            data: data.to_vec(),
        });
        Ok(len)
    }

    /// Append a UTF-8 text parameter.
    pub fn add_str(&mut self, param_type: u16, text: &str) -> Result<u32> {
        self.add_param(param_type, text.as_bytes())
    }

    /// Forward iterator over all parameters. Call again to restart.
    pub fn params(&self) -> Params<'_> {
        Params::new(&self.params)
    }

    pub fn param(&self, index: usize) -> Option<ParamRef<'_>> {
        self.params().nth(index)
    }

    /// First parameter with the given type.
    pub fn param_by_type(&self, param_type: u16) -> Option<ParamRef<'_>> {
        self.params_by_type(param_type).next()
    }

    /// Every parameter with the given type, in message order.
    pub fn params_by_type(&self, param_type: u16) -> impl Iterator<Item = ParamRef<'_>> + Clone {
        self.params().filter(move |p| p.param_type() == param_type)
    }

    /// First parameter of the given type as text; `None` if absent,
    /// empty, or not UTF-8.
    pub fn param_str(&self, param_type: u16) -> Option<&str> {
        self.param_by_type(param_type)
            .filter(|p| !p.is_empty())
            .and_then(|p| p.as_str())
    }

    fn encode_head(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.params.len() * PARAM_HEADER_LEN);
        self.header.encode(&mut out);
        for param in &self.params {
            param.header.encode(&mut out);
        }
        out
    }

    /// Serialize into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.encode_head();
        out.reserve(self.header.len as usize - out.len());
        for param in &self.params {
            out.extend_from_slice(&param.data);
        }
        out
    }

    /// Write the whole message, blocking until every byte is written.
    ///
    /// Returns the number of bytes sent (the total length).
    pub fn send<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize> {
        writer.write_all(&self.encode_head())?;
        for param in &self.params {
            if !param.data.is_empty() {
                writer.write_all(&param.data)?;
            }
        }
        writer.flush()?;
        log::trace!("(o) {self}");
        Ok(self.header.len as usize)
    }

    /// Read exactly one message.
    ///
    /// Reads the header, validates it against `protocol`, then the
    /// parameter headers, then the payloads. Any short read or
    /// inconsistent length yields an error and no message.
    pub fn recv<R: Read + ?Sized>(reader: &mut R, protocol: &Protocol) -> Result<Self> {
        Self::recv_next(reader, protocol)?
            .ok_or_else(|| FramingError::Truncated("message header").into())
    }

    /// Like [`Message::recv`], but a stream that ends before the first
    /// header byte yields `None`. A stream ending anywhere later is still a
    /// truncation error.
    pub fn recv_next<R: Read + ?Sized>(reader: &mut R, protocol: &Protocol) -> Result<Option<Self>> {
        let mut raw = [0u8; HEADER_LEN];
        if !read_first_section(reader, &mut raw, "message header")? {
            return Ok(None);
        }
        let header = Header::decode(&raw);
        protocol.check_header(&header)?;

        let declared = u64::from(header.len);
        let mut running =
            HEADER_LEN as u64 + u64::from(header.param_num) * PARAM_HEADER_LEN as u64;
        if running > declared {
            return Err(FramingError::LengthMismatch {
                declared: header.len,
                actual: running,
            }
            .into());
        }

        // Bounded by `declared`, which check_header capped at max_len.
        let mut raw = vec![0u8; header.param_num as usize * PARAM_HEADER_LEN];
        read_section(reader, &mut raw, "parameter headers")?;

        let mut headers = Vec::with_capacity(header.param_num as usize);
        for (index, chunk) in raw.chunks_exact(PARAM_HEADER_LEN).enumerate() {
            let phdr = ParamHeader::decode(chunk);
            running += u64::from(phdr.len);
            if running > declared {
                return Err(FramingError::ParamOverrun {
                    index: index as u32,
                    len: header.len,
                }
                .into());
            }
            headers.push(phdr);
        }
        if running != declared {
            return Err(FramingError::LengthMismatch {
                declared: header.len,
                actual: running,
            }
            .into());
        }

        let mut params = Vec::with_capacity(headers.len());
        for phdr in headers {
            let mut data = vec![0u8; phdr.len as usize];
            read_section(reader, &mut data, "parameter payloads")?;
            params.push(Param { header: phdr, data });
        }

        let msg = Message { header, params };
        log::trace!("(i) {msg}");
        Ok(Some(msg))
    }

    /// Decode one message from the front of `bytes`.
    pub fn decode(bytes: &[u8], protocol: &Protocol) -> Result<Self> {
        let mut cursor = bytes;
        Self::recv(&mut cursor, protocol)
    }
}

/// Fill `buf`, returning false if the stream was already at its end.
fn read_first_section<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<bool> {
    let n = loop {
        match reader.read(buf) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };
    if n == 0 {
        return Ok(false);
    }
    read_section(reader, &mut buf[n..], what)?;
    Ok(true)
}

fn read_section<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8], what: &'static str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => FramingError::Truncated(what).into(),
        _ => ShellError::Io(e),
    })
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        write!(
            f,
            "{:08X}({}.{}): cmd {} status {} req {} params {} |{}b",
            h.magic, h.major, h.minor, h.cmd, h.status, h.req_id, h.param_num, h.len
        )?;
        for param in self.params() {
            write!(f, "\n  {} {} [", param.param_type(), param.len())?;
            match param.as_str() {
                Some(text) => f.write_str(text)?,
                None => f.write_str("...")?,
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_is_header_only() {
        let msg = Message::new(0xC0FFEE01, 1, 0);
        assert_eq!(msg.param_num(), 0);
        assert_eq!(msg.total_len(), HEADER_LEN as u32);
        assert_eq!(msg.cmd(), 0);
        assert_eq!(msg.status(), 0);
        assert_eq!(msg.req_id(), 0);
        assert_eq!(msg.to_bytes().len(), HEADER_LEN);
    }

    #[test]
    fn add_param_updates_count_and_length() {
        let mut msg = Message::new(1, 1, 0);
        assert_eq!(msg.add_param(3, b"abcde").unwrap(), 5);
        assert_eq!(msg.add_param(4, b"").unwrap(), 0);
        assert_eq!(msg.param_num(), 2);
        assert_eq!(
            msg.total_len() as usize,
            HEADER_LEN + 2 * PARAM_HEADER_LEN + 5
        );
    }

    #[test]
    fn header_layout_is_big_endian() {
        let mut msg = Protocol::new(0x01020304, 5, 6).message(0x0708, 0x090A0B0C, 0x0D0E0F10);
        msg.add_param(0x1112, b"z").unwrap();
        let bytes = msg.to_bytes();
        assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
        assert_eq!(bytes[4], 5);
        assert_eq!(bytes[5], 6);
        assert_eq!(&bytes[6..8], &[7, 8]);
        assert_eq!(&bytes[8..12], &[9, 10, 11, 12]);
        assert_eq!(&bytes[12..16], &[13, 14, 15, 16]);
        assert_eq!(&bytes[16..20], &[0, 0, 0, 1]);
        assert_eq!(&bytes[20..24], &[0, 0, 0, 33]);
        // Parameter header: type, reserved, length.
        assert_eq!(&bytes[24..32], &[0x11, 0x12, 0, 0, 0, 0, 0, 1]);
        assert_eq!(bytes[32], b'z');
    }

    #[test]
    fn overflowing_total_length_rejected() {
        let mut msg = Message::new(1, 1, 0);
        msg.header.len = u32::MAX - 4;
        let err = msg.add_param(1, b"").unwrap_err();
        assert!(matches!(err, ShellError::Overflow(_)));
        // Nothing was appended.
        assert_eq!(msg.param_num(), 0);
        assert_eq!(msg.params().count(), 0);
    }

    #[test]
    fn setters_do_not_touch_length() {
        let mut msg = Message::new(1, 1, 0);
        msg.add_param(1, b"xy").unwrap();
        let len = msg.total_len();
        msg.set_cmd(9);
        msg.set_status(2);
        msg.set_req_id(77);
        assert_eq!(msg.total_len(), len);
        assert_eq!((msg.cmd(), msg.status(), msg.req_id()), (9, 2, 77));
    }

    #[test]
    fn protocol_from_server_config() {
        let server = ServerConfig {
            magic: 0xAA,
            version_major: 3,
            version_minor: 1,
            max_message_len: 4096,
            ..Default::default()
        };
        let proto = Protocol::from(&server);
        assert_eq!(proto, Protocol::new(0xAA, 3, 1).with_max_len(4096));
    }

    #[test]
    fn display_prints_text_payloads() {
        let mut msg = Protocol::new(0xC0FFEE01, 1, 0).message(7, 0, 42);
        msg.add_str(1, "ping").unwrap();
        msg.add_param(2, &[0xFF, 0xFE]).unwrap();
        let dump = msg.to_string();
        assert!(dump.starts_with("C0FFEE01(1.0): cmd 7 status 0 req 42 params 2"));
        assert!(dump.contains("\n  1 4 [ping]"));
        assert!(dump.contains("\n  2 2 [...]"));
    }
}
