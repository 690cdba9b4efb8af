//! kshell wire protocol.
//!
//! A message is a fixed 24-byte header, then one 8-byte header per
//! parameter, then every parameter payload in the same order. All header
//! integers are big-endian; payloads are opaque bytes.
//!
//! ```text
//! [ message header ][ phdr 0 ] .. [ phdr N-1 ][ data 0 ] .. [ data N-1 ]
//! ```

mod channel;
mod message;
mod params;

pub use channel::{Channel, Timeouts};
pub use message::{HEADER_LEN, Header, Message, PARAM_HEADER_LEN, ParamHeader, Protocol};
pub use params::{ParamRef, Params};
