//! Transport management: TCP/TLS streams, the STARTTLS upgrade and framed I/O.

mod framed;
mod stream;

pub use framed::{FramedStream, LogHandler};
pub use stream::{SmtpStream, Upgrade, connect};
