//! Blocking transport of the protocol: NUL-delimited command lines in,
//! length-prefixed XML packets out, over one TCP connection to the client.

use crate::dbg_trace;
use crate::error::Error;
use bytes::BytesMut;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Message transport the session talks through. The engine is
/// single-threaded and fully blocking: reading the next command parks the
/// whole process, which is exactly what a suspended debuggee wants.
pub trait Transport {
    /// Read one NUL-terminated command line. `Ok(None)` means the client
    /// closed the connection.
    fn read_message(&mut self) -> std::io::Result<Option<String>>;

    /// Push one fully rendered protocol packet.
    fn send(&mut self, packet: &[u8]) -> std::io::Result<()>;
}

pub struct TcpTransport {
    stream: TcpStream,
    buffer: BytesMut,
}

impl TcpTransport {
    /// Connect to a waiting client. The timeout bounds the whole connect
    /// sequence; on expiry the attempt is abandoned and reported as its own
    /// error cause, distinct from refusal and permission problems.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, Error> {
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::Connect)?
            .collect();

        let mut last_err = Error::Connect;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(Self {
                        stream,
                        buffer: BytesMut::with_capacity(4096),
                    });
                }
                Err(e) => {
                    last_err = match e.kind() {
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                            Error::ConnectTimeout(timeout.as_millis() as u64)
                        }
                        std::io::ErrorKind::PermissionDenied => Error::ConnectPermission,
                        _ => Error::Connect,
                    };
                }
            }
        }
        Err(last_err)
    }

    fn take_line(&mut self) -> Option<String> {
        let nul = self.buffer.iter().position(|&b| b == 0)?;
        let line = self.buffer.split_to(nul + 1);
        Some(String::from_utf8_lossy(&line[..nul]).into_owned())
    }
}

impl Transport for TcpTransport {
    fn read_message(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                dbg_trace!("<- {line}");
                return Ok(Some(line));
            }

            let mut chunk = [0u8; 4096];
            let read_n = self.stream.read(&mut chunk)?;
            if read_n == 0 {
                // Leftover bytes without a terminator are of no use to
                // anyone once the peer is gone.
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read_n]);
        }
    }

    fn send(&mut self, packet: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(packet)?;
        self.stream.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_nul_delimited_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            // Two commands in one write, then a partial one completed later.
            peer.write_all(b"status -i 1\0run -i ").unwrap();
            peer.write_all(b"2\0").unwrap();
        });

        let mut transport =
            TcpTransport::connect("127.0.0.1", addr.port(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.read_message().unwrap().as_deref(),
            Some("status -i 1")
        );
        assert_eq!(transport.read_message().unwrap().as_deref(), Some("run -i 2"));
        assert_eq!(transport.read_message().unwrap(), None);

        server.join().unwrap();
    }

    #[test]
    fn test_connect_refused_is_generic_failure() {
        // Bind-then-drop guarantees nobody is listening on the port.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = TcpTransport::connect("127.0.0.1", port, Duration::from_millis(200))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Connect | Error::ConnectTimeout(_)
        ));
    }
}
