use std::io;
use std::net::UdpSocket;

use crate::sys::Interest;
use crate::sys::Selector;
use crate::token::Token;

/// Self-wake primitive for the `WSAPoll`-based backend.
///
/// `WSAPoll` only watches sockets, so unlike the Unix backends (a real pipe
/// or `eventfd`) the Windows waker is a connected loopback UDP socket pair:
/// `wake()` sends a single byte datagram to itself.
#[derive(Debug)]
pub struct Waker {
    writer: UdpSocket,
    #[allow(dead_code)]
    reader: UdpSocket,
}

impl Waker {
    pub fn new(selector: &Selector, token: Token) -> io::Result<Waker> {
        let reader = UdpSocket::bind("127.0.0.1:0")?;
        reader.set_nonblocking(true)?;
        let writer = UdpSocket::bind("127.0.0.1:0")?;
        writer.connect(reader.local_addr()?)?;
        reader.connect(writer.local_addr()?)?;

        use std::os::windows::io::AsRawSocket;
        selector.register(reader.as_raw_socket() as _, token, Interest::readable())?;

        Ok(Waker { writer, reader })
    }

    pub fn wake(&self) -> io::Result<()> {
        match self.writer.send(&[1u8]) {
            Ok(_) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn ack(&self) {
        let mut buf = [0u8; 64];
        loop {
            match self.reader.recv(&mut buf) {
                Ok(0) => continue,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }
}
