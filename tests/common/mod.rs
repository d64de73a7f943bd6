//! Loopback stand-ins for the FPGA bring-up role: an echo port, a sink
//! port and a transmit-request responder, each bound to an ephemeral port.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const IDLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Echoes everything received on one TCP connection until the peer hangs
/// up; resolves to the number of echoed bytes.
pub fn spawn_tcp_echo() -> (u16, JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buffer = [0u8; 2048];
        let mut echoed = 0;
        loop {
            match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(amount) => {
                    stream.write_all(&buffer[..amount]).unwrap();
                    echoed += amount;
                }
            }
        }
        echoed
    });
    (port, handle)
}

/// Discards everything received on one TCP connection; resolves to the
/// number of dumped bytes once the peer hangs up.
pub fn spawn_tcp_sink() -> (u16, JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buffer = [0u8; 2048];
        let mut dumped = 0;
        loop {
            match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(amount) => dumped += amount,
            }
        }
        dumped
    });
    (port, handle)
}

/// Echoes datagrams back to their sender until `expected_bytes` went
/// through or the socket idles out; resolves to the echoed byte count.
pub fn spawn_udp_echo(expected_bytes: usize) -> (u16, JoinHandle<usize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();
    socket.set_read_timeout(Some(IDLE_TIMEOUT)).unwrap();
    let handle = thread::spawn(move || {
        let mut buffer = [0u8; 2048];
        let mut echoed = 0;
        while echoed < expected_bytes {
            match socket.recv_from(&mut buffer) {
                Ok((amount, peer)) => {
                    socket.send_to(&buffer[..amount], peer).unwrap();
                    echoed += amount;
                }
                Err(_) => break,
            }
        }
        echoed
    });
    (port, handle)
}

/// Collects the lengths of `expected_datagrams` incoming datagrams, in
/// arrival order.
pub fn spawn_udp_sink(expected_datagrams: usize) -> (u16, JoinHandle<Vec<usize>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();
    socket.set_read_timeout(Some(IDLE_TIMEOUT)).unwrap();
    let handle = thread::spawn(move || {
        let mut buffer = [0u8; 2048];
        let mut lengths = Vec::new();
        while lengths.len() < expected_datagrams {
            match socket.recv_from(&mut buffer) {
                Ok((amount, _)) => lengths.push(amount),
                Err(_) => break,
            }
        }
        lengths
    });
    (port, handle)
}

/// Serves `count` transmit requests over one TCP connection. Each request
/// is 8 bytes (dest address, dest port, size, all big-endian); the
/// responder streams back `reply_fraction` of the requested size.
pub fn spawn_tcp_responder(count: usize, reply_fraction: f64) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = [0u8; 8];
        for _ in 0..count {
            if stream.read_exact(&mut request).is_err() {
                return;
            }
            let size = u16::from_be_bytes([request[6], request[7]]) as usize;
            let reply = vec![b'x'; (size as f64 * reply_fraction) as usize];
            if stream.write_all(&reply).is_err() {
                return;
            }
        }
        // Linger until the client hangs up, so a short reply surfaces as
        // a drain timeout on the client and not as a closed connection.
        loop {
            match stream.read(&mut request) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    });
    (port, handle)
}

/// Serves `count` transmit requests over UDP. The datagram variant of the
/// request is 4 bytes (dest port, size, big-endian) and the requested
/// bytes come back as a single datagram to the requester.
pub fn spawn_udp_responder(count: usize) -> (u16, JoinHandle<()>) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();
    socket.set_read_timeout(Some(IDLE_TIMEOUT)).unwrap();
    let handle = thread::spawn(move || {
        let mut request = [0u8; 4];
        for _ in 0..count {
            match socket.recv_from(&mut request) {
                Ok((4, peer)) => {
                    let size = u16::from_be_bytes([request[2], request[3]]) as usize;
                    socket.send_to(&vec![b'x'; size], peer).unwrap();
                }
                _ => return,
            }
        }
    });
    (port, handle)
}
