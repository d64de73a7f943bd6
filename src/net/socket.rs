use std::net::{Ipv4Addr, SocketAddrV4};

use log::{debug, error, info, trace};

use super::Protocol;

/// Outcome of a single non-blocking receive attempt. "No data yet" is a
/// normal result here, not an error: the caller loops without touching any
/// byte or error counter. Every other socket failure is returned as `Err`
/// and aborts the whole session.
#[derive(PartialEq, Debug)]
pub enum RecvOutcome {
    Data(usize),
    WouldBlock,
}

pub struct Socket {
    fd: i32,
    protocol: Protocol,
}

impl Socket {
    pub fn new(protocol: Protocol) -> Result<Socket, &'static str> {
        let sock_type = match protocol {
            Protocol::Tcp => libc::SOCK_STREAM,
            Protocol::Udp => libc::SOCK_DGRAM,
        };

        let fd = unsafe { libc::socket(libc::AF_INET, sock_type, 0) };
        if fd == -1 {
            error!("Errno when creating socket: {}", Self::errno());
            return Err("Failed to create socket");
        }

        debug!("Created {:?} socket with fd {}", protocol, fd);
        Ok(Socket { fd, protocol })
    }

    fn errno() -> i32 {
        unsafe { *libc::__errno_location() }
    }

    fn retryable(errno: i32) -> bool {
        errno == libc::EAGAIN || errno == libc::EWOULDBLOCK || errno == libc::EINTR
    }

    pub fn connect(&self, address: SocketAddrV4) -> Result<(), &'static str> {
        let sockaddr = Self::create_sockaddr(*address.ip(), address.port());

        let connect_result = unsafe {
            libc::connect(
                self.fd,
                &sockaddr as *const _ as _,
                std::mem::size_of_val(&sockaddr) as libc::socklen_t,
            )
        };

        if connect_result == -1 {
            error!("Errno when connecting to {}: {}", address, Self::errno());
            return Err("Failed to connect to remote host");
        }

        info!("Connected socket to remote host at {{{}, {}}}", address.ip(), address.port());
        Ok(())
    }

    /// Sends the whole buffer, looping over partial sends. A full socket
    /// buffer is waited out with a bounded poll; everything else is fatal.
    pub fn send_all(&self, buffer: &[u8], timeout_ms: i32) -> Result<usize, &'static str> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let mut sent: usize = 0;
        while sent < buffer.len() {
            let send_result = unsafe {
                libc::send(
                    self.fd,
                    buffer[sent..].as_ptr() as *const _,
                    buffer.len() - sent,
                    0,
                )
            };

            if send_result == -1 {
                let errno = Self::errno();
                if Self::retryable(errno) {
                    self.poll_writable(timeout_ms)?;
                    continue;
                }
                if errno == libc::ECONNREFUSED {
                    error!("Connection refused while trying to send data!");
                    return Err("ECONNREFUSED");
                }
                error!("Errno when trying to send data: {}", errno);
                return Err("Failed to send data");
            }

            sent += send_result as usize;
            trace!("Sent {} bytes, {} of {} on the wire", send_result, sent, buffer.len());
        }
        Ok(sent)
    }

    /// A single receive attempt on the non-blocking socket.
    pub fn try_recv(&self, buffer: &mut [u8]) -> Result<RecvOutcome, &'static str> {
        let recv_result = unsafe {
            libc::recv(self.fd, buffer.as_mut_ptr() as *mut _, buffer.len(), 0)
        };

        if recv_result == -1 {
            let errno = Self::errno();
            if Self::retryable(errno) {
                return Ok(RecvOutcome::WouldBlock);
            }
            error!("Errno when trying to receive data: {}", errno);
            return Err("Failed to receive data");
        }

        // A zero-length read on a stream socket means the peer closed the
        // connection mid-session.
        if recv_result == 0 && self.protocol == Protocol::Tcp && !buffer.is_empty() {
            return Err("Connection closed by peer");
        }

        trace!("Received {} bytes", recv_result);
        Ok(RecvOutcome::Data(recv_result as usize))
    }

    pub fn poll_readable(&self, timeout_ms: i32) -> Result<(), &'static str> {
        self.poll(libc::POLLIN, timeout_ms)
    }

    pub fn poll_writable(&self, timeout_ms: i32) -> Result<(), &'static str> {
        self.poll(libc::POLLOUT, timeout_ms)
    }

    fn poll(&self, events: libc::c_short, timeout_ms: i32) -> Result<(), &'static str> {
        let mut pollfd = libc::pollfd {
            fd: self.fd,
            events,
            revents: 0,
        };

        let poll_result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        match poll_result {
            -1 => {
                error!("Errno when polling socket: {}", Self::errno());
                Err("Error calling poll")
            }
            0 => Err("TIMEOUT"),
            _ => Ok(()),
        }
    }

    pub fn set_nonblocking(&self) -> Result<(), &'static str> {
        let flags = unsafe { libc::fcntl(self.fd, libc::F_GETFL) };
        if flags == -1 {
            return Err("Failed to get socket flags");
        }

        let fcntl_result = unsafe { libc::fcntl(self.fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if fcntl_result == -1 {
            return Err("Failed to set socket non-blocking");
        }

        debug!("Set socket fd {} non-blocking", self.fd);
        Ok(())
    }

    /// Disables Nagle batching so every send is pushed out immediately.
    /// Used by the slow-pace policy to enforce a segment boundary per send.
    pub fn set_no_delay(&self) -> Result<(), &'static str> {
        self.set_socket_option(libc::IPPROTO_TCP, libc::TCP_NODELAY, 1)
    }

    pub fn set_reuse_addr(&self) -> Result<(), &'static str> {
        self.set_socket_option(libc::SOL_SOCKET, libc::SO_REUSEADDR, 1)
    }

    fn set_socket_option(&self, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> Result<(), &'static str> {
        let setsockopt_result = unsafe {
            libc::setsockopt(
                self.fd,
                level,
                name,
                &value as *const _ as _,
                std::mem::size_of_val(&value) as libc::socklen_t,
            )
        };

        if setsockopt_result == -1 {
            error!("Errno when setting socket option {}: {}", name, Self::errno());
            return Err("Failed to set socket option");
        }
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddrV4, &'static str> {
        let mut sockaddr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut addr_len = std::mem::size_of_val(&sockaddr) as libc::socklen_t;

        let getsockname_result = unsafe {
            libc::getsockname(self.fd, &mut sockaddr as *mut _ as _, &mut addr_len as *mut _)
        };

        if getsockname_result == -1 {
            error!("Errno when getting local socket address: {}", Self::errno());
            return Err("Failed to get local socket address");
        }

        Ok(SocketAddrV4::new(
            Ipv4Addr::from(u32::from_be(sockaddr.sin_addr.s_addr)),
            u16::from_be(sockaddr.sin_port),
        ))
    }

    fn create_sockaddr(address: Ipv4Addr, port: u16) -> libc::sockaddr_in {
        libc::sockaddr_in {
            sin_family: libc::AF_INET as u16,
            sin_port: port.to_be(),
            sin_addr: libc::in_addr {
                s_addr: u32::from(address).to_be(),
            },
            sin_zero: [0; 8],
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        let close_result = unsafe { libc::close(self.fd) };
        if close_result == -1 {
            error!("Errno when closing socket fd {}: {}", self.fd, Self::errno());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;

    fn connected_udp_pair() -> (Socket, UdpSocket) {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let socket = Socket::new(Protocol::Udp).unwrap();
        let peer_port = peer.local_addr().unwrap().port();
        socket
            .connect(SocketAddrV4::new(Ipv4Addr::LOCALHOST, peer_port))
            .unwrap();
        socket.set_nonblocking().unwrap();
        (socket, peer)
    }

    #[test]
    fn test_try_recv_classifies_no_data_as_would_block() {
        let (socket, _peer) = connected_udp_pair();
        let mut buffer = [0u8; 64];
        // Nothing was sent, so every attempt must surface as WouldBlock and
        // never as an error, no matter how often it is repeated.
        for _ in 0..10 {
            assert_eq!(socket.try_recv(&mut buffer), Ok(RecvOutcome::WouldBlock));
        }
    }

    #[test]
    fn test_try_recv_returns_pending_datagram() {
        let (socket, peer) = connected_udp_pair();
        let local = socket.local_addr().unwrap();
        peer.send_to(b"hello", local).unwrap();
        socket.poll_readable(2000).unwrap();

        let mut buffer = [0u8; 64];
        assert_eq!(socket.try_recv(&mut buffer), Ok(RecvOutcome::Data(5)));
        assert_eq!(&buffer[..5], b"hello");
    }

    #[test]
    fn test_poll_readable_times_out() {
        let (socket, _peer) = connected_udp_pair();
        assert_eq!(socket.poll_readable(10), Err("TIMEOUT"));
    }

    #[test]
    fn test_send_all_transfers_whole_buffer() {
        let (socket, peer) = connected_udp_pair();
        peer.set_read_timeout(Some(std::time::Duration::from_secs(2))).unwrap();

        let payload = crate::util::payload::static_payload(128);
        assert_eq!(socket.send_all(&payload, 2000), Ok(128));

        let mut buffer = [0u8; 256];
        let (received, _) = peer.recv_from(&mut buffer).unwrap();
        assert_eq!(&buffer[..received], payload.as_slice());
    }
}
