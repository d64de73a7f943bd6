use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::Serialize;

pub mod socket;

#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

pub fn parse_protocol(protocol: &str) -> Option<Protocol> {
    match protocol {
        "tcp" => Some(Protocol::Tcp),
        "udp" => Some(Protocol::Udp),
        _ => None,
    }
}

pub fn parse_ipv4(address: &str) -> Result<Ipv4Addr, &'static str> {
    match Ipv4Addr::from_str(address) {
        Ok(x) => Ok(x),
        Err(_) => Err("Invalid IPv4 address!"),
    }
}

/// Request sent ahead of each expected inbound transfer in the
/// request/response test: it tells the FPGA where to send the generated
/// segment and how large it should be.
///
/// Wire format is big-endian and fixed width. With a destination address the
/// message is 8 bytes `(addr: u32, port: u16, size: u16)`, without it 4 bytes
/// `(port: u16, size: u16)`.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct XmitRequest {
    pub dest_addr: Option<Ipv4Addr>,
    pub dest_port: u16,
    pub size: u16,
}

impl XmitRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(8);
        if let Some(addr) = self.dest_addr {
            message.extend_from_slice(&u32::from(addr).to_be_bytes());
        }
        message.extend_from_slice(&self.dest_port.to_be_bytes());
        message.extend_from_slice(&self.size.to_be_bytes());
        message
    }

    pub fn decode(buffer: &[u8]) -> Result<XmitRequest, &'static str> {
        match buffer.len() {
            4 => Ok(XmitRequest {
                dest_addr: None,
                dest_port: u16::from_be_bytes([buffer[0], buffer[1]]),
                size: u16::from_be_bytes([buffer[2], buffer[3]]),
            }),
            8 => Ok(XmitRequest {
                dest_addr: Some(Ipv4Addr::from(u32::from_be_bytes([
                    buffer[0], buffer[1], buffer[2], buffer[3],
                ]))),
                dest_port: u16::from_be_bytes([buffer[4], buffer[5]]),
                size: u16::from_be_bytes([buffer[6], buffer[7]]),
            }),
            _ => Err("Invalid transmit request length"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xmit_request_short_form() {
        let request = XmitRequest {
            dest_addr: None,
            dest_port: 8801,
            size: 0x1234,
        };
        let wire = request.encode();
        assert_eq!(wire, [0x22, 0x61, 0x12, 0x34]);
        assert_eq!(XmitRequest::decode(&wire), Ok(request));
    }

    #[test]
    fn test_xmit_request_long_form() {
        let request = XmitRequest {
            dest_addr: Some(Ipv4Addr::new(10, 12, 200, 163)),
            dest_port: 2718,
            size: 512,
        };
        let wire = request.encode();
        assert_eq!(wire, [10, 12, 200, 163, 0x0A, 0x9E, 0x02, 0x00]);
        assert_eq!(XmitRequest::decode(&wire), Ok(request));
    }

    #[test]
    fn test_xmit_request_rejects_odd_lengths() {
        assert!(XmitRequest::decode(&[0u8; 5]).is_err());
        assert!(XmitRequest::decode(&[]).is_err());
    }

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4("10.12.200.163"), Ok(Ipv4Addr::new(10, 12, 200, 163)));
        assert!(parse_ipv4("10.12.200").is_err());
        assert!(parse_ipv4("").is_err());
    }
}
