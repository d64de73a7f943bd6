mod command;
mod net;
mod node;
mod setup;
mod util;

pub use command::cfPerf;
pub use util::statistic::Statistic;

const MTU: usize = 1500; // ETHERNET - Maximum Transfer Unit
const MTU_ZYC2: usize = 1450; // ETHERNET - MTU in ZYC2 = 1500-20-8-8-14
const ZYC2_MSS: usize = (MTU_ZYC2 - 92) & !0x7; // ZYC2 Maximum Segment Size (1352)
const UDP_MDS: usize = (MTU_ZYC2 - 20 - 8) & !0x7; // Maximum Datagram Size, modulo 8 (1416)

// Default listen ports of the bring-up role:
//  --> 8800 : traffic received on this port is systematically dumped (Rx test)
//  --> 8801 : a request received on this port triggers the transmission
//             of 'size' bytes from the FPGA back to the host (Tx test)
//  --> 8803 : traffic received on this port is echoed back to the sender
const RECV_MODE_LSN_PORT: u16 = 8800; // 0x2260
const XMIT_MODE_LSN_PORT: u16 = 8801; // 0x2261
const ECHO_MODE_LSN_PORT: u16 = 8803; // 0x2263

const DEFAULT_MNGR_IPV4: &str = "10.12.0.132";
const DEFAULT_MNGR_PORT: u16 = 8080;
const DEFAULT_LOOP_COUNT: u64 = 10;
const DEFAULT_RECV_TIMEOUT: u64 = 5000; // milliseconds, bounds a single blocked wait
const IN_FLIGHT_CAP: usize = 4096; // bytes a sender may run ahead of the receiver
const MAX_XMIT_REQUEST_SIZE: usize = 0xFFFF; // the request/response size field is a u16
