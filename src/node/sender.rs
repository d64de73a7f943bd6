use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::net::socket::Socket;
use crate::util::statistic::{Parameter, Statistic};

use super::Node;

/// How the payload is varied across the iterations of a simplex send run.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum DrivePolicy {
    /// Send the full payload, `count` times.
    FixedLoop,
    /// Per outer iteration, send prefixes of length 1..=len in order.
    Ramp,
    /// Fixed loop with a sleep after every send. TCP_NODELAY is set during
    /// setup so each segment is pushed out on its own.
    SlowPace(Duration),
}

/// The segment lengths driven by one outer iteration of the ramp policy.
pub fn ramp_lengths(payload_len: usize) -> impl Iterator<Item = usize> {
    1..=payload_len
}

/// Simplex transmit session toward the FPGA's sink port. Only sent bytes are
/// counted; the peer consumes the traffic independently.
pub struct SenderNode {
    socket: Socket,
    payload: Vec<u8>,
    policy: DrivePolicy,
    parameter: Parameter,
    stop: Arc<AtomicBool>,
}

impl SenderNode {
    pub fn new(
        socket: Socket,
        payload: Vec<u8>,
        policy: DrivePolicy,
        parameter: Parameter,
        stop: Arc<AtomicBool>,
    ) -> SenderNode {
        SenderNode {
            socket,
            payload,
            policy,
            parameter,
            stop,
        }
    }

    fn fixed_loop(&self, statistic: &mut Statistic, pause: Option<Duration>) -> Result<(), &'static str> {
        let timeout_ms = self.parameter.recv_timeout_ms as i32;

        for loop_nr in 0..self.parameter.count {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            statistic.tx_bytes += self.socket.send_all(&self.payload, timeout_ms)?;
            if self.parameter.verbose {
                println!("Loop={} | TxBytes={}", loop_nr, statistic.tx_bytes);
            }
            if let Some(pause) = pause {
                sleep(pause);
            }
        }
        Ok(())
    }

    fn ramp(&self, statistic: &mut Statistic) -> Result<(), &'static str> {
        let timeout_ms = self.parameter.recv_timeout_ms as i32;

        for loop_nr in 0..self.parameter.count {
            for length in ramp_lengths(self.payload.len()) {
                if self.stop.load(Ordering::Relaxed) {
                    return Ok(());
                }
                let sub_message = &self.payload[..length];
                statistic.tx_bytes += self.socket.send_all(sub_message, timeout_ms)?;
                if self.parameter.verbose {
                    println!(
                        "Loop={} | TxBytes={} | Msg={}",
                        loop_nr,
                        length,
                        String::from_utf8_lossy(sub_message)
                    );
                }
            }
        }
        Ok(())
    }
}

impl Node for SenderNode {
    fn run(&mut self) -> Result<Statistic, &'static str> {
        if self.parameter.verbose {
            println!(
                "The following message of {} bytes will be sent out {} times:\n  Message={}\n",
                self.payload.len(),
                self.parameter.count,
                String::from_utf8_lossy(&self.payload)
            );
        }
        info!("Driving {:?} with policy {:?}", self.parameter.protocol, self.policy);

        let mut statistic = Statistic::new();
        let start_time = Instant::now();

        match self.policy {
            DrivePolicy::FixedLoop => self.fixed_loop(&mut statistic, None)?,
            DrivePolicy::SlowPace(pause) => self.fixed_loop(&mut statistic, Some(pause))?,
            DrivePolicy::Ramp => self.ramp(&mut statistic)?,
        }

        statistic.set_test_duration(start_time, Instant::now());
        debug!("Sender done after {} bytes", statistic.tx_bytes);
        Ok(statistic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_covers_every_prefix_in_order() {
        let lengths: Vec<usize> = ramp_lengths(5).collect();
        assert_eq!(lengths, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_ramp_of_empty_payload_is_empty() {
        assert_eq!(ramp_lengths(0).count(), 0);
    }
}
