use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::net::socket::{RecvOutcome, Socket};
use crate::net::XmitRequest;
use crate::util::statistic::{Parameter, Statistic, TimeoutPolicy};

use super::Node;

/// Request/response session: each iteration sends a fixed-width binary
/// request asking the FPGA to generate and send back `size` bytes, then
/// drains exactly that many bytes through the non-blocking retry policy.
pub struct ReceiverNode {
    socket: Socket,
    request: XmitRequest,
    parameter: Parameter,
    stop: Arc<AtomicBool>,
}

impl ReceiverNode {
    pub fn new(socket: Socket, request: XmitRequest, parameter: Parameter, stop: Arc<AtomicBool>) -> ReceiverNode {
        ReceiverNode {
            socket,
            request,
            parameter,
            stop,
        }
    }
}

impl Node for ReceiverNode {
    fn run(&mut self) -> Result<Statistic, &'static str> {
        let size = self.request.size as usize;
        let request = self.request.encode();
        let timeout_ms = self.parameter.recv_timeout_ms as i32;

        info!(
            "Requesting the FPGA to send {} segments of {} bytes each",
            self.parameter.count, size
        );

        let mut statistic = Statistic::new();
        let mut buffer = vec![0u8; crate::MTU.max(size)];
        let mut remaining = self.parameter.count;
        let mut loop_nr = 0;
        let start_time = Instant::now();

        while loop_nr < remaining {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            self.socket.send_all(&request, timeout_ms)?;
            statistic.expected_rx_bytes += size;

            let mut current_rx = 0;
            let deadline = Instant::now() + Duration::from_millis(self.parameter.recv_timeout_ms);
            let mut timed_out = false;

            while current_rx < size {
                match self.socket.try_recv(&mut buffer)? {
                    RecvOutcome::Data(amount) => {
                        current_rx += amount;
                        if self.parameter.verbose {
                            println!("Loop={} | RxBytes={}", loop_nr, statistic.rx_bytes + current_rx);
                        }
                    }
                    RecvOutcome::WouldBlock => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        if left.is_zero() {
                            timed_out = true;
                            break;
                        }
                        match self.socket.poll_readable(left.as_millis() as i32) {
                            Ok(()) => {}
                            Err("TIMEOUT") => {
                                timed_out = true;
                                break;
                            }
                            Err(x) => return Err(x),
                        }
                    }
                }
            }

            statistic.rx_bytes += current_rx;
            if timed_out && current_rx < size {
                statistic.lost_bytes += size - current_rx;
                match self.parameter.timeout_policy {
                    TimeoutPolicy::Loss => {
                        warn!(
                            "Loop={} | Drain timed out after {} of {} bytes, counting the rest as lost",
                            loop_nr, current_rx, size
                        );
                    }
                    TimeoutPolicy::Shrink => {
                        remaining = remaining.saturating_sub(1);
                        warn!(
                            "Loop={} | Drain timed out after {} of {} bytes, shrinking the budget to {}",
                            loop_nr, current_rx, size, remaining
                        );
                    }
                }
            }
            loop_nr += 1;
        }

        statistic.set_test_duration(start_time, Instant::now());
        debug!(
            "Receiver done after {} of {} expected bytes",
            statistic.rx_bytes, statistic.expected_rx_bytes
        );
        Ok(statistic)
    }
}
