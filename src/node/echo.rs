use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::net::socket::{RecvOutcome, Socket};
use crate::net::Protocol;
use crate::util::statistic::{Parameter, Statistic};

use super::{InFlightWindow, Node};

// Consecutive bounded waits without any data before the receive side
// reports the missing bytes as lost and stops.
const MAX_IDLE_WAITS: u32 = 3;

/// Compares a received byte stream against the expected message repeated
/// over and over. Counts one error per completed message that contained at
/// least one mismatching byte; mismatches are soft failures reported at the
/// end of the run, they never abort it.
pub struct StreamVerifier {
    expected: Arc<Vec<u8>>,
    offset: usize,
    message_dirty: bool,
}

impl StreamVerifier {
    pub fn new(expected: Arc<Vec<u8>>) -> StreamVerifier {
        StreamVerifier {
            expected,
            offset: 0,
            message_dirty: false,
        }
    }

    /// Feeds the next chunk of received bytes; returns the number of
    /// completed messages that failed verification.
    pub fn feed(&mut self, data: &[u8]) -> u64 {
        if self.expected.is_empty() {
            return 0;
        }

        let mut error_count = 0;
        for &byte in data {
            if byte != self.expected[self.offset] && !self.message_dirty {
                warn!(
                    " KO | Received byte 0x{:02x} at offset {}, expecting 0x{:02x}",
                    byte, self.offset, self.expected[self.offset]
                );
                self.message_dirty = true;
            }
            self.offset += 1;
            if self.offset == self.expected.len() {
                self.offset = 0;
                if self.message_dirty {
                    warn!(
                        "    | Expecting message={}",
                        String::from_utf8_lossy(&self.expected)
                    );
                    error_count += 1;
                }
                self.message_dirty = false;
            }
        }
        error_count
    }
}

/// Duplex or cooperative echo session: the payload is sent `count` times to
/// the FPGA's echo port and the looped-back bytes are received and verified.
pub struct EchoNode {
    socket: Arc<Socket>,
    payload: Arc<Vec<u8>>,
    parameter: Parameter,
    stop: Arc<AtomicBool>,
}

impl EchoNode {
    pub fn new(socket: Socket, payload: Vec<u8>, parameter: Parameter, stop: Arc<AtomicBool>) -> EchoNode {
        EchoNode {
            socket: Arc::new(socket),
            payload: Arc::new(payload),
            parameter,
            stop,
        }
    }

    /// One dedicated Tx thread and one dedicated Rx thread over the shared
    /// connection. The only shared mutable state is the in-flight window,
    /// which is only engaged for UDP since TCP already has flow control.
    fn run_duplex(&self) -> Result<Statistic, &'static str> {
        let window = if self.parameter.protocol == Protocol::Udp {
            // A cap below the message size would deadlock the sender.
            let cap = self.parameter.in_flight_cap.max(self.payload.len());
            Some(Arc::new(InFlightWindow::new(cap)))
        } else {
            None
        };

        let start_time = Instant::now();

        let tx_handle = {
            let socket = Arc::clone(&self.socket);
            let payload = Arc::clone(&self.payload);
            let window = window.clone();
            let stop = Arc::clone(&self.stop);
            let parameter = self.parameter;
            thread::spawn(move || {
                let result = tx_loop(&socket, &payload, window.as_deref(), &stop, &parameter);
                if result.is_err() {
                    stop.store(true, Ordering::Relaxed);
                }
                result
            })
        };

        let rx_handle = {
            let socket = Arc::clone(&self.socket);
            let payload = Arc::clone(&self.payload);
            let window = window.clone();
            let stop = Arc::clone(&self.stop);
            let parameter = self.parameter;
            thread::spawn(move || {
                let result = rx_loop(&socket, &payload, window.as_deref(), &stop, &parameter);
                if result.is_err() {
                    stop.store(true, Ordering::Relaxed);
                }
                result
            })
        };

        let tx_statistic = tx_handle.join().map_err(|_| "Tx thread panicked")??;
        let rx_statistic = rx_handle.join().map_err(|_| "Rx thread panicked")??;

        let mut statistic = tx_statistic + rx_statistic;
        statistic.set_test_duration(start_time, Instant::now());
        Ok(statistic)
    }

    /// Single loop interleaving a send and a bounded drain each iteration.
    /// The non-blocking retry policy keeps the loop from deadlocking while
    /// the peer has not produced the echo yet.
    fn run_cooperative(&self) -> Result<Statistic, &'static str> {
        let payload = &self.payload;
        let mut statistic = Statistic::new();
        let mut verifier = StreamVerifier::new(Arc::clone(&self.payload));
        let mut buffer = vec![0u8; payload.len().max(1)];
        let timeout_ms = self.parameter.recv_timeout_ms as i32;

        statistic.expected_rx_bytes = self.parameter.count as usize * payload.len();
        let start_time = Instant::now();

        for loop_nr in 0..self.parameter.count {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            statistic.tx_bytes += self.socket.send_all(payload, timeout_ms)?;

            let mut current_rx = 0;
            let deadline = Instant::now() + Duration::from_millis(self.parameter.recv_timeout_ms);
            while current_rx < payload.len() {
                match self.socket.try_recv(&mut buffer[current_rx..])? {
                    RecvOutcome::Data(amount) => {
                        current_rx += amount;
                    }
                    RecvOutcome::WouldBlock => {
                        let left = deadline.saturating_duration_since(Instant::now());
                        if left.is_zero() {
                            break;
                        }
                        match self.socket.poll_readable(left.as_millis() as i32) {
                            Ok(()) => {}
                            Err("TIMEOUT") => break,
                            Err(x) => return Err(x),
                        }
                    }
                }
            }

            statistic.rx_bytes += current_rx;
            statistic.error_count += verifier.feed(&buffer[..current_rx]);
            if current_rx < payload.len() {
                warn!(
                    "Loop={} | Echo came back short: {} of {} bytes",
                    loop_nr,
                    current_rx,
                    payload.len()
                );
                statistic.lost_bytes += payload.len() - current_rx;
            }
            if self.parameter.verbose {
                println!("Loop={} | RxBytes={}", loop_nr, statistic.rx_bytes);
            }
        }

        statistic.set_test_duration(start_time, Instant::now());
        Ok(statistic)
    }
}

impl Node for EchoNode {
    fn run(&mut self) -> Result<Statistic, &'static str> {
        if self.parameter.verbose {
            println!(
                "The following message of {} bytes will be sent out {} times:\n  Message={}\n",
                self.payload.len(),
                self.parameter.count,
                String::from_utf8_lossy(&self.payload)
            );
        }

        if self.parameter.multi_threading {
            info!("This run is executed in multi-threading mode.");
            self.run_duplex()
        } else {
            info!("This run is executed in single-threading mode.");
            self.run_cooperative()
        }
    }
}

fn tx_loop(
    socket: &Socket,
    payload: &[u8],
    window: Option<&InFlightWindow>,
    stop: &AtomicBool,
    parameter: &Parameter,
) -> Result<Statistic, &'static str> {
    let mut statistic = Statistic::new();
    let timeout_ms = parameter.recv_timeout_ms as i32;
    let start_time = Instant::now();

    for loop_nr in 0..parameter.count {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        if let Some(window) = window {
            // UDP provides no flow control: pushing bytes into the FPGA
            // faster than the echo drains them drops datagrams.
            while !window.try_reserve(payload.len()) {
                if stop.load(Ordering::Relaxed) {
                    statistic.set_test_duration(start_time, Instant::now());
                    return Ok(statistic);
                }
                thread::yield_now();
            }
        }

        statistic.tx_bytes += socket.send_all(payload, timeout_ms)?;
        if parameter.verbose {
            println!("Loop={} | TxBytes={}", loop_nr, statistic.tx_bytes);
        }
    }

    statistic.set_test_duration(start_time, Instant::now());
    debug!("Tx thread done after {} bytes", statistic.tx_bytes);
    Ok(statistic)
}

fn rx_loop(
    socket: &Socket,
    payload: &[u8],
    window: Option<&InFlightWindow>,
    stop: &AtomicBool,
    parameter: &Parameter,
) -> Result<Statistic, &'static str> {
    let mut statistic = Statistic::new();
    let expected_total = parameter.count as usize * payload.len();
    statistic.expected_rx_bytes = expected_total;

    let mut verifier = StreamVerifier::new(Arc::new(payload.to_vec()));
    let mut buffer = vec![0u8; payload.len().max(1)];
    let timeout_ms = parameter.recv_timeout_ms as i32;
    let mut idle_waits = 0;
    let start_time = Instant::now();

    while statistic.rx_bytes < expected_total {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        match socket.try_recv(&mut buffer)? {
            RecvOutcome::Data(amount) => {
                idle_waits = 0;
                if let Some(window) = window {
                    window.acknowledge(amount);
                }
                statistic.rx_bytes += amount;
                statistic.error_count += verifier.feed(&buffer[..amount]);
                if parameter.verbose {
                    println!(
                        "Loop={} | RxBytes={}",
                        statistic.rx_bytes / payload.len().max(1),
                        statistic.rx_bytes
                    );
                }
            }
            RecvOutcome::WouldBlock => match socket.poll_readable(timeout_ms) {
                Ok(()) => {}
                Err("TIMEOUT") => {
                    idle_waits += 1;
                    if idle_waits >= MAX_IDLE_WAITS {
                        warn!(
                            "No echo data for {} consecutive waits, reporting {} bytes as lost",
                            idle_waits,
                            expected_total - statistic.rx_bytes
                        );
                        statistic.lost_bytes = expected_total - statistic.rx_bytes;
                        // The Tx thread may be spinning for window credit
                        // that a lossy peer will never return; release it
                        // so the session can end and report the loss.
                        stop.store(true, Ordering::Relaxed);
                        break;
                    }
                }
                Err(x) => return Err(x),
            },
        }
    }

    statistic.set_test_duration(start_time, Instant::now());
    debug!(
        "Rx thread done after {} bytes with {} error(s)",
        statistic.rx_bytes, statistic.error_count
    );
    Ok(statistic)
}
