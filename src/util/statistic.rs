use std::ops::Add;
use std::time::Duration;

use log::{debug, error};
use serde::Serialize;

use crate::net::Protocol;
use crate::util::TestCase;

#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub enum OutputFormat {
    Text,
    Json,
}

/// What to do when a request/response drain times out before all expected
/// bytes arrived: keep iterating and report the shortfall as loss, or shrink
/// the remaining iteration budget in place.
#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub enum TimeoutPolicy {
    Loss,
    Shrink,
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub struct Parameter {
    pub testcase: TestCase,
    pub protocol: Protocol,
    pub count: u64,
    pub size: usize,
    pub seed: u64,
    pub multi_threading: bool,
    pub ramp: bool,
    pub pause_ms: u64,
    pub timeout_policy: TimeoutPolicy,
    pub recv_timeout_ms: u64,
    pub in_flight_cap: usize,
    pub output_format: OutputFormat,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Statistic {
    test_duration: Duration,
    pub tx_bytes: usize,
    pub rx_bytes: usize,
    pub expected_rx_bytes: usize,
    pub lost_bytes: usize,
    pub error_count: u64,
}

impl Statistic {
    pub fn new() -> Statistic {
        Statistic {
            test_duration: Duration::new(0, 0),
            tx_bytes: 0,
            rx_bytes: 0,
            expected_rx_bytes: 0,
            lost_bytes: 0,
            error_count: 0,
        }
    }

    pub fn set_test_duration(&mut self, start_time: std::time::Instant, end_time: std::time::Instant) {
        self.test_duration = end_time - start_time;
    }

    pub fn test_duration(&self) -> Duration {
        self.test_duration
    }

    pub fn loss_percentage(&self) -> f64 {
        if self.expected_rx_bytes == 0 {
            0.0
        } else {
            (self.lost_bytes as f64 / self.expected_rx_bytes as f64) * 100.0
        }
    }

    /// Renders the final report, one banner per completed session.
    pub fn print(&self, output_format: OutputFormat, label: &str) {
        debug!("Final statistic: {:?}", self);
        if output_format == OutputFormat::Json {
            match serde_json::to_string_pretty(self) {
                Ok(json) => println!("{}", json),
                Err(_) => error!("Error serializing statistic to json"),
            }
            return;
        }

        let total_bytes = self.tx_bytes + self.rx_bytes;
        println!("[INFO] Transferred a total of {}.", format_volume(total_bytes));
        if self.error_count > 0 {
            println!("[INFO] Detected {} payload error(s).", self.error_count);
        }
        if self.lost_bytes > 0 {
            println!(
                "[INFO] Lost {} of {} expected bytes ({:.1}%).",
                self.lost_bytes,
                self.expected_rx_bytes,
                self.loss_percentage()
            );
        }

        let msg = format!(
            "#### {} DONE with throughput = {} ####",
            label,
            format_throughput(total_bytes, self.test_duration)
        );
        let hash_line = "#".repeat(msg.len());
        println!("{}", hash_line);
        println!("{}", msg);
        println!("{}", hash_line);
        println!();
    }
}

impl Default for Statistic {
    fn default() -> Self {
        Statistic::new()
    }
}

impl Add for Statistic {
    type Output = Statistic;

    fn add(self, other: Statistic) -> Statistic {
        Statistic {
            test_duration: self.test_duration.max(other.test_duration),
            tx_bytes: self.tx_bytes + other.tx_bytes,
            rx_bytes: self.rx_bytes + other.rx_bytes,
            expected_rx_bytes: self.expected_rx_bytes + other.expected_rx_bytes,
            lost_bytes: self.lost_bytes + other.lost_bytes,
            error_count: self.error_count + other.error_count,
        }
    }
}

/// Renders a byte count in human readable form: plain bytes below 1 MB,
/// megabytes below 1 GB, gigabytes above.
pub fn format_volume(byte_count: usize) -> String {
    if byte_count < 1_000_000 {
        format!("{} bytes", byte_count)
    } else if byte_count < 1_000_000_000 {
        format!("{:.1} MB", byte_count as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", byte_count as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Renders a bit-rate: Mb/s below 1000, Gb/s at and above.
pub fn format_throughput(byte_count: usize, elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64();
    let mbps = if seconds == 0.0 {
        0.0
    } else {
        (byte_count as f64 * 8.0) / (seconds * 1024.0 * 1024.0)
    };
    if mbps < 1000.0 {
        format!("{:.1} Mb/s", mbps)
    } else {
        format!("{:.1} Gb/s", mbps / 1000.0)
    }
}
