use std::net::SocketAddrV4;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::net::socket::Socket;
use crate::net::{self, Protocol, XmitRequest};
use crate::node::echo::EchoNode;
use crate::node::receiver::ReceiverNode;
use crate::node::sender::{DrivePolicy, SenderNode};
use crate::node::Node;
use crate::setup;
use crate::util::payload;
use crate::util::statistic::{OutputFormat, Parameter, Statistic, TimeoutPolicy};
use crate::util::{self, TestCase};

#[derive(Parser, Debug)]
#[clap(version, about = "A tool to exercise the TCP/UDP network interface of a cloudFPGA module")]
#[allow(non_camel_case_types)]
pub struct cfPerf {
    /// Test case to run: echo, send or recv
    #[arg(default_value_t = String::from("echo"))]
    testcase: String,

    /// Transport protocol to drive: tcp or udp
    #[arg(long, default_value_t = String::from("tcp"))]
    protocol: String,

    /// The destination IPv4 address of the FPGA (a.k.a image_ip / e.g. 10.12.200.163)
    #[arg(short = 'a', long, default_value_t = String::new())]
    fpga_ipv4: String,

    /// The destination port of the FPGA (default depends on the test case)
    #[arg(short = 'p', long)]
    fpga_port: Option<u16>,

    /// The number of test runs
    #[arg(short = 'c', long, default_value_t = crate::DEFAULT_LOOP_COUNT)]
    loop_count: u64,

    /// The size of the message to send or receive (-1 picks a random size within the protocol maximum)
    #[arg(short = 's', long, default_value_t = -1, allow_hyphen_values = true)]
    size: i64,

    /// The number used to seed the pseudorandom generator (-1 picks a random seed)
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    seed: i64,

    /// Use a seeded pseudo-random payload instead of the static pattern
    #[arg(long, default_value_t = false)]
    random_payload: bool,

    /// Run the echo test with dedicated Tx and Rx threads
    #[arg(short = 'm', long, default_value_t = false)]
    multi_threading: bool,

    /// Ramp the segment size from 1 up to the payload length on every run (send test)
    #[arg(long, default_value_t = false)]
    ramp: bool,

    /// Sleep this many milliseconds after every send (send test)
    #[arg(long, default_value_t = 0)]
    pause_ms: u64,

    /// What to do when a request/response drain times out: loss or shrink
    #[arg(long, default_value_t = String::from("loss"))]
    on_timeout: String,

    /// Receive timeout in milliseconds bounding a single blocked wait
    #[arg(long, default_value_t = crate::DEFAULT_RECV_TIMEOUT)]
    recv_timeout_ms: u64,

    /// The IPv4 address of the cloudFPGA Resource Manager
    #[arg(long, default_value_t = String::from(crate::DEFAULT_MNGR_IPV4))]
    mngr_ipv4: String,

    /// The TCP port of the cloudFPGA Resource Manager
    #[arg(long, default_value_t = crate::DEFAULT_MNGR_PORT)]
    mngr_port: u16,

    /// The instance ID assigned by the cloudFPGA Resource Manager
    #[arg(long, default_value_t = 0)]
    inst_id: u32,

    /// A user name as used to log in ZYC2 (e.g. 'fab')
    #[arg(long, default_value_t = String::new())]
    user_name: String,

    /// The ZYC2 password attached to the user name
    #[arg(long, default_value_t = String::new())]
    user_passwd: String,

    /// Skip the FPGA restart, ping and port-reuse checks (loopback runs)
    #[arg(long, default_value_t = false)]
    skip_setup: bool,

    /// Enable json output of the final statistic
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable per-loop trace output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[arg(long, hide = true)]
    markdown_help: bool,
}

impl cfPerf {
    pub fn new() -> Self {
        let _ = env_logger::try_init();
        cfPerf::parse()
    }

    /// Builds the CLI from an explicit argument vector; used by the
    /// integration tests so the test harness arguments stay out of the way.
    pub fn from_args(args: Vec<&str>) -> Self {
        let _ = env_logger::try_init();
        let mut args = args;
        args.insert(0, "cfperf");
        cfPerf::parse_from(args)
    }

    pub fn exec(self) -> Option<Statistic> {
        if self.markdown_help {
            clap_markdown::print_help_markdown::<cfPerf>();
            return Some(Statistic::new());
        }

        info!("Starting cfPerf...");

        let (parameter, fpga_address) = self.parse_args()?;
        debug!("Running with Parameter: {:?}", parameter);

        if !self.skip_setup && !self.bring_up(fpga_address, parameter.protocol) {
            return None;
        }

        let socket = match self.open_connection(fpga_address, &parameter) {
            Ok(x) => x,
            Err(x) => {
                error!("Error connecting to the FPGA: {}", x);
                return None;
            }
        };

        let mut rng = StdRng::seed_from_u64(parameter.seed);
        let message = if self.random_payload {
            payload::random_payload(parameter.size, &mut rng)
        } else {
            payload::static_payload(parameter.size)
        };

        let stop = Arc::new(AtomicBool::new(false));
        let mut node: Box<dyn Node> = match parameter.testcase {
            TestCase::Echo => Box::new(EchoNode::new(socket, message, parameter, stop)),
            TestCase::Send => {
                let policy = if parameter.ramp {
                    DrivePolicy::Ramp
                } else if parameter.pause_ms > 0 {
                    DrivePolicy::SlowPace(Duration::from_millis(parameter.pause_ms))
                } else {
                    DrivePolicy::FixedLoop
                };
                Box::new(SenderNode::new(socket, message, policy, parameter, stop))
            }
            TestCase::Recv => {
                let request = match Self::build_xmit_request(&socket, &parameter) {
                    Ok(x) => x,
                    Err(x) => {
                        error!("Error building the transmit request: {}", x);
                        return None;
                    }
                };
                Box::new(ReceiverNode::new(socket, request, parameter, stop))
            }
        };

        match node.run() {
            Ok(statistic) => {
                info!("Finished measurement!");
                statistic.print(parameter.output_format, &Self::session_label(&parameter));
                Some(statistic)
            }
            Err(x) => {
                error!("Error running the test: {}", x);
                None
            }
        }
    }

    fn parse_args(&self) -> Option<(Parameter, SocketAddrV4)> {
        let testcase = match util::parse_testcase(&self.testcase) {
            Some(x) => x,
            None => {
                error!("Invalid test case! Should be 'echo', 'send' or 'recv'");
                return None;
            }
        };

        let protocol = match net::parse_protocol(&self.protocol) {
            Some(x) => x,
            None => {
                error!("Invalid protocol! Should be 'tcp' or 'udp'");
                return None;
            }
        };

        let ipv4 = match net::parse_ipv4(&self.fpga_ipv4) {
            Ok(x) => x,
            Err(_) => {
                error!("Invalid or missing FPGA IPv4 address! Pass it with --fpga-ipv4");
                return None;
            }
        };

        let port = self.fpga_port.unwrap_or(match testcase {
            TestCase::Echo => crate::ECHO_MODE_LSN_PORT,
            TestCase::Send => crate::RECV_MODE_LSN_PORT,
            TestCase::Recv => crate::XMIT_MODE_LSN_PORT,
        });

        let timeout_policy = match self.on_timeout.as_str() {
            "loss" => TimeoutPolicy::Loss,
            "shrink" => TimeoutPolicy::Shrink,
            _ => {
                error!("Invalid timeout policy! Should be 'loss' or 'shrink'");
                return None;
            }
        };

        let seed = if self.seed == -1 {
            let seed = rand::thread_rng().gen_range(0..100_000);
            info!("This testcase is run with a randomly chosen seed = {}", seed);
            seed
        } else {
            info!("This testcase is run with seed = {}", self.seed);
            self.seed as u64
        };

        let max_size = Self::max_size(testcase, protocol);
        let size = if self.size == -1 {
            let size = StdRng::seed_from_u64(seed).gen_range(1..=max_size);
            info!("Randomly chosen message size = {}", size);
            size
        } else if self.size <= 0 || self.size as usize > max_size {
            error!("This test limits the message size to {} bytes!", max_size);
            return None;
        } else {
            self.size as usize
        };

        if self.multi_threading && testcase != TestCase::Echo {
            warn!("Multi-threading only applies to the echo test; ignoring it.");
        }
        if (self.ramp || self.pause_ms > 0) && testcase != TestCase::Send {
            warn!("Ramp and pacing only apply to the send test; ignoring them.");
        }
        if self.ramp && self.pause_ms > 0 {
            error!("Ramp and pacing cannot be combined!");
            return None;
        }

        let parameter = Parameter {
            testcase,
            protocol,
            count: self.loop_count,
            size,
            seed,
            multi_threading: self.multi_threading,
            ramp: self.ramp,
            pause_ms: self.pause_ms,
            timeout_policy,
            recv_timeout_ms: self.recv_timeout_ms,
            in_flight_cap: crate::IN_FLIGHT_CAP,
            output_format: if self.json { OutputFormat::Json } else { OutputFormat::Text },
            verbose: self.verbose,
        };

        Some((parameter, SocketAddrV4::new(ipv4, port)))
    }

    /// Restart the FPGA role, check liveness and wait out lingering socket
    /// pairs before the engine takes over the connection.
    fn bring_up(&self, fpga_address: SocketAddrV4, protocol: Protocol) -> bool {
        if self.user_name.is_empty() || self.user_passwd.is_empty() {
            warn!(
                "You must provide a ZYC2 user name and the corresponding password \
                 (or pass --skip-setup) for this test to execute."
            );
            return false;
        }

        let mngr_ipv4 = match net::parse_ipv4(&self.mngr_ipv4) {
            Ok(x) => x,
            Err(_) => {
                error!("Invalid resource manager IPv4 address!");
                return false;
            }
        };
        let mngr = SocketAddrV4::new(mngr_ipv4, self.mngr_port);

        if let Err(x) = setup::restart_app(self.inst_id, mngr, &self.user_name, &self.user_passwd) {
            error!("Failed to reset the FPGA role: {}", x);
            return false;
        }
        if let Err(x) = setup::ping_fpga(*fpga_address.ip()) {
            error!("{}", x);
            return false;
        }
        if protocol == Protocol::Tcp {
            setup::wait_port_released(fpga_address);
        }
        true
    }

    fn open_connection(&self, fpga_address: SocketAddrV4, parameter: &Parameter) -> Result<Socket, &'static str> {
        let socket = Socket::new(parameter.protocol)?;
        if parameter.protocol == Protocol::Tcp {
            socket.set_reuse_addr()?;
        }
        // For UDP, connect() still pins the default destination address in
        // the kernel, which makes the send path cheaper.
        socket.connect(fpga_address)?;
        if parameter.protocol == Protocol::Tcp && parameter.pause_ms > 0 {
            socket.set_no_delay()?;
        }
        socket.set_nonblocking()?;
        Ok(socket)
    }

    /// The request/response test points the FPGA back at this very
    /// connection. Over TCP the request uses the long form, which spells
    /// out the reply address even on a multi-homed host; the UDP role
    /// replies to the datagram's source and expects the short form.
    fn build_xmit_request(socket: &Socket, parameter: &Parameter) -> Result<XmitRequest, &'static str> {
        let local = socket.local_addr()?;
        Ok(XmitRequest {
            // The UDP variant of the bring-up role expects the short form.
            dest_addr: match parameter.protocol {
                Protocol::Tcp => Some(*local.ip()),
                Protocol::Udp => None,
            },
            dest_port: local.port(),
            size: parameter.size as u16,
        })
    }

    fn max_size(testcase: TestCase, protocol: Protocol) -> usize {
        match (testcase, protocol) {
            (TestCase::Recv, Protocol::Tcp) => crate::MAX_XMIT_REQUEST_SIZE,
            (_, Protocol::Tcp) => crate::ZYC2_MSS,
            (_, Protocol::Udp) => crate::UDP_MDS,
        }
    }

    fn session_label(parameter: &Parameter) -> String {
        let protocol = match parameter.protocol {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        };
        let testcase = match parameter.testcase {
            TestCase::Echo => "Tx/Rx",
            TestCase::Send => "Tx",
            TestCase::Recv => "Rx",
        };
        format!("{} {}", protocol, testcase)
    }
}
