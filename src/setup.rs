//! Bring-up orchestration against the cloudFPGA management plane: restart
//! the FPGA role through the resource manager, check liveness with a ping
//! and wait for a lingering socket pair to clear before reconnecting.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::process::Command;
use std::thread::sleep;
use std::time::Duration;

use log::{error, info, warn};

const MNGR_TIMEOUT: Duration = Duration::from_secs(10);
const PORT_REUSE_RETRY: Duration = Duration::from_secs(5);

/// Triggers a SW reset of the FPGA role via the resource manager, e.g.
/// `PATCH http://10.12.0.132:8080/instances/13/app_restart?username=fab&password=secret`.
pub fn restart_app(
    inst_id: u32,
    mngr: SocketAddrV4,
    user_name: &str,
    user_passwd: &str,
) -> Result<(), &'static str> {
    info!("Requesting the application of FPGA instance #{} to restart.", inst_id);

    let path = format!(
        "/instances/{}/app_restart?username={}&password={}",
        inst_id, user_name, user_passwd
    );
    let request = format!(
        "PATCH {} HTTP/1.1\r\nHost: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        path, mngr
    );

    let mut stream = match TcpStream::connect(mngr) {
        Ok(x) => x,
        Err(e) => {
            error!("Failed to connect to the resource manager at {}: {}", mngr, e);
            return Err("Failed to connect to the resource manager");
        }
    };
    let _ = stream.set_read_timeout(Some(MNGR_TIMEOUT));

    if stream.write_all(request.as_bytes()).is_err() {
        return Err("Failed to send the restart request");
    }

    let mut response = String::new();
    if stream.read_to_string(&mut response).is_err() {
        return Err("Failed to read the restart response");
    }

    let status_line = response.lines().next().unwrap_or_default();
    if !status_line.contains("200") {
        error!("Resource manager replied: {}", status_line);
        return Err("Failed to reset the FPGA role");
    }

    info!("Resource manager replied: {}", status_line);
    Ok(())
}

/// Pings the FPGA: 2 probes, waiting at most 2 seconds for each of them.
pub fn ping_fpga(ip: Ipv4Addr) -> Result<(), &'static str> {
    info!("Trying to ping the FPGA at {}", ip);

    let status = Command::new("ping")
        .args(["-c", "2", "-W", "2"])
        .arg(ip.to_string())
        .status();

    match status {
        Ok(x) if x.success() => Ok(()),
        Ok(_) => {
            error!("FPGA does not reply to ping!");
            Err("FPGA does not reply to ping")
        }
        Err(e) => {
            error!("Failed to run ping: {}", e);
            Err("Failed to run ping")
        }
    }
}

/// Blocks until no connection toward the target socket lingers in a
/// TIME_WAIT or FIN_WAIT state. Reusing the socket pair earlier would make
/// the connect attempt fail or deliver stale segments.
pub fn wait_port_released(target: SocketAddrV4) {
    let needle = proc_net_needle(target);
    loop {
        match std::fs::read_to_string("/proc/net/tcp") {
            Ok(table) => {
                if !table_has_waiting_pair(&table, &needle) {
                    return;
                }
                info!(
                    "Cannot reuse this socket as long as it is in the TIME_WAIT or FIN_WAIT state. \
                     Let's sleep for {} sec...",
                    PORT_REUSE_RETRY.as_secs()
                );
                sleep(PORT_REUSE_RETRY);
            }
            Err(e) => {
                // Best effort: without the table we just go ahead.
                warn!("Cannot inspect /proc/net/tcp ({}), skipping the port-reuse wait", e);
                return;
            }
        }
    }
}

/// The `address:port` token of `/proc/net/tcp`, which renders the in_addr
/// as native-endian hex (byte-swapped on little-endian kernels).
fn proc_net_needle(target: SocketAddrV4) -> String {
    format!(
        "{:08X}:{:04X}",
        u32::from(*target.ip()).swap_bytes(),
        target.port()
    )
}

fn table_has_waiting_pair(table: &str, needle: &str) -> bool {
    // Socket states 04 (FIN_WAIT1), 05 (FIN_WAIT2) and 06 (TIME_WAIT).
    table.lines().skip(1).any(|line| {
        let mut fields = line.split_whitespace();
        let remote = fields.nth(2).unwrap_or_default();
        let state = fields.next().unwrap_or_default();
        remote == needle && matches!(state, "04" | "05" | "06")
    })
}
