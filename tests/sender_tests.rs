mod common;

use std::time::Duration;

use cfperf::cfPerf;

#[test]
fn test_tcp_send_fixed_loop_counts_sent_bytes() {
    let (port, sink) = common::spawn_tcp_sink();
    let port = port.to_string();

    let args = vec![
        "send", "--fpga-ipv4", "127.0.0.1", "-p", &port, "--skip-setup",
        "-c", "10", "-s", "256", "--seed", "42",
    ];
    let statistic = cfPerf::from_args(args).exec().expect("send run failed");

    assert_eq!(statistic.tx_bytes, 2560);
    assert_eq!(statistic.rx_bytes, 0);
    assert_eq!(sink.join().unwrap(), 2560);
}

#[test]
fn test_udp_send_ramp_walks_every_segment_size() {
    let (port, sink) = common::spawn_udp_sink(8);
    let port = port.to_string();

    let args = vec![
        "send", "--protocol", "udp", "--fpga-ipv4", "127.0.0.1", "-p", &port,
        "--skip-setup", "--ramp", "-c", "1", "-s", "8", "--seed", "42",
    ];
    let statistic = cfPerf::from_args(args).exec().expect("send run failed");

    // 1 + 2 + ... + 8
    assert_eq!(statistic.tx_bytes, 36);
    let lengths = sink.join().unwrap();
    assert_eq!(lengths, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn test_tcp_send_slow_pace_sleeps_between_sends() {
    let (port, sink) = common::spawn_tcp_sink();
    let port = port.to_string();

    let args = vec![
        "send", "--fpga-ipv4", "127.0.0.1", "-p", &port, "--skip-setup",
        "-c", "3", "-s", "64", "--seed", "42", "--pause-ms", "20",
    ];
    let statistic = cfPerf::from_args(args).exec().expect("send run failed");

    assert_eq!(statistic.tx_bytes, 192);
    assert!(statistic.test_duration() >= Duration::from_millis(60));
    assert_eq!(sink.join().unwrap(), 192);
}
