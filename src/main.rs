fn main() {
    if cfperf::cfPerf::new().exec().is_none() {
        std::process::exit(1);
    }
}
