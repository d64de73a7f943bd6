use rand::rngs::StdRng;
use rand::Rng;

use super::num_to_char;

// The echoed marker makes a segment recognizable in a packet capture.
const STATIC_MARKER: &str = "__________Hello_World__________";
const RANDOM_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Builds a deterministic payload of exactly `size` bytes.
///
/// The payload starts with a newline and a fixed marker string, padded with a
/// repeating hex-nibble pattern. Two processes generating a static payload of
/// the same size always end up with byte-identical buffers, which is what
/// allows the receive side to verify echoed traffic.
pub fn static_payload(size: usize) -> Vec<u8> {
    let mut msg = String::with_capacity(size + STATIC_MARKER.len() + 1);
    msg.push('\n');
    msg.push_str(STATIC_MARKER);
    while msg.len() < size {
        msg.push(num_to_char(msg.len() % 16));
    }
    msg.truncate(size);
    msg.into_bytes()
}

/// Builds a pseudo-random payload of exactly `size` bytes from a seeded
/// generator. Reproducible only if the caller seeds the generator identically,
/// so the seed in use is always echoed in the run log.
pub fn random_payload(size: usize, rng: &mut StdRng) -> Vec<u8> {
    if size == 0 {
        return Vec::new();
    }
    let mut msg = Vec::with_capacity(size);
    msg.push(b'\n');
    for _ in 0..size - 1 {
        msg.push(RANDOM_ALPHABET[rng.gen_range(0..RANDOM_ALPHABET.len())]);
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_static_payload_is_deterministic() {
        for size in [1, 16, 31, 32, 33, 128, 1352] {
            let first = static_payload(size);
            let second = static_payload(size);
            assert_eq!(first.len(), size);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_static_payload_shorter_than_marker() {
        // Sizes below the marker length must truncate, not error out.
        let payload = static_payload(5);
        assert_eq!(payload, b"\n____");
    }

    #[test]
    fn test_static_payload_zero_size() {
        assert!(static_payload(0).is_empty());
    }

    #[test]
    fn test_random_payload_reproducible_for_equal_seeds() {
        let mut first_rng = StdRng::seed_from_u64(4711);
        let mut second_rng = StdRng::seed_from_u64(4711);
        let first = random_payload(512, &mut first_rng);
        let second = random_payload(512, &mut second_rng);
        assert_eq!(first.len(), 512);
        assert_eq!(first, second);
    }

    #[test]
    fn test_random_payload_differs_for_different_seeds() {
        let mut first_rng = StdRng::seed_from_u64(1);
        let mut second_rng = StdRng::seed_from_u64(2);
        assert_ne!(
            random_payload(512, &mut first_rng),
            random_payload(512, &mut second_rng)
        );
    }

    #[test]
    fn test_random_payload_zero_size() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(random_payload(0, &mut rng).is_empty());
    }

    #[test]
    fn test_random_payload_alphabet() {
        let mut rng = StdRng::seed_from_u64(99);
        let payload = random_payload(256, &mut rng);
        assert_eq!(payload[0], b'\n');
        for byte in &payload[1..] {
            assert!(byte.is_ascii_lowercase() || byte.is_ascii_digit());
        }
    }
}
