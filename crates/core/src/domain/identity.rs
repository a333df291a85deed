use chrono::{DateTime, Duration, Utc};
use rand::Rng;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Builds `<prefix>_<unix-millis>_<9 base36 chars>`.
pub fn generate_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect();
    format!("{prefix}_{}_{suffix}", Utc::now().timestamp_millis())
}

/// Draws ids until `is_taken` rejects none of them.
pub fn generate_unique_id(prefix: &str, is_taken: impl Fn(&str) -> bool) -> String {
    loop {
        let candidate = generate_id(prefix);
        if !is_taken(&candidate) {
            return candidate;
        }
    }
}

/// Next modification stamp: wall clock, bumped by one millisecond when the clock
/// has not moved past `previous`.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}
