//! Push-key allocation and the server clock.
//!
//! Push keys are the backend-assigned identifiers for appended elements.
//! They are built so that byte-wise lexicographic order equals allocation
//! order: a fixed-width timestamp prefix, a per-millisecond counter, and a
//! random tail for uniqueness across backend instances.

use devchat_shared::types::PushKey;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 64-character alphabet in ASCII order, so encoded strings sort the same
/// as the integers they encode.
const PUSH_ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIMESTAMP_CHARS: usize = 8;
const COUNTER_CHARS: usize = 3;
const RANDOM_CHARS: usize = 8;

/// Allocates push keys and server timestamps for one backend instance.
#[derive(Debug)]
pub struct KeyAllocator {
    last_millis: i64,
    counter: u32,
    last_timestamp: i64,
    rng: StdRng,
}

impl KeyAllocator {
    pub fn new() -> Self {
        Self {
            last_millis: 0,
            counter: 0,
            last_timestamp: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Allocate the next push key. Keys from one allocator are strictly
    /// increasing even when the wall clock stalls or steps backwards.
    pub fn next_key(&mut self, now_millis: i64) -> PushKey {
        if now_millis > self.last_millis {
            self.last_millis = now_millis;
            self.counter = 0;
        } else {
            self.counter += 1;
        }

        let mut key = String::with_capacity(TIMESTAMP_CHARS + COUNTER_CHARS + RANDOM_CHARS);
        encode_fixed(self.last_millis as u64, TIMESTAMP_CHARS, &mut key);
        encode_fixed(self.counter as u64, COUNTER_CHARS, &mut key);
        for _ in 0..RANDOM_CHARS {
            let idx = self.rng.gen_range(0..PUSH_ALPHABET.len());
            key.push(PUSH_ALPHABET[idx] as char);
        }
        PushKey(key)
    }

    /// Server-assigned timestamp: the wall clock, clamped so consecutive
    /// writes always observe a strictly increasing value.
    pub fn next_timestamp(&mut self, now_millis: i64) -> i64 {
        self.last_timestamp = now_millis.max(self.last_timestamp + 1);
        self.last_timestamp
    }
}

impl Default for KeyAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `value` as exactly `width` alphabet characters, most significant
/// first. 8 characters cover 64^8 milliseconds, far beyond any plausible
/// wall-clock value.
fn encode_fixed(mut value: u64, width: usize, out: &mut String) {
    let mut buf = [0u8; 16];
    for slot in buf[..width].iter_mut().rev() {
        *slot = PUSH_ALPHABET[(value % 64) as usize];
        value /= 64;
    }
    out.push_str(std::str::from_utf8(&buf[..width]).unwrap_or_default());
}
