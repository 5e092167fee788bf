//! Host key and room code generation.
//!
//! Sources only propose identifiers; the registry re-draws on collision, so a
//! source never has to know which ids are live.

use std::{
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
};

use rand::Rng;

/// Room code alphabet without look-alike characters (0/O, 1/I/L).
const ROOM_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of generated room codes.
pub const ROOM_CODE_LEN: usize = 6;

/// Prefix of every generated host key.
pub const HOST_KEY_PREFIX: &str = "hk_";

pub trait IdSource: Send + Sync + Debug {
    fn host_key(&self) -> String;
    fn room_code(&self) -> String;
}

/// Random ids: `hk_<uuid>` keys and short human-typable room codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn host_key(&self) -> String {
        format!("{HOST_KEY_PREFIX}{}", uuid::Uuid::new_v4().simple())
    }

    fn room_code(&self) -> String {
        let mut rng = rand::rng();
        (0..ROOM_CODE_LEN)
            .map(|_| ROOM_ALPHABET[rng.random_range(0..ROOM_ALPHABET.len())] as char)
            .collect()
    }
}

/// Counting ids (`hk_1`, `r_1`, ...) for reproducible tests and demos.
#[derive(Debug, Default)]
pub struct SequentialIds {
    hosts: AtomicU64,
    rooms: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdSource for SequentialIds {
    fn host_key(&self) -> String {
        let n = self.hosts.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{HOST_KEY_PREFIX}{n}")
    }

    fn room_code(&self) -> String {
        let n = self.rooms.fetch_add(1, Ordering::Relaxed) + 1;
        format!("r_{n}")
    }
}
