use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::KeyValueStore;

/// Identical signatures in a row at which a loop is reported.
pub const LOOP_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopState {
    pub last_signature: String,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopCheck {
    pub loop_detected: bool,
    pub count: u32,
}

/// Per-session repetition detector. Every call is a detection event and
/// updates the stored state.
#[derive(Clone)]
pub struct LoopDetector {
    store: Arc<dyn KeyValueStore<LoopState>>,
}

impl LoopDetector {
    pub fn new(store: Arc<dyn KeyValueStore<LoopState>>) -> Self {
        Self { store }
    }

    pub fn detect_loop<S: AsRef<str>>(&self, session_id: &str, input: &str, roles: &[S]) -> LoopCheck {
        let signature = signature(input, roles);
        let count = match self.store.get(session_id) {
            Some(prev) if prev.last_signature == signature => prev.count.saturating_add(1),
            _ => 1,
        };
        self.store.put(
            session_id,
            LoopState {
                last_signature: signature,
                count,
            },
        );

        let loop_detected = count >= LOOP_THRESHOLD;
        if loop_detected {
            tracing::debug!(session_id = %session_id, count, "Input loop detected");
        }
        LoopCheck {
            loop_detected,
            count,
        }
    }

    pub fn reset(&self, session_id: &str) {
        self.store.remove(session_id);
    }
}

/// SHA-256 over the input, a unit separator, then the roles in order.
pub fn signature<S: AsRef<str>>(input: &str, roles: &[S]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.update([0x1f_u8]);
    for (i, role) in roles.iter().enumerate() {
        if i > 0 {
            hasher.update(b",");
        }
        hasher.update(role.as_ref().as_bytes());
    }
    hex(&hasher.finalize())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
