use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{validate_session_id, KeyValueStore, SessionStore, StoreError};
use crate::models::{ConversationLogEntry, Turn, TurnRole};

struct Slot<V> {
    value: V,
    written: Instant,
    used: Instant,
}

/// In-memory store with a time-to-live and a capacity bound.
///
/// Expired entries are invisible and purged lazily. When a put would exceed
/// the capacity, expired entries are dropped first, then the least recently
/// used one.
pub struct TtlStore<V> {
    slots: Mutex<HashMap<String, Slot<V>>>,
    ttl: Duration,
    capacity: usize,
}

impl<V> TtlStore<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn purge_expired(slots: &mut HashMap<String, Slot<V>>, ttl: Duration, now: Instant) {
        slots.retain(|_, slot| now.duration_since(slot.written) < ttl);
    }
}

impl<V: Clone + Send> KeyValueStore<V> for TtlStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let expired = match slots.get_mut(key) {
            Some(slot) if now.duration_since(slot.written) < self.ttl => {
                slot.used = now;
                return Some(slot.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            slots.remove(key);
        }
        None
    }

    fn put(&self, key: &str, value: V) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if !slots.contains_key(key) && slots.len() >= self.capacity {
            Self::purge_expired(&mut slots, self.ttl, now);
            if slots.len() >= self.capacity {
                let oldest = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.used)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    tracing::debug!(key = %k, "Evicting least recently used entry");
                    slots.remove(&k);
                }
            }
        }

        slots.insert(
            key.to_string(),
            Slot {
                value,
                written: now,
                used: now,
            },
        );
    }

    fn remove(&self, key: &str) -> Option<V> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(key).map(|slot| slot.value)
    }

    fn len(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Self::purge_expired(&mut slots, self.ttl, Instant::now());
        slots.len()
    }
}

/// Session history kept in process memory. Lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    turns: Mutex<HashMap<String, Vec<Turn>>>,
    logs: Mutex<HashMap<String, Vec<ConversationLogEntry>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log rows recorded for a session, oldest first.
    pub fn logs_for(&self, session_id: &str) -> Vec<ConversationLogEntry> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.get(session_id).cloned().unwrap_or_default()
    }
}

impl SessionStore for MemorySessionStore {
    fn append_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        text: &str,
    ) -> Result<Turn, StoreError> {
        validate_session_id(session_id)?;
        let turn = Turn::new(session_id, role, text);
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        turns
            .entry(session_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(turn)
    }

    fn read_recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, StoreError> {
        let turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(turns
            .get(session_id)
            .map(|history| {
                let start = history.len().saturating_sub(limit);
                history[start..].to_vec()
            })
            .unwrap_or_default())
    }

    fn clear(&self, session_id: &str) -> Result<usize, StoreError> {
        let removed = {
            let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
            turns.remove(session_id).map(|h| h.len()).unwrap_or(0)
        };
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.remove(session_id);
        Ok(removed)
    }

    fn session_count(&self) -> Result<usize, StoreError> {
        let turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(turns.len())
    }

    fn record_log(&self, entry: &ConversationLogEntry) -> Result<(), StoreError> {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.entry(entry.session_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    fn append_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
        log: &ConversationLogEntry,
    ) -> Result<(), StoreError> {
        validate_session_id(session_id)?;
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        let history = turns.entry(session_id.to_string()).or_default();
        history.push(Turn::new(session_id, TurnRole::User, user_text));
        history.push(Turn::new(session_id, TurnRole::Assistant, assistant_text));
        logs.entry(session_id.to_string()).or_default().push(log.clone());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
