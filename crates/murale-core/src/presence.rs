//! Peer cursor presence: who else is on the board and where.

use std::collections::HashMap;

use crate::element::{TimestampMs, UserId};

/// Peers silent longer than this are dropped from the overlay.
pub const PEER_EXPIRY_MS: u64 = 6_000;
/// Minimum gap between outgoing cursor broadcasts.
pub const CURSOR_THROTTLE_MS: u64 = 40;

/// Last known cursor of one peer, in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerCursor {
    pub user: UserId,
    pub x: f64,
    pub y: f64,
    pub last_seen_ms: TimestampMs,
    /// One-way delay of the last message, from its send timestamp.
    pub latency_ms: u64,
}

/// Tracks peer cursors and paces our own cursor broadcasts.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    peers: HashMap<UserId, PeerCursor>,
    last_sent_ms: Option<TimestampMs>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a peer cursor message received at `now`.
    pub fn observe(
        &mut self,
        user: UserId,
        x: f64,
        y: f64,
        sent_at_ms: TimestampMs,
        now: TimestampMs,
    ) {
        let cursor = PeerCursor {
            user,
            x,
            y,
            last_seen_ms: now,
            // Clocks may disagree; a peer "from the future" reads as zero.
            latency_ms: now.saturating_sub(sent_at_ms),
        };
        self.peers.insert(user, cursor);
    }

    /// Drop peers not heard from within the expiry window. Returns the
    /// users that were removed.
    pub fn expire(&mut self, now: TimestampMs) -> Vec<UserId> {
        let expired: Vec<UserId> = self
            .peers
            .values()
            .filter(|p| now.saturating_sub(p.last_seen_ms) > PEER_EXPIRY_MS)
            .map(|p| p.user)
            .collect();
        for user in &expired {
            self.peers.remove(user);
            log::debug!("peer {user} expired from presence");
        }
        expired
    }

    /// Drop a peer that left explicitly.
    pub fn remove(&mut self, user: UserId) -> bool {
        self.peers.remove(&user).is_some()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerCursor> {
        self.peers.values()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn get(&self, user: UserId) -> Option<&PeerCursor> {
        self.peers.get(&user)
    }

    /// Whether a cursor broadcast may go out at `now`; stamps the send
    /// time when it may.
    pub fn allow_cursor_send(&mut self, now: TimestampMs) -> bool {
        match self.last_sent_ms {
            Some(last) if now.saturating_sub(last) < CURSOR_THROTTLE_MS => false,
            _ => {
                self.last_sent_ms = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_observe_updates_in_place() {
        let mut presence = PresenceTracker::new();
        let peer = Uuid::new_v4();
        presence.observe(peer, 1.0, 2.0, 90, 100);
        presence.observe(peer, 3.0, 4.0, 180, 200);
        assert_eq!(presence.peer_count(), 1);
        let cursor = presence.get(peer).unwrap();
        assert_eq!((cursor.x, cursor.y), (3.0, 4.0));
        assert_eq!(cursor.latency_ms, 20);
    }

    #[test]
    fn test_latency_saturates_on_clock_skew() {
        let mut presence = PresenceTracker::new();
        let peer = Uuid::new_v4();
        presence.observe(peer, 0.0, 0.0, 5_000, 1_000);
        assert_eq!(presence.get(peer).unwrap().latency_ms, 0);
    }

    #[test]
    fn test_expiry_drops_only_silent_peers() {
        let mut presence = PresenceTracker::new();
        let quiet = Uuid::new_v4();
        let active = Uuid::new_v4();
        presence.observe(quiet, 0.0, 0.0, 0, 0);
        presence.observe(active, 0.0, 0.0, 0, 5_000);

        let expired = presence.expire(PEER_EXPIRY_MS + 1);
        assert_eq!(expired, vec![quiet]);
        assert_eq!(presence.peer_count(), 1);
        assert!(presence.get(active).is_some());

        assert!(presence.expire(PEER_EXPIRY_MS + 1).is_empty());
    }

    #[test]
    fn test_cursor_send_throttle() {
        let mut presence = PresenceTracker::new();
        assert!(presence.allow_cursor_send(1_000));
        assert!(!presence.allow_cursor_send(1_000 + CURSOR_THROTTLE_MS - 1));
        assert!(presence.allow_cursor_send(1_000 + CURSOR_THROTTLE_MS));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut presence = PresenceTracker::new();
        let peer = Uuid::new_v4();
        presence.observe(peer, 0.0, 0.0, 0, 0);
        assert!(presence.remove(peer));
        assert!(!presence.remove(peer));
    }
}
