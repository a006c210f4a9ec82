use std::collections::BTreeSet;

use dailychat_common::ClientId;

use crate::protocol::{PresenceEventKind, PresenceSignal};

/// Lifecycle of one presence session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// Channel opened, subscription not yet confirmed.
    Init,
    /// `join` and `who_is_online` are being sent.
    Handshaking,
    Steady,
    Closed,
}

/// Add/remove set of client ids heard on the presence channel.
///
/// The count converges but is never authoritative: a peer that drops
/// without its `leave` being delivered stays counted until this session
/// ends, and a peer whose `join` is still in flight is not yet counted.
/// There is no expiry.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    self_id: ClientId,
    state: PresenceState,
    members: BTreeSet<ClientId>,
}

impl PresenceTracker {
    pub fn new(self_id: ClientId) -> Self {
        let members = BTreeSet::from([self_id.clone()]);
        Self {
            self_id,
            state: PresenceState::Init,
            members,
        }
    }

    pub fn self_id(&self) -> &ClientId {
        &self.self_id
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> impl Iterator<Item = &ClientId> {
        self.members.iter()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.members.contains(id)
    }

    /// Subscription confirmed: enter `Handshaking` and return the signals to
    /// broadcast, in order. Only the first confirmation does anything.
    pub fn begin_handshake(&mut self) -> Vec<PresenceSignal> {
        if self.state != PresenceState::Init {
            return Vec::new();
        }
        self.state = PresenceState::Handshaking;
        vec![
            PresenceSignal::new(PresenceEventKind::Join, self.self_id.clone()),
            PresenceSignal::new(PresenceEventKind::WhoIsOnline, self.self_id.clone()),
        ]
    }

    /// Handshake signals sent (successfully or not).
    pub fn complete_handshake(&mut self) {
        if self.state == PresenceState::Handshaking {
            self.state = PresenceState::Steady;
        }
    }

    /// Apply a peer's signal. Returns the reply to broadcast, if any.
    pub fn handle(&mut self, signal: &PresenceSignal) -> Option<PresenceSignal> {
        if self.state == PresenceState::Closed {
            return None;
        }
        let is_self = signal.client_id == self.self_id;
        match signal.kind {
            PresenceEventKind::WhoIsOnline if !is_self => Some(PresenceSignal::new(
                PresenceEventKind::Here,
                self.self_id.clone(),
            )),
            PresenceEventKind::WhoIsOnline => None,
            PresenceEventKind::Here | PresenceEventKind::Join => {
                self.members.insert(signal.client_id.clone());
                None
            }
            PresenceEventKind::Leave => {
                if !is_self {
                    self.members.remove(&signal.client_id);
                }
                None
            }
        }
    }

    /// End the session. Returns the `leave` to broadcast if the channel had
    /// been subscribed; calling again returns `None`.
    pub fn teardown(&mut self) -> Option<PresenceSignal> {
        let was_subscribed = match self.state {
            PresenceState::Closed => return None,
            PresenceState::Init => false,
            PresenceState::Handshaking | PresenceState::Steady => true,
        };
        self.state = PresenceState::Closed;
        self.members.clear();
        was_subscribed.then(|| PresenceSignal::new(PresenceEventKind::Leave, self.self_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ClientId {
        ClientId::from(s)
    }

    fn sig(kind: PresenceEventKind, s: &str) -> PresenceSignal {
        PresenceSignal::new(kind, id(s))
    }

    fn steady(self_id: &str) -> PresenceTracker {
        let mut t = PresenceTracker::new(id(self_id));
        t.begin_handshake();
        t.complete_handshake();
        t
    }

    /// Reference model: replay add/remove in delivery order.
    fn replay(self_id: &str, events: &[PresenceSignal]) -> BTreeSet<ClientId> {
        let mut set = BTreeSet::from([id(self_id)]);
        for e in events {
            match e.kind {
                PresenceEventKind::Here | PresenceEventKind::Join => {
                    set.insert(e.client_id.clone());
                }
                PresenceEventKind::Leave if e.client_id.as_str() != self_id => {
                    set.remove(&e.client_id);
                }
                _ => {}
            }
        }
        set
    }

    fn permutations(items: &[PresenceSignal]) -> Vec<Vec<PresenceSignal>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn new_tracker_counts_self() {
        let t = PresenceTracker::new(id("me"));
        assert_eq!(t.state(), PresenceState::Init);
        assert_eq!(t.count(), 1);
        assert!(t.contains(&id("me")));
    }

    #[test]
    fn handshake_sends_join_then_who_is_online() {
        let mut t = PresenceTracker::new(id("me"));
        let out = t.begin_handshake();
        assert_eq!(
            out,
            vec![
                sig(PresenceEventKind::Join, "me"),
                sig(PresenceEventKind::WhoIsOnline, "me"),
            ]
        );
        assert_eq!(t.state(), PresenceState::Handshaking);
        t.complete_handshake();
        assert_eq!(t.state(), PresenceState::Steady);
    }

    #[test]
    fn repeated_subscription_confirmation_is_ignored() {
        let mut t = steady("me");
        assert!(t.begin_handshake().is_empty());
        assert_eq!(t.state(), PresenceState::Steady);
    }

    #[test]
    fn who_is_online_from_peer_gets_here() {
        let mut t = steady("me");
        let reply = t.handle(&sig(PresenceEventKind::WhoIsOnline, "peer"));
        assert_eq!(reply, Some(sig(PresenceEventKind::Here, "me")));
        // Asking does not add the asker.
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn own_who_is_online_is_not_answered() {
        let mut t = steady("me");
        assert_eq!(t.handle(&sig(PresenceEventKind::WhoIsOnline, "me")), None);
    }

    #[test]
    fn join_here_leave_update_the_set() {
        let mut t = steady("me");
        t.handle(&sig(PresenceEventKind::Join, "a"));
        t.handle(&sig(PresenceEventKind::Here, "b"));
        t.handle(&sig(PresenceEventKind::Here, "a"));
        assert_eq!(t.count(), 3);
        t.handle(&sig(PresenceEventKind::Leave, "a"));
        assert_eq!(t.count(), 2);
        assert!(!t.contains(&id("a")));
        // Leaving twice is harmless.
        t.handle(&sig(PresenceEventKind::Leave, "a"));
        assert_eq!(t.count(), 2);
    }

    #[test]
    fn self_leave_never_removes_self() {
        let mut t = steady("me");
        t.handle(&sig(PresenceEventKind::Leave, "me"));
        assert!(t.contains(&id("me")));
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn count_matches_replay_for_every_delivery_order() {
        let events = [
            sig(PresenceEventKind::Join, "a"),
            sig(PresenceEventKind::Here, "b"),
            sig(PresenceEventKind::Leave, "a"),
            sig(PresenceEventKind::Join, "c"),
            sig(PresenceEventKind::Leave, "me"),
            sig(PresenceEventKind::Here, "a"),
        ];
        for order in permutations(&events) {
            let mut t = steady("me");
            for e in &order {
                t.handle(e);
            }
            let expected = replay("me", &order);
            assert_eq!(t.count(), expected.len(), "order: {order:?}");
            assert!(t.members().eq(expected.iter()));
            assert!(t.contains(&id("me")));
        }
    }

    #[test]
    fn teardown_emits_leave_once_and_clears() {
        let mut t = steady("me");
        t.handle(&sig(PresenceEventKind::Join, "a"));
        assert_eq!(t.teardown(), Some(sig(PresenceEventKind::Leave, "me")));
        assert_eq!(t.state(), PresenceState::Closed);
        assert_eq!(t.count(), 0);
        assert_eq!(t.teardown(), None);
    }

    #[test]
    fn teardown_before_subscription_sends_nothing() {
        let mut t = PresenceTracker::new(id("me"));
        assert_eq!(t.teardown(), None);
        assert_eq!(t.state(), PresenceState::Closed);
    }

    #[test]
    fn closed_tracker_ignores_events() {
        let mut t = steady("me");
        t.teardown();
        assert_eq!(t.handle(&sig(PresenceEventKind::WhoIsOnline, "a")), None);
        t.handle(&sig(PresenceEventKind::Join, "a"));
        assert_eq!(t.count(), 0);
        assert!(t.begin_handshake().is_empty());
    }
}
