//! The client-held slice of one room's history.
//!
//! Every fetch takes a ticket before it starts and hands it back with its
//! result. A refresh is applied only if its ticket is newer than the last
//! applied one, so a slow refresh can never overwrite a faster, later one.
//! After [`FeedWindow::close`] every result is discarded.
//!
//! Once something is held, a refresh re-reads everything from the oldest
//! held message up to now, so edits and deletes anywhere in the window show
//! up, not just in the newest page.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::message::Message;

/// What the UI renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    /// Oldest first.
    pub messages: Vec<Message>,
    pub has_more_older: bool,
    pub loading: bool,
}

/// A granted refresh of the newest messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestRequest {
    pub ticket: u64,
    /// Oldest held message when the request was made. `None` on first load
    /// or while the window is empty.
    pub since: Option<DateTime<Utc>>,
    /// How many of the newest rows to fetch.
    pub limit: usize,
}

/// A granted request for the page before the current oldest message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OlderRequest {
    pub ticket: u64,
    pub before: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct FeedWindow {
    messages: Vec<Message>,
    has_more_older: bool,
    loaded: bool,
    closed: bool,
    next_ticket: u64,
    last_applied_latest: u64,
    latest_pending: usize,
    older_in_flight: Option<u64>,
}

/// Sort by feed order and drop repeated ids (first occurrence wins).
fn normalize(messages: &mut Vec<Message>) {
    messages.sort_by(|a, b| a.feed_order(b));
    let mut seen = HashSet::new();
    messages.retain(|m| seen.insert(m.id.clone()));
}

impl FeedWindow {
    pub fn new() -> Self {
        Self::default()
    }

    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            messages: self.messages.clone(),
            has_more_older: self.has_more_older,
            loading: self.is_loading(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    pub fn is_loading(&self) -> bool {
        !self.closed && (self.latest_pending > 0 || self.older_in_flight.is_some())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    // -- latest slice ------------------------------------------------------

    /// Take a ticket for a refresh. With messages held, the request covers
    /// them all plus room for a page of new arrivals.
    pub fn begin_latest(&mut self, page_size: usize) -> LatestRequest {
        self.latest_pending += 1;
        let since = if self.loaded {
            self.messages.first().map(|m| m.created_at)
        } else {
            None
        };
        let limit = match since {
            Some(_) => self.messages.len() + page_size,
            None => page_size,
        };
        LatestRequest {
            ticket: self.ticket(),
            since,
            limit,
        }
    }

    /// Merge the newest messages. Returns false if the result was stale or
    /// the window is closed.
    ///
    /// On first load the window becomes the page. A refresh whose page
    /// reaches back to `since` (or is short, so it holds the whole room)
    /// replaces every held message from `since` on, keeping the oldest
    /// boundary where it was. A full page that stops short of `since` would
    /// leave a gap, so it replaces the window outright.
    pub fn apply_latest(&mut self, request: &LatestRequest, mut page: Vec<Message>) -> bool {
        self.latest_pending = self.latest_pending.saturating_sub(1);
        if self.closed || request.ticket <= self.last_applied_latest {
            return false;
        }
        self.last_applied_latest = request.ticket;
        normalize(&mut page);
        let full = page.len() >= request.limit;

        match request.since {
            Some(since) if !full || page.first().is_some_and(|m| m.created_at <= since) => {
                // Anything older than `since` came from an older page that
                // landed while this refresh was running.
                let mut merged: Vec<Message> = self
                    .messages
                    .drain(..)
                    .filter(|m| m.created_at < since)
                    .collect();
                merged.extend(page.into_iter().filter(|m| m.created_at >= since));
                normalize(&mut merged);
                self.messages = merged;
            }
            _ => {
                self.messages = page;
                self.has_more_older = full;
                // An older page requested against the previous window no longer fits.
                self.older_in_flight = None;
            }
        }
        self.loaded = true;
        true
    }

    pub fn fail_latest(&mut self, _ticket: u64) {
        self.latest_pending = self.latest_pending.saturating_sub(1);
    }

    // -- older pages -------------------------------------------------------

    /// Request the page before the oldest held message. `None` when the
    /// window is empty, history is exhausted, or a request is outstanding.
    pub fn begin_older(&mut self) -> Option<OlderRequest> {
        if self.closed || !self.has_more_older || self.older_in_flight.is_some() {
            return None;
        }
        let before = self.messages.first()?.created_at;
        let ticket = self.ticket();
        self.older_in_flight = Some(ticket);
        Some(OlderRequest { ticket, before })
    }

    /// Prepend an older page. Returns false if the request was superseded
    /// or the window is closed.
    pub fn apply_older(&mut self, ticket: u64, page: Vec<Message>, page_size: usize) -> bool {
        if self.older_in_flight != Some(ticket) {
            return false;
        }
        self.older_in_flight = None;
        if self.closed {
            return false;
        }
        self.has_more_older = page.len() >= page_size;

        let held: HashSet<&str> = self.messages.iter().map(|m| m.id.as_str()).collect();
        let mut older: Vec<Message> = match self.messages.first() {
            Some(oldest) => page
                .into_iter()
                .filter(|m| m.feed_order(oldest) == Ordering::Less && !held.contains(m.id.as_str()))
                .collect(),
            None => page,
        };
        older.append(&mut self.messages);
        normalize(&mut older);
        self.messages = older;
        true
    }

    pub fn fail_older(&mut self, ticket: u64) {
        if self.older_in_flight == Some(ticket) {
            self.older_in_flight = None;
        }
    }

    /// Stop accepting results. Held messages are left as they were.
    pub fn close(&mut self) {
        self.closed = true;
        self.older_in_flight = None;
        self.latest_pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: usize = 3;

    /// Message `n` was created `n` seconds after the epoch.
    fn msg(n: i64) -> Message {
        Message {
            id: format!("m{n}"),
            text: format!("text {n}"),
            sender: "u".into(),
            room: None,
            created_at: Utc.timestamp_opt(n, 0).unwrap(),
            edited: false,
            profile: None,
        }
    }

    /// Newest first, the way the store returns a page.
    fn page(range: std::ops::RangeInclusive<i64>) -> Vec<Message> {
        range.rev().map(msg).collect()
    }

    fn ids(w: &FeedWindow) -> Vec<String> {
        w.messages().iter().map(|m| m.id.clone()).collect()
    }

    fn loaded(range: std::ops::RangeInclusive<i64>) -> FeedWindow {
        let mut w = FeedWindow::new();
        let req = w.begin_latest(PAGE);
        assert!(w.apply_latest(&req, page(range)));
        w
    }

    /// Older history paged in on top of a first load: m4..=m9, more above.
    fn paged() -> FeedWindow {
        let mut w = loaded(7..=9);
        let req = w.begin_older().unwrap();
        assert!(w.apply_older(req.ticket, page(4..=6), PAGE));
        w
    }

    #[test]
    fn first_page_is_sorted_ascending() {
        let w = loaded(5..=7);
        assert_eq!(ids(&w), ["m5", "m6", "m7"]);
        assert!(w.has_more_older());
        assert!(!w.is_loading());
    }

    #[test]
    fn short_page_means_no_more_history() {
        let w = loaded(1..=2);
        assert!(!w.has_more_older());
        let mut w = w;
        assert_eq!(w.begin_older(), None);
    }

    #[test]
    fn empty_window_makes_older_a_no_op() {
        let mut w = loaded(1..=0);
        assert!(w.messages().is_empty());
        assert_eq!(w.begin_older(), None);
        assert!(!w.is_loading());
        assert_eq!(w.begin_latest(PAGE).since, None);
    }

    #[test]
    fn loading_tracks_outstanding_fetches() {
        let mut w = FeedWindow::new();
        let req = w.begin_latest(PAGE);
        assert!(w.snapshot().loading);
        w.fail_latest(req.ticket);
        assert!(!w.snapshot().loading);
    }

    #[test]
    fn refresh_covers_everything_held() {
        let mut w = FeedWindow::new();
        let first = w.begin_latest(PAGE);
        assert_eq!((first.since, first.limit), (None, PAGE));
        assert!(w.apply_latest(&first, page(7..=9)));

        let mut w = paged();
        let req = w.begin_latest(PAGE);
        assert_eq!(req.since, Some(msg(4).created_at));
        assert_eq!(req.limit, 6 + PAGE);
    }

    #[test]
    fn slower_earlier_refresh_is_discarded() {
        let mut w = loaded(5..=7);
        let slow = w.begin_latest(PAGE);
        let fast = w.begin_latest(PAGE);
        assert!(w.apply_latest(&fast, page(5..=9)));
        assert!(!w.apply_latest(&slow, page(5..=8)));
        assert_eq!(ids(&w), ["m5", "m6", "m7", "m8", "m9"]);
        assert!(!w.is_loading());
    }

    #[test]
    fn refresh_keeps_boundary_after_new_message() {
        let mut w = paged();
        // m10 arrives; the store has m1..=m10.
        let req = w.begin_latest(PAGE);
        assert!(w.apply_latest(&req, page(2..=10)));
        assert_eq!(ids(&w), ["m4", "m5", "m6", "m7", "m8", "m9", "m10"]);
        assert!(w.has_more_older());
    }

    #[test]
    fn refresh_reaches_edits_and_deletes_below_latest_page() {
        let mut w = paged();
        // m5 deleted and m4 edited, both older than the newest page.
        let mut edited = msg(4);
        edited.text = "changed".into();
        edited.edited = true;
        let req = w.begin_latest(PAGE);
        let refreshed = vec![msg(9), msg(8), msg(7), msg(6), edited, msg(3), msg(2), msg(1)];
        assert!(w.apply_latest(&req, refreshed));
        assert_eq!(ids(&w), ["m4", "m6", "m7", "m8", "m9"]);
        assert!(w.find("m4").is_some_and(|m| m.edited && m.text == "changed"));
        assert!(w.has_more_older());
    }

    #[test]
    fn refresh_without_overlap_replaces_window() {
        let mut w = loaded(1..=3);
        let req = w.begin_latest(PAGE);
        assert!(w.apply_latest(&req, page(10..=15)));
        assert_eq!(ids(&w), ["m10", "m11", "m12", "m13", "m14", "m15"]);
        assert!(w.has_more_older());
    }

    #[test]
    fn older_page_landing_during_refresh_is_kept() {
        let mut w = loaded(7..=9);
        let older = w.begin_older().unwrap();
        let latest = w.begin_latest(PAGE);
        assert!(w.apply_older(older.ticket, page(4..=6), PAGE));
        assert!(w.apply_latest(&latest, page(5..=10)));
        assert_eq!(ids(&w), ["m4", "m5", "m6", "m7", "m8", "m9", "m10"]);
    }

    #[test]
    fn gap_refresh_cancels_older_request() {
        let mut w = loaded(7..=9);
        let older = w.begin_older().unwrap();
        let latest = w.begin_latest(PAGE);
        assert!(w.apply_latest(&latest, page(20..=25)));
        assert!(!w.apply_older(older.ticket, page(4..=6), PAGE));
        assert_eq!(ids(&w).first().map(String::as_str), Some("m20"));
    }

    #[test]
    fn short_older_page_exhausts_history() {
        let mut w = loaded(3..=5);
        let req = w.begin_older().unwrap();
        assert!(w.apply_older(req.ticket, page(1..=2), PAGE));
        assert!(!w.has_more_older());
        assert_eq!(ids(&w), ["m1", "m2", "m3", "m4", "m5"]);
    }

    #[test]
    fn duplicates_and_ties_are_normalized() {
        let mut w = FeedWindow::new();
        let req = w.begin_latest(10);
        let mut a = msg(5);
        a.id = "b".into();
        let mut b = msg(5);
        b.id = "a".into();
        let page = vec![a.clone(), b, a, msg(4)];
        assert!(w.apply_latest(&req, page));
        assert_eq!(ids(&w), ["m4", "a", "b"]);
    }

    #[test]
    fn failed_older_leaves_window_and_allows_retry() {
        let mut w = loaded(7..=9);
        let before = w.snapshot();
        let req = w.begin_older().unwrap();
        w.fail_older(req.ticket);
        assert_eq!(w.snapshot(), before);
        assert!(w.begin_older().is_some());
    }

    #[test]
    fn closed_window_discards_results() {
        let mut w = loaded(7..=9);
        let latest = w.begin_latest(PAGE);
        let req = w.begin_older().unwrap();
        w.close();
        assert!(!w.apply_latest(&latest, page(7..=10)));
        assert!(!w.apply_older(req.ticket, page(4..=6), PAGE));
        assert_eq!(ids(&w), ["m7", "m8", "m9"]);
        assert!(!w.is_loading());
        assert!(w.begin_older().is_none());
    }
}
