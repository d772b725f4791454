//! A module which contains the windowed batch collector bounding the proposer's waits. Messages
//! are grouped by a key; the first message of a key opens a window with a fixed cutoff; when the
//! cutoff elapses the group is emitted and the key is closed for good, so stragglers from a past
//! round are dropped instead of waking a round which is already over.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

struct Window<M> {
    deadline: Instant,

    items: Vec<M>,
}

/// A set of batch windows sharing one cutoff, keyed by strings (the proposer keys them by the
/// textual form of the suggestion id).
pub struct BatchWindows<M> {
    cutoff: Duration,

    open: HashMap<String, Window<M>>,

    // The keys whose window already fired. Late arrivals with such a key are dropped.
    closed: HashSet<String>,
}

impl<M> BatchWindows<M> {
    pub fn new(cutoff: Duration) -> Self {
        BatchWindows {
            cutoff,
            open: HashMap::new(),
            closed: HashSet::new(),
        }
    }

    /// Adds the item to the window of the given key. The first item of a key opens its window,
    /// with a deadline of `now + cutoff`. Returns false, and drops the item, if the key's window
    /// already fired.
    pub fn offer(&mut self, key: &str, item: M, now: Instant) -> bool {
        if self.closed.contains(key) {
            return false;
        }

        let cutoff = self.cutoff;
        let window = self.open.entry(key.to_owned()).or_insert_with(|| Window {
            deadline: now + cutoff,
            items: Vec::new(),
        });
        window.items.push(item);
        true
    }

    /// The earliest deadline among the open windows, if any window is open.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.open.values().map(|w| w.deadline).min()
    }

    /// Closes every window whose deadline passed and returns the collected groups, earliest
    /// deadline first.
    pub fn close_due(&mut self, now: Instant) -> Vec<(String, Vec<M>)> {
        let due: Vec<String> = self
            .open
            .iter()
            .filter(|(_, w)| w.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut groups: Vec<(Instant, String, Vec<M>)> = Vec::with_capacity(due.len());
        for key in due {
            if let Some(window) = self.open.remove(&key) {
                self.closed.insert(key.clone());
                groups.push((window.deadline, key, window.items));
            }
        }

        groups.sort_by_key(|(deadline, _, _)| *deadline);
        groups.into_iter().map(|(_, key, items)| (key, items)).collect()
    }
}
