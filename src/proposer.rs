//! The module that contains the struct representing the proposer (the suggester) of the classic
//! Paxos algorithm. The proposer drives rounds: it asks all acceptors for permission under a
//! fresh suggestion id, batches their replies per round for a bounded window, suggests a value
//! when a majority granted, and advances the suggestion id when a round was refused or went
//! nowhere.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::Level;

use crate::api::{AgreementApi, Transport};
use crate::batch::BatchWindows;
use crate::error::PaxosError;
use crate::message::{Message, Nack, PermitGranted, PermitRequest, Suggestion};
use crate::retry::RetryCoordinator;
use crate::suggestion_id::SuggestionId;

/// The struct representing the proposer in the Paxos algorithm.
///
/// The proposer is driven from the outside: the node feeds it the proposer-directed messages as
/// they arrive and calls `on_deadline` whenever `next_deadline` comes due. Every entry point
/// takes the current instant, so the whole pipeline can be exercised without waiting on real
/// timers.
pub struct Proposer<T> {
    uid: String,

    majority: usize,

    transport: Arc<dyn Transport<T>>,

    api: Arc<dyn AgreementApi<T>>,

    retry: Box<dyn RetryCoordinator>,

    // The suggestion id of the round attempted most recently.
    current_sid: Option<SuggestionId>,

    // The suggestion id lined up for the next round, produced by the advancement pathway and
    // waiting for its retry delay to elapse.
    staged_sid: Option<SuggestionId>,

    // When the staged round may fire.
    retry_due: Option<Instant>,

    // The highest suggestion id which ever passed the advancement gate. Candidates at or below
    // it are discarded, which keeps the emitted sequence strictly increasing.
    gate: Option<SuggestionId>,

    // How many permission requests this proposer has broadcast.
    emissions: u32,

    // Permission replies batched per round, bounded by the cutoff.
    granted: BatchWindows<PermitGranted<T>>,

    // Refusals batched per refused suggestion id, bounded by the same cutoff.
    nacks: BatchWindows<Nack>,

    success_seen: bool,
}

impl<T> Proposer<T>
where
    T: Clone + Debug,
{
    pub fn new(
        uid: &str,
        majority: usize,
        take_cutoff: Duration,
        transport: Arc<dyn Transport<T>>,
        api: Arc<dyn AgreementApi<T>>,
        retry: Box<dyn RetryCoordinator>,
    ) -> Self {
        Proposer {
            uid: uid.to_owned(),
            majority,
            transport,
            api,
            retry,
            current_sid: None,
            staged_sid: None,
            retry_due: None,
            gate: None,
            emissions: 0,
            granted: BatchWindows::new(take_cutoff),
            nacks: BatchWindows::new(take_cutoff),
            success_seen: false,
        }
    }

    /// Kicks the first round. Extra calls are harmless: after a Success they do nothing at all,
    /// before one they re-broadcast the current round's permission request.
    pub fn send_first_permission_request(&mut self, now: Instant) -> Result<(), PaxosError> {
        self.try_permission(now)
    }

    /// The try-permission trigger: computes the suggestion id of the next round and broadcasts
    /// the permission request for it. Does nothing once a Success has been observed.
    pub fn try_permission(&mut self, now: Instant) -> Result<(), PaxosError> {
        if self.success_seen {
            return Ok(());
        }

        let sid = self
            .staged_sid
            .take()
            .or_else(|| self.current_sid.clone())
            .unwrap_or_else(|| SuggestionId::initial(&self.uid));

        self.retry_due = None;
        self.current_sid = Some(sid.clone());
        self.emissions += 1;

        let m = Message::PermitRequest(PermitRequest {
            sender_id: self.uid.clone(),
            sid,
        });

        if log_enabled!(Level::Info) {
            info!("[P={}] I will send {:?}.", self.uid, m);
        }

        self.transport.broadcast_message(m)
    }

    // Handlers

    /// Handles a PermitGranted message sent by an acceptor to this proposer. The reply joins the
    /// batch window of its round; a reply for a round whose window already closed is dropped.
    pub fn handle_permit_granted(&mut self, granted: PermitGranted<T>, now: Instant) {
        if self.success_seen {
            return;
        }

        let key = granted.sid.to_key();
        if !self.granted.offer(&key, granted, now) && log_enabled!(Level::Debug) {
            debug!("[P={}] Dropped a grant for the closed round {}.", self.uid, key);
        }
    }

    /// Handles a Nack message sent by an acceptor to this proposer. Refusals are batched per
    /// refused suggestion id, like grants are.
    pub fn handle_nack(&mut self, nack: Nack, now: Instant) {
        if self.success_seen {
            return;
        }

        let key = nack.current_sid.to_key();
        if !self.nacks.offer(&key, nack, now) && log_enabled!(Level::Debug) {
            debug!("[P={}] Dropped a nack for the closed round {}.", self.uid, key);
        }
    }

    /// Handles a Success message: the instance is decided, so the round loop stops for good. The
    /// proposer stays subscribed, and silently swallows whatever stragglers still arrive.
    pub fn handle_success(&mut self) {
        if log_enabled!(Level::Info) && !self.success_seen {
            info!("[P={}] A value was declared, I will stop proposing.", self.uid);
        }

        self.success_seen = true;
        self.staged_sid = None;
        self.retry_due = None;
    }

    // Timers

    /// The earliest instant at which `on_deadline` has work to do, if any timer is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.success_seen {
            return None;
        }

        let deadlines = [
            self.granted.next_deadline(),
            self.nacks.next_deadline(),
            self.retry_due,
        ];
        deadlines.iter().filter_map(|d| *d).min()
    }

    /// Fires every timer which came due: closes expired batch windows, finishes their rounds,
    /// and starts the staged round if its retry delay elapsed.
    pub fn on_deadline(&mut self, now: Instant) -> Result<(), PaxosError> {
        if self.success_seen {
            return Ok(());
        }

        for (key, group) in self.granted.close_due(now) {
            self.finish_permission_round(&key, group, now)?;
        }

        for (key, group) in self.nacks.close_due(now) {
            self.finish_refused_round(&key, group, now);
        }

        if let Some(due) = self.retry_due {
            if due <= now {
                self.try_permission(now)?;
            }
        }

        Ok(())
    }

    // Round completion

    /// A round's batch window closed. With a majority of grants in it, a value is chosen and
    /// suggested; with less, the round is written off and the next one is lined up.
    fn finish_permission_round(
        &mut self,
        key: &str,
        group: Vec<PermitGranted<T>>,
        now: Instant,
    ) -> Result<(), PaxosError> {
        if group.len() < self.majority {
            if log_enabled!(Level::Info) {
                info!(
                    "[P={}] Round {} closed with {} of {} needed grants.",
                    self.uid,
                    key,
                    group.len(),
                    self.majority
                );
            }

            if let Some(current) = self.current_sid.clone() {
                self.advance(current, now);
            }
            return Ok(());
        }

        // The window was keyed by the round's suggestion id, so the group cannot be empty here
        // and every grant in it carries that same id.
        let sid = group[0].sid.clone();
        debug_assert!(group.iter().all(|g| g.sid == sid));

        let prior: Vec<_> = group
            .iter()
            .filter_map(|g| g.last_accepted.as_ref())
            .collect();

        // Only a majority of previously accepted values forces the proposer's hand; it then
        // suggests the one accepted under the highest suggestion id. Otherwise it is free to
        // suggest a value of its own.
        let carried = if prior.len() >= self.majority {
            prior
                .iter()
                .max_by(|a, b| a.sid.cmp(&b.sid))
                .map(|accepted| accepted.value.clone())
        } else {
            None
        };

        let value = match carried {
            Some(value) => {
                if log_enabled!(Level::Info) {
                    info!("[P={}] A majority accepted before me, I will carry {:?}.", self.uid, value);
                }
                value
            }
            None => self.api.get_first_suggestion_value(&self.uid),
        };

        let m = Message::Suggestion(Suggestion {
            sender_id: self.uid.clone(),
            sid,
            value,
        });

        if log_enabled!(Level::Info) {
            info!("[P={}] I will send {:?}.", self.uid, m);
        }

        self.transport.broadcast_message(m)
    }

    /// A refused round's batch window closed. A majority of refusals reveals how far the
    /// acceptors have already promised; the proposer advances right past the highest granted
    /// suggestion id among them.
    fn finish_refused_round(&mut self, key: &str, group: Vec<Nack>, now: Instant) {
        if group.len() < self.majority {
            if log_enabled!(Level::Debug) {
                debug!(
                    "[P={}] Ignoring {} refusals of round {}, majority is {}.",
                    self.uid,
                    group.len(),
                    key,
                    self.majority
                );
            }
            return;
        }

        if let Some(max_granted) = group.into_iter().map(|n| n.last_granted_sid).max() {
            self.advance(max_granted, now);
        }
    }

    /// Feeds a candidate into the monotone advancement gate. A candidate at or below the highest
    /// one seen so far is discarded; a fresh one is incremented and staged as the next round,
    /// delayed by the retry coordinator's schedule.
    fn advance(&mut self, candidate: SuggestionId, now: Instant) {
        let passes = match &self.gate {
            Some(last) => candidate > *last,
            None => true,
        };

        if !passes {
            if log_enabled!(Level::Debug) {
                debug!("[P={}] Not advancing to {}, already past it.", self.uid, candidate);
            }
            return;
        }

        self.gate = Some(candidate.clone());
        let next = candidate.increment();

        if log_enabled!(Level::Info) {
            info!("[P={}] I will try {} next.", self.uid, next);
        }

        let delay = self.retry.delay_for(self.emissions);
        self.staged_sid = Some(next);
        self.retry_due = Some(now + delay);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{Receiver, TryRecvError};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use super::Proposer;
    use crate::api::{AgreementApi, Transport};
    use crate::error::PaxosError;
    use crate::message::{Case, Message, Nack, PermitGranted};
    use crate::registry::ParticipantRegistry;
    use crate::retry::NoopRetry;
    use crate::suggestion_id::{LastAccepted, SuggestionId};

    const FREE_VALUE: u32 = 99;

    struct RecordingApi {
        declared: Mutex<Vec<u32>>,
    }

    impl RecordingApi {
        fn new() -> Self {
            RecordingApi {
                declared: Mutex::new(Vec::new()),
            }
        }
    }

    impl AgreementApi<u32> for RecordingApi {
        fn get_first_suggestion_value(&self, _uid: &str) -> u32 {
            FREE_VALUE
        }

        fn stringify_value(&self, value: &u32) -> String {
            value.to_string()
        }

        fn declare_final_value(&self, value: &u32) -> Result<(), PaxosError> {
            self.declared.lock().unwrap().push(*value);
            Ok(())
        }
    }

    struct Fixture {
        proposer: Proposer<u32>,
        acceptors: Vec<Receiver<Message<u32>>>,
        start: Instant,
    }

    const CUTOFF: Duration = Duration::from_millis(100);

    // Ten acceptors, majority six, like the larger scenarios the algorithm is meant for.
    fn fixture() -> Fixture {
        let registry: Arc<ParticipantRegistry<u32>> = Arc::new(ParticipantRegistry::new());
        let _own_inbox = registry.receive_message("p").unwrap();
        let acceptors: Vec<_> = (0..10)
            .map(|i| registry.receive_message(&format!("a{}", i)).unwrap())
            .collect();
        let proposer = Proposer::new(
            "p",
            6,
            CUTOFF,
            registry,
            Arc::new(RecordingApi::new()),
            Box::new(NoopRetry),
        );
        Fixture {
            proposer,
            acceptors,
            start: Instant::now(),
        }
    }

    fn drain(rx: &Receiver<Message<u32>>) -> Vec<Message<u32>> {
        let mut messages = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(m) => messages.push(m),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return messages,
            }
        }
    }

    fn granted(sid: &SuggestionId, last_accepted: Option<(SuggestionId, u32)>) -> PermitGranted<u32> {
        PermitGranted {
            sid: sid.clone(),
            last_accepted: last_accepted.map(|(sid, value)| LastAccepted::new(sid, value)),
        }
    }

    #[test]
    fn the_first_round_uses_suggestion_id_zero() {
        let mut f = fixture();

        f.proposer.send_first_permission_request(f.start).unwrap();

        for rx in &f.acceptors {
            let m = drain(rx);
            assert_eq!(m.len(), 1);
            let request = m.into_iter().next().unwrap().into_permit_request().unwrap();
            assert_eq!(request.sid, SuggestionId::initial("p"));
            assert_eq!(request.sender_id, "p");
        }
    }

    #[test]
    fn a_minority_of_prior_values_leaves_the_proposer_free() {
        let mut f = fixture();
        f.proposer.send_first_permission_request(f.start).unwrap();
        for rx in &f.acceptors {
            drain(rx);
        }

        let sid = SuggestionId::initial("p");
        for _ in 0..6 {
            f.proposer.handle_permit_granted(granted(&sid, None), f.start);
        }
        for i in 0..4 {
            let prior = (SuggestionId::new(i, "old"), 55);
            f.proposer
                .handle_permit_granted(granted(&sid, Some(prior)), f.start);
        }

        f.proposer.on_deadline(f.start + CUTOFF).unwrap();

        for rx in &f.acceptors {
            let m = drain(rx);
            assert_eq!(m.len(), 1);
            let suggestion = m.into_iter().next().unwrap().into_suggestion().unwrap();
            assert_eq!(suggestion.sid, sid);
            assert_eq!(suggestion.value, FREE_VALUE);
            assert_ne!(suggestion.value, 55);
        }
    }

    #[test]
    fn a_majority_of_prior_values_forces_the_highest_one() {
        let mut f = fixture();
        f.proposer.send_first_permission_request(f.start).unwrap();
        for rx in &f.acceptors {
            drain(rx);
        }

        let sid = SuggestionId::initial("p");
        for i in 0..5 {
            let prior = (SuggestionId::new(i, "old"), 55);
            f.proposer
                .handle_permit_granted(granted(&sid, Some(prior)), f.start);
        }
        // The grant accepted under the highest suggestion id carries the value which must win.
        let prior = (SuggestionId::new(40, "old"), 77);
        f.proposer
            .handle_permit_granted(granted(&sid, Some(prior)), f.start);
        for _ in 0..4 {
            f.proposer.handle_permit_granted(granted(&sid, None), f.start);
        }

        f.proposer.on_deadline(f.start + CUTOFF).unwrap();

        for rx in &f.acceptors {
            let m = drain(rx);
            assert_eq!(m.len(), 1);
            let suggestion = m.into_iter().next().unwrap().into_suggestion().unwrap();
            assert_eq!(suggestion.value, 77);
        }
    }

    #[test]
    fn a_majority_of_nacks_advances_past_the_highest_granted_sid() {
        let mut f = fixture();
        f.proposer.send_first_permission_request(f.start).unwrap();
        for rx in &f.acceptors {
            drain(rx);
        }

        let refused = SuggestionId::initial("p");
        for i in 0..5 {
            f.proposer.handle_nack(
                Nack {
                    current_sid: refused.clone(),
                    last_granted_sid: SuggestionId::new(10 + i, "other"),
                },
                f.start,
            );
        }
        f.proposer.handle_nack(
            Nack {
                current_sid: refused.clone(),
                last_granted_sid: SuggestionId::new(30, "winner"),
            },
            f.start,
        );

        f.proposer.on_deadline(f.start + CUTOFF).unwrap();

        for rx in &f.acceptors {
            let m = drain(rx);
            assert_eq!(m.len(), 1);
            let request = m.into_iter().next().unwrap().into_permit_request().unwrap();
            assert_eq!(request.sid.integer, 31);
            assert_eq!(request.sid.id, "winner");
        }
    }

    #[test]
    fn a_minority_of_nacks_does_not_advance() {
        let mut f = fixture();
        f.proposer.send_first_permission_request(f.start).unwrap();
        for rx in &f.acceptors {
            drain(rx);
        }

        for _ in 0..5 {
            f.proposer.handle_nack(
                Nack {
                    current_sid: SuggestionId::initial("p"),
                    last_granted_sid: SuggestionId::new(10, "other"),
                },
                f.start,
            );
        }

        f.proposer.on_deadline(f.start + CUTOFF).unwrap();

        for rx in &f.acceptors {
            assert!(drain(rx).is_empty());
        }
    }

    #[test]
    fn an_under_quorum_round_lines_up_the_next_one() {
        let mut f = fixture();
        f.proposer.send_first_permission_request(f.start).unwrap();
        for rx in &f.acceptors {
            drain(rx);
        }

        let sid = SuggestionId::initial("p");
        for _ in 0..3 {
            f.proposer.handle_permit_granted(granted(&sid, None), f.start);
        }

        f.proposer.on_deadline(f.start + CUTOFF).unwrap();

        for rx in &f.acceptors {
            let m = drain(rx);
            assert_eq!(m.len(), 1);
            let request = m.into_iter().next().unwrap().into_permit_request().unwrap();
            assert_eq!(request.sid, SuggestionId::new(1, "p"));
        }
    }

    #[test]
    fn emitted_suggestion_ids_are_strictly_monotone() {
        let mut f = fixture();
        f.proposer.send_first_permission_request(f.start).unwrap();

        // Two rounds in a row die of under-quorum, then one is refused outright; the requests
        // must only ever go up.
        let mut at = f.start;
        for round in 0..2 {
            let sid = SuggestionId::new(round, "p");
            f.proposer.handle_permit_granted(granted(&sid, None), at);
            at += CUTOFF;
            f.proposer.on_deadline(at).unwrap();
        }
        let refused = SuggestionId::new(2, "p");
        for _ in 0..6 {
            f.proposer.handle_nack(
                Nack {
                    current_sid: refused.clone(),
                    last_granted_sid: SuggestionId::new(7, "other"),
                },
                at,
            );
        }
        at += CUTOFF;
        f.proposer.on_deadline(at).unwrap();

        let requests: Vec<SuggestionId> = drain(&f.acceptors[0])
            .into_iter()
            .filter(|m| m.case() == Case::PermitRequest)
            .map(|m| m.into_permit_request().unwrap().sid)
            .collect();

        assert!(requests.len() >= 4);
        for pair in requests.windows(2) {
            assert!(pair[1] > pair[0], "{} then {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn grants_for_a_closed_round_are_dropped() {
        let mut f = fixture();
        f.proposer.send_first_permission_request(f.start).unwrap();
        for rx in &f.acceptors {
            drain(rx);
        }

        let sid = SuggestionId::initial("p");
        f.proposer.handle_permit_granted(granted(&sid, None), f.start);
        f.proposer.on_deadline(f.start + CUTOFF).unwrap();
        for rx in &f.acceptors {
            drain(rx);
        }

        // A full majority arrives, but the round is long over.
        let late = f.start + CUTOFF + Duration::from_millis(5);
        for _ in 0..6 {
            f.proposer.handle_permit_granted(granted(&sid, None), late);
        }
        f.proposer.on_deadline(late + CUTOFF).unwrap();

        for rx in &f.acceptors {
            let cases: Vec<Case> = drain(rx).iter().map(|m| m.case()).collect();
            assert!(!cases.contains(&Case::Suggestion));
        }
    }

    #[test]
    fn success_terminates_the_round_loop() {
        let mut f = fixture();
        f.proposer.send_first_permission_request(f.start).unwrap();
        for rx in &f.acceptors {
            drain(rx);
        }

        f.proposer.handle_success();

        // Neither a starved round nor an explicit kick produces any traffic afterwards.
        f.proposer.on_deadline(f.start + CUTOFF).unwrap();
        f.proposer
            .send_first_permission_request(f.start + CUTOFF)
            .unwrap();

        assert_eq!(f.proposer.next_deadline(), None);
        for rx in &f.acceptors {
            assert!(drain(rx).is_empty());
        }
    }
}
