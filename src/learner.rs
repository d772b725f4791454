//! The module that contains the struct representing the learner (the arbiter) of the classic
//! Paxos algorithm: the role which counts acceptances and declares the final value once a
//! majority of them agree on the same suggestion id and value.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use log::Level;

use crate::api::{AgreementApi, Transport};
use crate::error::PaxosError;
use crate::message::{Acceptance, Message, Success};

/// The struct representing the learner in the Paxos algorithm. Acceptances are grouped by the
/// pair of their suggestion id and the textual rendering of their value; the rendering stands in
/// for equality, since the value type is opaque to the node.
pub struct Learner<T> {
    uid: String,

    majority: usize,

    transport: Arc<dyn Transport<T>>,

    api: Arc<dyn AgreementApi<T>>,

    // How many acceptances were counted per (suggestion id key, value rendering) pair.
    counts: HashMap<(String, String), usize>,

    declared: bool,
}

impl<T> Learner<T>
where
    T: Clone + Debug,
{
    pub fn new(
        uid: &str,
        majority: usize,
        transport: Arc<dyn Transport<T>>,
        api: Arc<dyn AgreementApi<T>>,
    ) -> Self {
        Learner {
            uid: uid.to_owned(),
            majority,
            transport,
            api,
            counts: HashMap::new(),
            declared: false,
        }
    }

    /// Whether this learner has already declared a final value.
    pub fn has_declared(&self) -> bool {
        self.declared
    }

    /// Handles an Acceptance message broadcast by an acceptor. The first group of identical
    /// acceptances to reach a majority wins: the value is declared against the agreement api
    /// exactly once, and a Success is broadcast to shut down the proposers' retry loops.
    pub fn handle_acceptance(&mut self, acceptance: Acceptance<T>) -> Result<(), PaxosError> {
        if self.declared {
            return Ok(());
        }

        if log_enabled!(Level::Info) {
            info!("[L={}] I will handle {:?}.", self.uid, acceptance);
        }

        let key = (
            acceptance.sid.to_key(),
            self.api.stringify_value(&acceptance.value),
        );
        let count = self.counts.entry(key).or_insert(0);
        *count += 1;

        if *count < self.majority {
            return Ok(());
        }

        self.declared = true;

        if log_enabled!(Level::Info) {
            info!(
                "[L={}] A majority accepted {:?} under {}, declaring it final.",
                self.uid, acceptance.value, acceptance.sid
            );
        }

        if let Err(e) = self.api.declare_final_value(&acceptance.value) {
            // Not retried: if the declaration must survive failures, the api has to make it
            // idempotent and durable on its side.
            error!("[L={}] Could not declare the final value: {}.", self.uid, e);
        }

        let m = Message::Success(Success {
            value: acceptance.value,
        });
        self.transport.broadcast_message(m)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::Receiver;
    use std::sync::{Arc, Mutex};

    use super::Learner;
    use crate::api::{AgreementApi, Transport};
    use crate::error::PaxosError;
    use crate::message::{Acceptance, Case, Message};
    use crate::registry::ParticipantRegistry;
    use crate::suggestion_id::SuggestionId;

    struct RecordingApi {
        declared: Arc<Mutex<Vec<u32>>>,
        fail_declaration: bool,
    }

    impl AgreementApi<u32> for RecordingApi {
        fn get_first_suggestion_value(&self, _uid: &str) -> u32 {
            0
        }

        fn stringify_value(&self, value: &u32) -> String {
            value.to_string()
        }

        fn declare_final_value(&self, value: &u32) -> Result<(), PaxosError> {
            self.declared.lock().unwrap().push(*value);
            if self.fail_declaration {
                Err(PaxosError::Api("observer went away".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        learner: Learner<u32>,
        declared: Arc<Mutex<Vec<u32>>>,
        inbox: Receiver<Message<u32>>,
    }

    fn fixture_with(majority: usize, fail_declaration: bool) -> Fixture {
        let registry: Arc<ParticipantRegistry<u32>> = Arc::new(ParticipantRegistry::new());
        let inbox = registry.receive_message("l").unwrap();
        let declared = Arc::new(Mutex::new(Vec::new()));
        let api = Arc::new(RecordingApi {
            declared: declared.clone(),
            fail_declaration,
        });
        let learner = Learner::new("l", majority, registry, api);
        Fixture {
            learner,
            declared,
            inbox,
        }
    }

    fn acceptance(integer: i64, id: &str, value: u32) -> Acceptance<u32> {
        Acceptance {
            sid: SuggestionId::new(integer, id),
            value,
        }
    }

    #[test]
    fn declares_once_a_majority_of_identical_acceptances_arrived() {
        let mut f = fixture_with(3, false);

        f.learner.handle_acceptance(acceptance(1, "p", 42)).unwrap();
        f.learner.handle_acceptance(acceptance(1, "p", 42)).unwrap();
        assert!(!f.learner.has_declared());

        f.learner.handle_acceptance(acceptance(1, "p", 42)).unwrap();

        assert!(f.learner.has_declared());
        assert_eq!(*f.declared.lock().unwrap(), vec![42]);
        let success = f.inbox.try_recv().unwrap().into_success().unwrap();
        assert_eq!(success.value, 42);
    }

    #[test]
    fn declares_at_most_once() {
        let mut f = fixture_with(2, false);

        for _ in 0..5 {
            f.learner.handle_acceptance(acceptance(1, "p", 42)).unwrap();
        }

        assert_eq!(f.declared.lock().unwrap().len(), 1);
        assert_eq!(Case::Success.count_in(&[f.inbox.try_recv().unwrap()]), 1);
        assert!(f.inbox.try_recv().is_err());
    }

    #[test]
    fn acceptances_under_different_sids_do_not_combine() {
        let mut f = fixture_with(3, false);

        f.learner.handle_acceptance(acceptance(1, "p", 42)).unwrap();
        f.learner.handle_acceptance(acceptance(2, "p", 42)).unwrap();
        f.learner.handle_acceptance(acceptance(3, "p", 42)).unwrap();

        assert!(!f.learner.has_declared());
        assert!(f.declared.lock().unwrap().is_empty());
    }

    #[test]
    fn acceptances_with_different_values_do_not_combine() {
        let mut f = fixture_with(3, false);

        f.learner.handle_acceptance(acceptance(1, "p", 42)).unwrap();
        f.learner.handle_acceptance(acceptance(1, "p", 43)).unwrap();
        f.learner.handle_acceptance(acceptance(1, "p", 42)).unwrap();

        assert!(!f.learner.has_declared());
    }

    #[test]
    fn a_failing_declaration_is_not_retried_and_success_still_goes_out() {
        let mut f = fixture_with(1, true);

        f.learner.handle_acceptance(acceptance(1, "p", 9)).unwrap();
        f.learner.handle_acceptance(acceptance(1, "p", 9)).unwrap();

        assert_eq!(f.declared.lock().unwrap().len(), 1);
        assert_eq!(f.inbox.try_recv().unwrap().case(), Case::Success);
        assert!(f.inbox.try_recv().is_err());
    }
}
