//! A module which contains the contracts each collaborator of a node implements: the transport
//! which moves messages between participants, the stable storage backing an acceptor, and the
//! client-facing agreement api.

use std::sync::mpsc::Receiver;

use crate::error::PaxosError;
use crate::message::Message;
use crate::suggestion_id::{LastAccepted, SuggestionId};

/// The contract of the message-moving collaborator. Implement this trait to take part in an
/// instance over any medium: the crate ships an in-process registry (`registry`) and a UDP
/// transport (`net_node`).
pub trait Transport<T>: Send + Sync {
    /// The inbound stream of the participant with the given uid. The stream is hot: every call
    /// registers one more sink, and a message directed at the uid is delivered to all of them.
    fn receive_message(&self, uid: &str) -> Result<Receiver<Message<T>>, PaxosError>;

    /// Sends the message m to the participant with the given uid.
    fn send_message(&self, target_uid: &str, m: Message<T>) -> Result<(), PaxosError>;

    /// Delivers the message to every registered participant, the sender included.
    fn broadcast_message(&self, m: Message<T>) -> Result<(), PaxosError>;

    /// Reports an error on the error stream of the participant with the given uid.
    fn send_error_stack(&self, uid: &str, err: &PaxosError) -> Result<(), PaxosError>;
}

/// The durable key/value slots an acceptor relies on. Both records are per uid and only ever
/// advance; an implementation does not need to defend against rollbacks, the acceptor never asks
/// for one.
pub trait StableStorage<T>: Send + Sync {
    fn get_last_granted_suggestion_id(&self, uid: &str)
        -> Result<Option<SuggestionId>, PaxosError>;

    fn store_last_granted_suggestion_id(
        &self,
        uid: &str,
        sid: &SuggestionId,
    ) -> Result<(), PaxosError>;

    fn get_last_accepted_data(&self, uid: &str) -> Result<Option<LastAccepted<T>>, PaxosError>;

    fn store_last_accepted_data(&self, uid: &str, data: &LastAccepted<T>)
        -> Result<(), PaxosError>;
}

/// The client-facing contract: where free values come from, how values are compared, and where
/// the final value goes.
pub trait AgreementApi<T>: Send + Sync {
    /// A free value, suggested by the proposer with the given uid whenever no majority of
    /// acceptors carries a previously accepted one.
    fn get_first_suggestion_value(&self, uid: &str) -> T;

    /// The number of agreeing acceptors needed to choose or to promise, out of a quorum of the
    /// given size.
    fn calculate_majority(&self, quorum_size: usize) -> usize {
        quorum_size / 2 + 1
    }

    /// Renders a value to text. Learners group acceptances by this rendering, so it must be
    /// injective: two values which render equally are treated as the same value.
    fn stringify_value(&self, value: &T) -> String;

    /// Called at most once per learner, with the value the instance agreed on. A failure is
    /// logged and never retried; idempotence is the implementer's concern.
    fn declare_final_value(&self, value: &T) -> Result<(), PaxosError>;
}
