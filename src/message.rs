//! A module which contains the definition of the messages which nodes taking part in an instance
//! of the classic Paxos algorithm exchange.

use crate::error::PaxosError;
use crate::suggestion_id::{LastAccepted, SuggestionId};

/// An enum which contains all types of messages which nodes, in the Paxos algorithm, can exchange.
/// Every variant wraps the payload struct of the corresponding case.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Message<T> {
    PermitRequest(PermitRequest),
    PermitGranted(PermitGranted<T>),
    Suggestion(Suggestion<T>),
    Acceptance(Acceptance<T>),
    Success(Success<T>),
    Nack(Nack),
}

/// The tag of a message, without its payload.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Case {
    PermitRequest,
    PermitGranted,
    Suggestion,
    Acceptance,
    Success,
    Nack,
}

/// A proposer asks all acceptors for the permission to suggest a value under the given suggestion
/// id. Broadcast at the start of every round.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PermitRequest {
    // The unique identifier of the proposer which asks for permission. Acceptors reply directly
    // to this node.
    pub sender_id: String,

    pub sid: SuggestionId,
}

/// An acceptor grants the permission asked for in a permit request. The reply carries the record
/// of the suggestion the acceptor last accepted, if any, so that the proposer can honor it when
/// picking the value to suggest.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PermitGranted<T> {
    pub sid: SuggestionId,

    pub last_accepted: Option<LastAccepted<T>>,
}

/// A proposer, which collected the permission of a majority of acceptors, suggests a value under
/// the suggestion id the permission was granted for. Broadcast to all acceptors.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Suggestion<T> {
    pub sender_id: String,

    pub sid: SuggestionId,

    pub value: T,
}

/// An acceptor accepted a suggestion. Broadcast so that every learner can count it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Acceptance<T> {
    pub sid: SuggestionId,

    pub value: T,
}

/// A learner witnessed a majority of identical acceptances and declared the value final. This
/// message shuts down the retry loops of all proposers taking part in the instance.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Success<T> {
    pub value: T,
}

/// An acceptor refuses a permit request or a suggestion whose suggestion id is not high enough.
/// The refused node learns the suggestion id the acceptor has granted so far, and can advance
/// past it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Nack {
    // The suggestion id which was refused.
    pub current_sid: SuggestionId,

    // The highest suggestion id the refusing acceptor has granted permission to.
    pub last_granted_sid: SuggestionId,
}

impl<T> Message<T> {
    /// The tag of this message.
    pub fn case(&self) -> Case {
        match self {
            Message::PermitRequest(_) => Case::PermitRequest,
            Message::PermitGranted(_) => Case::PermitGranted,
            Message::Suggestion(_) => Case::Suggestion,
            Message::Acceptance(_) => Case::Acceptance,
            Message::Success(_) => Case::Success,
            Message::Nack(_) => Case::Nack,
        }
    }

    /// Extracts the permit request payload, or fails with a shape error if this message is tagged
    /// with a different case.
    pub fn into_permit_request(self) -> Result<PermitRequest, PaxosError> {
        match self {
            Message::PermitRequest(m) => Ok(m),
            other => Err(PaxosError::shape(Case::PermitRequest, other.case())),
        }
    }

    pub fn into_permit_granted(self) -> Result<PermitGranted<T>, PaxosError> {
        match self {
            Message::PermitGranted(m) => Ok(m),
            other => Err(PaxosError::shape(Case::PermitGranted, other.case())),
        }
    }

    pub fn into_suggestion(self) -> Result<Suggestion<T>, PaxosError> {
        match self {
            Message::Suggestion(m) => Ok(m),
            other => Err(PaxosError::shape(Case::Suggestion, other.case())),
        }
    }

    pub fn into_acceptance(self) -> Result<Acceptance<T>, PaxosError> {
        match self {
            Message::Acceptance(m) => Ok(m),
            other => Err(PaxosError::shape(Case::Acceptance, other.case())),
        }
    }

    pub fn into_success(self) -> Result<Success<T>, PaxosError> {
        match self {
            Message::Success(m) => Ok(m),
            other => Err(PaxosError::shape(Case::Success, other.case())),
        }
    }

    pub fn into_nack(self) -> Result<Nack, PaxosError> {
        match self {
            Message::Nack(m) => Ok(m),
            other => Err(PaxosError::shape(Case::Nack, other.case())),
        }
    }
}

impl Case {
    /// Whether messages of this case are handled by the proposer of a node.
    pub fn is_proposer_directed(self) -> bool {
        match self {
            Case::PermitGranted | Case::Success | Case::Nack => true,
            _ => false,
        }
    }

    /// Whether messages of this case are handled by the acceptor of a node.
    pub fn is_acceptor_directed(self) -> bool {
        match self {
            Case::PermitRequest | Case::Suggestion => true,
            _ => false,
        }
    }

    /// Whether messages of this case are handled by the learner of a node.
    pub fn is_learner_directed(self) -> bool {
        match self {
            Case::Acceptance => true,
            _ => false,
        }
    }

    /// Counts the messages of this case among the given ones.
    pub fn count_in<T>(self, messages: &[Message<T>]) -> usize {
        messages.iter().filter(|m| m.case() == self).count()
    }
}
