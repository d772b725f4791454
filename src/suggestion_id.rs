//! A module which contains the definition of the suggestion id, the proposal number of the Paxos
//! algorithm, together with the record an acceptor keeps about the suggestion it last accepted.

use std::cmp::Ordering;
use std::fmt;

/// The Paxos proposal number. Suggestion ids are ordered pairs: the `integer` component is a round
/// counter which a proposer advances monotonically, and the `id` component breaks ties between
/// proposers which happen to pick the same round. As long as no two proposers share an `id` (the
/// node uid is used for it), no two distinct proposers can ever emit equal suggestion ids.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuggestionId {
    // The monotonically advancing round counter.
    pub integer: i64,

    // The tie-breaking identifier of the proposer which emitted this suggestion id.
    pub id: String,
}

impl SuggestionId {
    pub fn new(integer: i64, id: &str) -> Self {
        SuggestionId {
            integer,
            id: id.to_owned(),
        }
    }

    /// The suggestion id a proposer uses for its very first round.
    pub fn initial(id: &str) -> Self {
        SuggestionId::new(0, id)
    }

    /// The suggestion id for the round after this one. The result is strictly greater than `self`
    /// and carries the same tie-breaking identifier.
    pub fn increment(&self) -> Self {
        SuggestionId {
            integer: self.integer + 1,
            id: self.id.clone(),
        }
    }

    /// A textual key for this suggestion id, used to group messages which belong to the same
    /// round. The integer part contains no `@`, so distinct suggestion ids always map to distinct
    /// keys.
    pub fn to_key(&self) -> String {
        format!("{}@{}", self.integer, self.id)
    }
}

// The total order: first by round counter, then lexicographically by the tie-breaking identifier.
impl Ord for SuggestionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.integer
            .cmp(&other.integer)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for SuggestionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SuggestionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

/// The record of the suggestion an acceptor most recently accepted: the suggestion id and the
/// value it carried. Acceptors persist this record before emitting the corresponding acceptance.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LastAccepted<T> {
    pub sid: SuggestionId,

    pub value: T,
}

impl<T> LastAccepted<T> {
    pub fn new(sid: SuggestionId, value: T) -> Self {
        LastAccepted { sid, value }
    }
}
