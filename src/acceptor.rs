//! The module that contains the struct representing the acceptor (the voter) of the classic Paxos
//! algorithm: the role which grants or refuses permission to suggest, and which accepts or refuses
//! suggested values, against its two durable records.

use std::fmt::Debug;
use std::sync::Arc;

use log::Level;

use crate::api::{StableStorage, Transport};
use crate::error::PaxosError;
use crate::message::{Acceptance, Message, Nack, PermitGranted, PermitRequest, Suggestion};
use crate::suggestion_id::LastAccepted;

/// The struct representing the acceptor in the Paxos algorithm. All of its decisions are taken
/// against the persisted `last_granted` and `last_accepted` records, and each record is persisted
/// before the corresponding response leaves the node, so a crash can lose responses but never
/// promises.
pub struct Acceptor<T> {
    uid: String,

    storage: Arc<dyn StableStorage<T>>,

    transport: Arc<dyn Transport<T>>,
}

impl<T> Acceptor<T>
where
    T: Clone + Debug,
{
    pub fn new(
        uid: &str,
        storage: Arc<dyn StableStorage<T>>,
        transport: Arc<dyn Transport<T>>,
    ) -> Self {
        Acceptor {
            uid: uid.to_owned(),
            storage,
            transport,
        }
    }

    // Handlers

    /// Handles a PermitRequest message sent by a proposer to this acceptor. Permission is granted
    /// only to a suggestion id strictly above the last granted one; the grant is persisted first,
    /// then the proposer gets a direct reply carrying the last accepted record.
    pub fn handle_permit_request(&mut self, request: PermitRequest) -> Result<(), PaxosError> {
        if log_enabled!(Level::Info) {
            info!("[A={}] I will handle {:?}.", self.uid, request);
        }

        let last_granted = self.storage.get_last_granted_suggestion_id(&self.uid)?;

        match last_granted {
            Some(granted) if request.sid <= granted => {
                let m = Message::Nack(Nack {
                    current_sid: request.sid,
                    last_granted_sid: granted,
                });

                if log_enabled!(Level::Info) {
                    info!("[A={}] I will send {:?}.", self.uid, m);
                }

                self.transport.send_message(&request.sender_id, m)
            }
            _ => {
                self.storage
                    .store_last_granted_suggestion_id(&self.uid, &request.sid)?;

                let last_accepted = self.storage.get_last_accepted_data(&self.uid)?;
                let m = Message::PermitGranted(PermitGranted {
                    sid: request.sid,
                    last_accepted,
                });

                if log_enabled!(Level::Info) {
                    info!("[A={}] I will send {:?}.", self.uid, m);
                }

                self.transport.send_message(&request.sender_id, m)
            }
        }
    }

    /// Handles a Suggestion message sent by a proposer to this acceptor. A suggestion id equal to
    /// the last granted one is still acceptable; only a strictly lower one is refused. The
    /// accepted record is persisted first, then the acceptance is broadcast so every learner can
    /// count it.
    pub fn handle_suggestion(&mut self, suggestion: Suggestion<T>) -> Result<(), PaxosError> {
        if log_enabled!(Level::Info) {
            info!("[A={}] I will handle {:?}.", self.uid, suggestion);
        }

        let last_granted = self.storage.get_last_granted_suggestion_id(&self.uid)?;

        match last_granted {
            Some(granted) if suggestion.sid < granted => {
                let m = Message::Nack(Nack {
                    current_sid: suggestion.sid,
                    last_granted_sid: granted,
                });

                if log_enabled!(Level::Info) {
                    info!("[A={}] I will send {:?}.", self.uid, m);
                }

                self.transport.send_message(&suggestion.sender_id, m)
            }
            _ => {
                let accepted =
                    LastAccepted::new(suggestion.sid.clone(), suggestion.value.clone());
                self.storage.store_last_accepted_data(&self.uid, &accepted)?;

                let m = Message::Acceptance(Acceptance {
                    sid: suggestion.sid,
                    value: suggestion.value,
                });

                if log_enabled!(Level::Info) {
                    info!("[A={}] I will send {:?}.", self.uid, m);
                }

                self.transport.broadcast_message(m)
            }
        }
    }
}
