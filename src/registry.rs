//! A module which contains the in-process transport: a registry mapping each participant uid to
//! its inbound channels, plus a decorator which destabilizes deliveries in order to exercise the
//! algorithm under lossy and slow networks.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::api::Transport;
use crate::error::PaxosError;
use crate::message::Message;

/// An in-process transport. Participants subscribe their uid once at startup; the registry keeps
/// one list of sinks per uid and never removes an entry mid-run, so a broadcast always reaches
/// every participant which ever subscribed, the sender included.
pub struct ParticipantRegistry<T> {
    sinks: Mutex<HashMap<String, Vec<Sender<Message<T>>>>>,

    error_sinks: Mutex<Vec<Sender<(String, String)>>>,
}

impl<T> ParticipantRegistry<T> {
    pub fn new() -> Self {
        ParticipantRegistry {
            sinks: Mutex::new(HashMap::new()),
            error_sinks: Mutex::new(Vec::new()),
        }
    }

    /// The uids of every registered participant.
    pub fn participants(&self) -> Vec<String> {
        match self.sinks.lock() {
            Ok(sinks) => sinks.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// A stream of `(uid, error)` pairs reported through `send_error_stack`.
    pub fn subscribe_errors(&self) -> Receiver<(String, String)> {
        let (tx, rx) = channel();
        if let Ok(mut error_sinks) = self.error_sinks.lock() {
            error_sinks.push(tx);
        }
        rx
    }

    /// Drops every sink, disconnecting all subscribed receivers. The registry is spent
    /// afterwards; this is the end-of-run teardown, not a mid-run operation.
    pub fn shutdown(&self) {
        if let Ok(mut sinks) = self.sinks.lock() {
            sinks.clear();
        }
        if let Ok(mut error_sinks) = self.error_sinks.lock() {
            error_sinks.clear();
        }
    }
}

impl<T> ParticipantRegistry<T>
where
    T: Clone,
{
    fn deliver(&self, target_uid: &str, m: &Message<T>) -> Result<(), PaxosError> {
        let mut sinks = self
            .sinks
            .lock()
            .map_err(|_| PaxosError::Transport("registry mutex poisoned".to_owned()))?;

        match sinks.get_mut(target_uid) {
            Some(targets) => {
                // A sink whose receiver has gone away is dropped from the list; the remaining
                // ones still get the message.
                targets.retain(|tx| tx.send(m.clone()).is_ok());
                Ok(())
            }
            None => Err(PaxosError::Transport(format!(
                "no participant registered for uid {}",
                target_uid
            ))),
        }
    }
}

impl<T> Default for ParticipantRegistry<T> {
    fn default() -> Self {
        ParticipantRegistry::new()
    }
}

impl<T> Transport<T> for ParticipantRegistry<T>
where
    T: Clone + Send,
{
    fn receive_message(&self, uid: &str) -> Result<Receiver<Message<T>>, PaxosError> {
        let (tx, rx) = channel();
        let mut sinks = self
            .sinks
            .lock()
            .map_err(|_| PaxosError::Transport("registry mutex poisoned".to_owned()))?;
        sinks.entry(uid.to_owned()).or_insert_with(Vec::new).push(tx);
        Ok(rx)
    }

    fn send_message(&self, target_uid: &str, m: Message<T>) -> Result<(), PaxosError> {
        self.deliver(target_uid, &m)
    }

    fn broadcast_message(&self, m: Message<T>) -> Result<(), PaxosError> {
        for uid in self.participants() {
            self.deliver(&uid, &m)?;
        }
        Ok(())
    }

    fn send_error_stack(&self, uid: &str, err: &PaxosError) -> Result<(), PaxosError> {
        error!("[{}] {}", uid, err);

        let mut error_sinks = self
            .error_sinks
            .lock()
            .map_err(|_| PaxosError::Transport("registry mutex poisoned".to_owned()))?;
        error_sinks.retain(|tx| tx.send((uid.to_owned(), err.to_string())).is_ok());
        Ok(())
    }
}

/// A transport decorator which randomly drops a fraction of deliveries and delays the rest, each
/// recipient rolled independently. A dropped delivery is reported as a success to the caller,
/// exactly like a message lost in a partition.
pub struct UnreliableTransport<T> {
    registry: Arc<ParticipantRegistry<T>>,

    drop_probability: f64,

    min_delay: Duration,

    max_delay: Duration,
}

impl<T> UnreliableTransport<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(
        registry: Arc<ParticipantRegistry<T>>,
        drop_probability: f64,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        UnreliableTransport {
            registry,
            drop_probability,
            min_delay,
            max_delay,
        }
    }

    fn deliver_eventually(&self, target_uid: &str, m: Message<T>) {
        let mut rng = rand::thread_rng();

        if rng.gen_bool(self.drop_probability) {
            if log_enabled!(log::Level::Debug) {
                debug!("[unreliable] dropped a {:?} for {}", m.case(), target_uid);
            }
            return;
        }

        let delay = if self.max_delay > self.min_delay {
            rng.gen_range(self.min_delay.as_millis() as u64, self.max_delay.as_millis() as u64)
        } else {
            self.min_delay.as_millis() as u64
        };

        let registry = self.registry.clone();
        let target_uid = target_uid.to_owned();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay));
            // The recipient may be gone by the time the delay elapsed. That is just a slow
            // message arriving after the run; nobody is left to care.
            let _ = registry.send_message(&target_uid, m);
        });
    }
}

impl<T> Transport<T> for UnreliableTransport<T>
where
    T: Clone + Send + 'static,
{
    fn receive_message(&self, uid: &str) -> Result<Receiver<Message<T>>, PaxosError> {
        self.registry.receive_message(uid)
    }

    fn send_message(&self, target_uid: &str, m: Message<T>) -> Result<(), PaxosError> {
        self.deliver_eventually(target_uid, m);
        Ok(())
    }

    fn broadcast_message(&self, m: Message<T>) -> Result<(), PaxosError> {
        for uid in self.registry.participants() {
            self.deliver_eventually(&uid, m.clone());
        }
        Ok(())
    }

    fn send_error_stack(&self, uid: &str, err: &PaxosError) -> Result<(), PaxosError> {
        self.registry.send_error_stack(uid, err)
    }
}
