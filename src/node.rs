//! The module that contains the struct representing a node taking part in one instance of the
//! classic Paxos algorithm. A node aggregates one proposer, one acceptor and one learner under a
//! single uid; a worker thread feeds them the inbound messages one at a time, so the three roles
//! never observe each other mid-transition.

use std::fmt::Debug;
use std::sync::mpsc::{channel, RecvTimeoutError, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::Level;

use crate::acceptor::Acceptor;
use crate::api::{AgreementApi, StableStorage, Transport};
use crate::configurations::Settings;
use crate::error::PaxosError;
use crate::learner::Learner;
use crate::message::Message;
use crate::proposer::Proposer;
use crate::retry::RetryCoordinator;

enum NodeEvent<T> {
    Inbound(Message<T>),
    CommenceDecisionProcess,
    Shutdown,
}

/// The struct representing one participant of an agreement instance, before it is wired up.
/// Collaborators are handed over at construction; `setup_bindings` validates the configuration,
/// subscribes the uid on the transport and starts the worker.
pub struct Node<T> {
    uid: String,

    settings: Settings,

    transport: Arc<dyn Transport<T>>,

    storage: Arc<dyn StableStorage<T>>,

    api: Arc<dyn AgreementApi<T>>,

    retry: Box<dyn RetryCoordinator>,
}

impl<T> Node<T>
where
    T: Clone + Debug + Send + 'static,
{
    pub fn new(
        uid: &str,
        settings: Settings,
        transport: Arc<dyn Transport<T>>,
        storage: Arc<dyn StableStorage<T>>,
        api: Arc<dyn AgreementApi<T>>,
        retry: Box<dyn RetryCoordinator>,
    ) -> Self {
        Node {
            uid: uid.to_owned(),
            settings,
            transport,
            storage,
            api,
            retry,
        }
    }

    /// Wires the node up: validates the configuration, subscribes the inbound stream, and spawns
    /// the pump and worker threads. Consumes the node and returns the handle which controls it.
    pub fn setup_bindings(self) -> Result<NodeHandle<T>, PaxosError> {
        self.settings.validate()?;

        let inbound = self.transport.receive_message(&self.uid)?;
        let (event_tx, event_rx) = channel();

        // The pump folds the transport subscription into the worker's event queue. It lives
        // until the transport shuts down or, after disposal, until its next forward fails.
        let pump_tx = event_tx.clone();
        thread::Builder::new()
            .name(format!("paxos-pump-{}", self.uid))
            .spawn(move || {
                while let Ok(m) = inbound.recv() {
                    if pump_tx.send(NodeEvent::Inbound(m)).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| PaxosError::Config(format!("could not spawn the pump thread: {}", e)))?;

        let majority = self.api.calculate_majority(self.settings.quorum_size);
        let worker = NodeWorker {
            uid: self.uid.clone(),
            transport: self.transport.clone(),
            proposer: Proposer::new(
                &self.uid,
                majority,
                self.settings.take_cutoff(),
                self.transport.clone(),
                self.api.clone(),
                self.retry,
            ),
            acceptor: Acceptor::new(&self.uid, self.storage, self.transport.clone()),
            learner: Learner::new(&self.uid, majority, self.transport.clone(), self.api),
            events: event_rx,
            leadership_delay: self.settings.delay_before_claiming_leadership(),
        };

        let uid = self.uid;
        let worker_thread = thread::Builder::new()
            .name(format!("paxos-worker-{}", uid))
            .spawn(move || worker.run())
            .map_err(|e| PaxosError::Config(format!("could not spawn the worker thread: {}", e)))?;

        Ok(NodeHandle {
            uid,
            event_tx,
            worker: Some(worker_thread),
        })
    }
}

/// The handle controlling a running node. Dropping it disposes the node.
pub struct NodeHandle<T> {
    uid: String,

    event_tx: Sender<NodeEvent<T>>,

    worker: Option<thread::JoinHandle<()>>,
}

impl<T> NodeHandle<T> {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Asks the node's proposer to kick a round right now, without waiting for the leadership
    /// timer. The timer keeps running; calling this never disables the self-election.
    pub fn commence_decision_process(&self) {
        let _ = self.event_tx.send(NodeEvent::CommenceDecisionProcess);
    }

    /// Tears the node down and waits for its worker to finish. Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.event_tx.send(NodeEvent::Shutdown);
            let _ = worker.join();
        }
    }
}

impl<T> Drop for NodeHandle<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct NodeWorker<T> {
    uid: String,

    transport: Arc<dyn Transport<T>>,

    proposer: Proposer<T>,

    acceptor: Acceptor<T>,

    learner: Learner<T>,

    events: Receiver<NodeEvent<T>>,

    leadership_delay: Duration,
}

impl<T> NodeWorker<T>
where
    T: Clone + Debug,
{
    fn run(mut self) {
        let mut leadership_deadline = Instant::now() + self.leadership_delay;

        loop {
            let now = Instant::now();

            // Silence long enough means nobody is leading; break the symmetry by trying a round
            // of our own. The trigger is a no-op once a value was declared.
            if now >= leadership_deadline {
                if log_enabled!(Level::Info) {
                    info!(
                        "[N={}] Nothing heard for {:?}, I will claim leadership.",
                        self.uid, self.leadership_delay
                    );
                }
                let result = self.proposer.try_permission(now);
                self.report(result);
                leadership_deadline = now + self.leadership_delay;
            }

            if let Some(deadline) = self.proposer.next_deadline() {
                if deadline <= now {
                    let result = self.proposer.on_deadline(now);
                    self.report(result);
                }
            }

            let wait = self.next_wait(leadership_deadline);
            match self.events.recv_timeout(wait) {
                Ok(NodeEvent::Inbound(m)) => {
                    // Only voter- and arbiter-directed traffic counts as somebody else leading.
                    let case = m.case();
                    if case.is_acceptor_directed() || case.is_learner_directed() {
                        leadership_deadline = Instant::now() + self.leadership_delay;
                    }
                    self.dispatch(m);
                }
                Ok(NodeEvent::CommenceDecisionProcess) => {
                    let result = self.proposer.send_first_permission_request(Instant::now());
                    self.report(result);
                }
                Ok(NodeEvent::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// How long the worker may sleep before some timer needs it again.
    fn next_wait(&self, leadership_deadline: Instant) -> Duration {
        let mut deadline = leadership_deadline;
        if let Some(proposer_deadline) = self.proposer.next_deadline() {
            if proposer_deadline < deadline {
                deadline = proposer_deadline;
            }
        }
        deadline.saturating_duration_since(Instant::now())
    }

    fn dispatch(&mut self, m: Message<T>) {
        let now = Instant::now();
        match m {
            Message::PermitRequest(request) => {
                let result = self.acceptor.handle_permit_request(request);
                self.report(result);
            }
            Message::Suggestion(suggestion) => {
                let result = self.acceptor.handle_suggestion(suggestion);
                self.report(result);
            }
            Message::Acceptance(acceptance) => {
                let result = self.learner.handle_acceptance(acceptance);
                self.report(result);
            }
            Message::PermitGranted(granted) => self.proposer.handle_permit_granted(granted, now),
            Message::Nack(nack) => self.proposer.handle_nack(nack, now),
            Message::Success(_) => self.proposer.handle_success(),
        }
    }

    /// Transient failures do not stop the worker: they go to the per-uid error stream, and the
    /// next round recovers whatever a lost message cost.
    fn report(&self, result: Result<(), PaxosError>) {
        if let Err(err) = result {
            error!("[N={}] {}.", self.uid, err);
            if let Err(report_err) = self.transport.send_error_stack(&self.uid, &err) {
                error!("[N={}] Could not report the error: {}.", self.uid, report_err);
            }
        }
    }
}
