//! Helpers shared by the integration suites: an agreement api which records every declaration,
//! and small waiting utilities built on channel timeouts.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use classic_paxos::api::AgreementApi;
use classic_paxos::error::PaxosError;
use classic_paxos::message::Message;

/// Free values are derived from the proposing uid, so a run with competing proposers has truly
/// competing values; declarations are recorded for the assertions.
pub struct RecordingApi {
    declared: Mutex<Vec<String>>,
}

// Not every suite exercises every helper; each test binary compiles its own copy of this module.
#[allow(dead_code)]
impl RecordingApi {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingApi {
            declared: Mutex::new(Vec::new()),
        })
    }

    pub fn declared(&self) -> Vec<String> {
        self.declared.lock().unwrap().clone()
    }

    pub fn free_value_of(uid: &str) -> String {
        format!("value-of-{}", uid)
    }
}

impl AgreementApi<String> for RecordingApi {
    fn get_first_suggestion_value(&self, uid: &str) -> String {
        RecordingApi::free_value_of(uid)
    }

    fn stringify_value(&self, value: &String) -> String {
        value.clone()
    }

    fn declare_final_value(&self, value: &String) -> Result<(), PaxosError> {
        self.declared.lock().unwrap().push(value.clone());
        Ok(())
    }
}

/// Blocks until the condition holds or the timeout elapses; returns whether it held.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Collects everything the receiver yields within the given window.
#[allow(dead_code)]
pub fn collect_for(rx: &Receiver<Message<String>>, window: Duration) -> Vec<Message<String>> {
    let deadline = Instant::now() + window;
    let mut messages = Vec::new();
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match rx.recv_timeout(deadline - now) {
            Ok(m) => messages.push(m),
            Err(_) => break,
        }
    }
    messages
}
