//! An example which runs one agreement instance locally (on one machine), over the in-process
//! transport.
//!
//! Run this example as follows
//!     RUST_LOG=classic_paxos=info cargo run --example simulate
//! or pass a configuration file name to override the defaults
//!     RUST_LOG=classic_paxos=info cargo run --example simulate -- Config

extern crate classic_paxos;
extern crate env_logger;
#[macro_use]
extern crate log;

use std::env;
use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use classic_paxos::api::AgreementApi;
use classic_paxos::configurations::Settings;
use classic_paxos::error::PaxosError;
use classic_paxos::instance::Instance;

/// Every proposer suggests a value derived from its own uid; the instance has to make the
/// cluster settle on exactly one of them.
struct SimulationApi {
    declarations: Mutex<Sender<String>>,
}

impl AgreementApi<String> for SimulationApi {
    fn get_first_suggestion_value(&self, uid: &str) -> String {
        format!("value-of-{}", uid)
    }

    fn stringify_value(&self, value: &String) -> String {
        value.clone()
    }

    fn declare_final_value(&self, value: &String) -> Result<(), PaxosError> {
        println!("{}", value);
        self.declarations
            .lock()
            .map_err(|_| PaxosError::Api("declaration channel poisoned".to_owned()))?
            .send(value.clone())
            .map_err(|_| PaxosError::Api("nobody is listening for declarations".to_owned()))
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let settings = match args.get(1) {
        Some(file_name) => match Settings::from_file(file_name) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Error: {}", e);
                return;
            }
        },
        None => Settings {
            quorum_size: 5,
            take_cutoff_ms: 100,
            delay_before_claiming_leadership_ms: 1000,
        },
    };

    match settings.to_toml() {
        Ok(rendered) => info!("Configurations:\n{}", rendered),
        Err(e) => eprintln!("Error: {}", e),
    }

    let (tx, rx) = channel();
    let api = Arc::new(SimulationApi {
        declarations: Mutex::new(tx),
    });

    let mut instance = Instance::new(settings.clone(), api);
    for _ in 0..settings.quorum_size {
        match instance.spawn_node() {
            Ok(uid) => info!("Spawned the node {}.", uid),
            Err(e) => {
                eprintln!("Error: {}", e);
                return;
            }
        }
    }

    instance.commence_decision_process();

    // One declaration per learner, or a livelocked run; classic Paxos promises no better.
    let mut declared = Vec::new();
    while declared.len() < settings.quorum_size {
        match rx.recv_timeout(Duration::from_secs(10)) {
            Ok(value) => declared.push(value),
            Err(_) => break,
        }
    }

    instance.dispose();

    if declared.is_empty() {
        println!("No value was declared within the wait; the run livelocked.");
    } else {
        info!(
            "{} of {} learners declared; every declaration was {:?}.",
            declared.len(),
            settings.quorum_size,
            declared[0]
        );
    }
}
