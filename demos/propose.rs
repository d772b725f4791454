//! A script used to join a UDP cluster and inject proposal values interactively: every line read
//! from the standard input becomes this node's free value, and a decision round is kicked for it.
//! If more than two command-line arguments are passed, the 3rd, 4th, etc., arguments are used as
//! the proposal values instead.
//!
//! You can run this example as follows
//!     RUST_LOG=classic_paxos=info cargo run --example propose -- <uid> Config
//! to provide one proposal at a time, or
//!     RUST_LOG=classic_paxos=info cargo run --example propose -- <uid> Config p1 p2 ...
//! where p1, p2, etc., are the proposal values.

extern crate classic_paxos;
extern crate env_logger;
#[macro_use]
extern crate log;
#[macro_use]
extern crate text_io;

use std::env;
use std::io;
use std::io::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use classic_paxos::api::AgreementApi;
use classic_paxos::configurations::get_cluster_config;
use classic_paxos::error::PaxosError;
use classic_paxos::net_node;
use classic_paxos::node::Node;
use classic_paxos::retry::ExponentialBackoff;
use classic_paxos::storage::MemoryStorage;

/// The free value of this node is whatever was typed last.
struct CommandApi {
    value: Mutex<String>,
}

impl CommandApi {
    fn set_value(&self, value: String) {
        if let Ok(mut current) = self.value.lock() {
            *current = value;
        }
    }
}

impl AgreementApi<String> for CommandApi {
    fn get_first_suggestion_value(&self, _uid: &str) -> String {
        match self.value.lock() {
            Ok(value) => value.clone(),
            Err(_) => String::new(),
        }
    }

    fn stringify_value(&self, value: &String) -> String {
        value.clone()
    }

    fn declare_final_value(&self, value: &String) -> Result<(), PaxosError> {
        println!("decided: {}", value);
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    info!("{:?}", args);

    match args.len() {
        len if len >= 3 => {
            let uid = &args[1];
            let config_file_name = &args[2];

            let cluster = match get_cluster_config(config_file_name) {
                Ok(cluster) => cluster,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return;
                }
            };

            let transport = match net_node::from_cluster_config::<String>(&cluster) {
                Ok(transport) => transport,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return;
                }
            };

            let api = Arc::new(CommandApi {
                value: Mutex::new(String::new()),
            });

            let node = Node::new(
                uid,
                cluster.settings,
                transport,
                Arc::new(MemoryStorage::new()),
                api.clone(),
                Box::new(ExponentialBackoff::new()),
            );

            let handle = match node.setup_bindings() {
                Ok(handle) => handle,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return;
                }
            };

            if len == 3 {
                loop {
                    print!("Enter the proposal: ");
                    io::stdout().flush().ok().expect("Could not flush stdout"); // print! is not very clever.
                    let value: String = read!();
                    api.set_value(value);
                    handle.commence_decision_process();
                }
            } else {
                for proposal in args.iter().skip(3) {
                    api.set_value(proposal.clone());
                    handle.commence_decision_process();
                    // Give the round a moment; a single decree only ever decides once anyway.
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
        _ => {
            panic!("Expected 2 arguments (excluding file name)");
        }
    }
}
