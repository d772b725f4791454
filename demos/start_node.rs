//! A script used to start one node of a UDP cluster, which will take part in the agreement until
//! it is killed.
//!
//! You can run this example as follows
//!     RUST_LOG=classic_paxos=info cargo run --example start_node -- <uid> Config
//! where <uid> is one of the uids listed in the [peers] section of the configuration file.

extern crate classic_paxos;
extern crate env_logger;
#[macro_use]
extern crate log;

use std::env;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use classic_paxos::api::AgreementApi;
use classic_paxos::configurations::get_cluster_config;
use classic_paxos::error::PaxosError;
use classic_paxos::net_node;
use classic_paxos::node::Node;
use classic_paxos::retry::ExponentialBackoff;
use classic_paxos::storage::MemoryStorage;

struct ClusterApi;

impl AgreementApi<String> for ClusterApi {
    fn get_first_suggestion_value(&self, uid: &str) -> String {
        format!("value-of-{}", uid)
    }

    fn stringify_value(&self, value: &String) -> String {
        value.clone()
    }

    fn declare_final_value(&self, value: &String) -> Result<(), PaxosError> {
        println!("{}", value);
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    info!("{:?}", args);

    match args.len() {
        3 => {
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

            let node = Node::new(
                uid,
                cluster.settings,
                transport,
                Arc::new(MemoryStorage::new()),
                Arc::new(ClusterApi),
                Box::new(ExponentialBackoff::new()),
            );

            let _handle = match node.setup_bindings() {
                Ok(handle) => handle,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return;
                }
            };

            info!("Node {} is up.", uid);

            loop {
                thread::sleep(Duration::from_secs(60));
            }
        }
        _ => {
            panic!("Expected 2 arguments (excluding file name)");
        }
    }
}
