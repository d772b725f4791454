extern crate bincode;
extern crate config;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate net2;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate thiserror;
extern crate toml;
extern crate uuid;

pub mod acceptor;
pub mod api;
pub mod batch;
pub mod configurations;
pub mod error;
pub mod instance;
pub mod learner;
pub mod message;
pub mod net_node;
pub mod node;
pub mod proposer;
pub mod registry;
pub mod retry;
pub mod storage;
pub mod suggestion_id;
