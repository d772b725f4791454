//! A module which contains a transport which moves messages between participants using UDP
//! sockets: unicast sends go to the socket address registered for the target uid, broadcasts to
//! a multicast group which every participant joins.

use std::collections::HashMap;
use std::fmt::Debug;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use bincode::{deserialize, serialize};
use net2::UdpBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::Transport;
use crate::error::PaxosError;
use crate::message::Message;

// Larger than any message the library emits for reasonably sized values; a datagram cannot carry
// more than this anyway.
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// A transport backed by UDP. Directed messages are sent to the unicast address of the target
/// uid; broadcasts are sent once, to the multicast group. Subscribing a uid binds its unicast
/// address and joins the group, so a participant hears both kinds of traffic on one stream.
///
/// UDP keeps none of its promises: datagrams can vanish, duplicate or arrive reordered. The
/// algorithm tolerates all of that, which is exactly why this transport can afford to be this
/// simple.
pub struct UdpTransport<T> {
    multicast_address: SocketAddrV4,

    peers: HashMap<String, SocketAddrV4>,

    sender_socket: UdpSocket,

    value: std::marker::PhantomData<fn() -> T>,
}

impl<T> UdpTransport<T>
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    /// Creates the transport for a cluster laid out as the given peer table. The sender socket
    /// binds to an ephemeral port; multicast loopback is enabled so that a node also receives
    /// its own broadcasts, like every other participant does.
    pub fn new(
        multicast_address: SocketAddrV4,
        peers: HashMap<String, SocketAddrV4>,
    ) -> Result<Self, PaxosError> {
        let sender_socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| PaxosError::Transport(format!("could not bind the sender socket: {}", e)))?;
        sender_socket
            .set_multicast_loop_v4(true)
            .map_err(|e| PaxosError::Transport(format!("could not enable multicast loop: {}", e)))?;

        Ok(UdpTransport {
            multicast_address,
            peers,
            sender_socket,
            value: std::marker::PhantomData,
        })
    }

    fn address_of(&self, uid: &str) -> Result<SocketAddrV4, PaxosError> {
        self.peers.get(uid).cloned().ok_or_else(|| {
            PaxosError::Config(format!("uid {} has no address in the peer table", uid))
        })
    }

    fn send_to(&self, m: &Message<T>, address: &SocketAddrV4) -> Result<(), PaxosError> {
        let encoded: Vec<u8> = serialize(m)
            .map_err(|e| PaxosError::Transport(format!("could not serialize the message: {}", e)))?;

        self.sender_socket
            .send_to(&encoded[..], address)
            .map_err(|e| PaxosError::Transport(format!("could not send to {}: {}", address, e)))?;
        Ok(())
    }

    /// Binds the socket every participant shares the port of: the multicast group receiver.
    fn bind_multicast_receiver(&self) -> Result<UdpSocket, PaxosError> {
        let socket = UdpBuilder::new_v4()
            .map_err(|e| PaxosError::Transport(format!("could not construct the builder: {}", e)))?
            // Multiple sockets of this process group bind the same multicast address.
            .reuse_address(true)
            .map_err(|e| PaxosError::Transport(format!("could not reuse the address: {}", e)))?
            .bind(&self.multicast_address)
            .map_err(|e| {
                PaxosError::Transport(format!(
                    "could not bind {}: {}",
                    self.multicast_address, e
                ))
            })?;

        socket
            .join_multicast_v4(self.multicast_address.ip(), &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| PaxosError::Transport(format!("could not join the group: {}", e)))?;
        Ok(socket)
    }

    /// Reads datagrams off the socket forever, forwarding every decodable message. A datagram
    /// which does not decode is reported and dropped; a transport cannot do better than that.
    fn pump_socket(uid: String, socket: UdpSocket, tx: Sender<Message<T>>) {
        thread::spawn(move || {
            let mut buffer = vec![0; MAX_DATAGRAM_SIZE];
            loop {
                let (read, _source) = match socket.recv_from(&mut buffer) {
                    Ok(received) => received,
                    Err(e) => {
                        error!("[{}] The receiver socket failed: {}.", uid, e);
                        return;
                    }
                };

                match deserialize::<Message<T>>(&buffer[..read]) {
                    Ok(m) => {
                        if tx.send(m).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        error!("[{}] Discarding an undecodable datagram: {}.", uid, e);
                    }
                }
            }
        });
    }
}

impl<T> Transport<T> for UdpTransport<T>
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    fn receive_message(&self, uid: &str) -> Result<Receiver<Message<T>>, PaxosError> {
        let unicast_address = self.address_of(uid)?;
        let unicast_socket = UdpSocket::bind(unicast_address).map_err(|e| {
            PaxosError::Transport(format!("could not bind {}: {}", unicast_address, e))
        })?;
        let multicast_socket = self.bind_multicast_receiver()?;

        let (tx, rx) = channel();
        Self::pump_socket(uid.to_owned(), unicast_socket, tx.clone());
        Self::pump_socket(uid.to_owned(), multicast_socket, tx);
        Ok(rx)
    }

    fn send_message(&self, target_uid: &str, m: Message<T>) -> Result<(), PaxosError> {
        let address = self.address_of(target_uid)?;
        self.send_to(&m, &address)
    }

    fn broadcast_message(&self, m: Message<T>) -> Result<(), PaxosError> {
        self.send_to(&m, &self.multicast_address)
    }

    fn send_error_stack(&self, uid: &str, err: &PaxosError) -> Result<(), PaxosError> {
        // There is no remote end interested in another process' errors; the log is the error
        // stream of a UDP participant.
        error!("[{}] {}", uid, err);
        Ok(())
    }
}

/// Builds the transport straight from a cluster configuration.
pub fn from_cluster_config<T>(
    cluster: &crate::configurations::ClusterConfig,
) -> Result<Arc<UdpTransport<T>>, PaxosError>
where
    T: Serialize + DeserializeOwned + Clone + Debug + Send + 'static,
{
    Ok(Arc::new(UdpTransport::new(
        cluster.multicast_address,
        cluster.peers.clone(),
    )?))
}
