//! A module that contains the structs and functions required to read, parse and validate the
//! configuration settings from a file such as `Config.toml` at the root of this crate.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, File};

use crate::error::PaxosError;

/// The recognized agreement options. Every field has a default, so an empty file is a valid
/// configuration for a lone node.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Settings {
    // The number of acceptors in the quorum.
    #[serde(default = "default_quorum_size")]
    pub quorum_size: usize,

    // The per-round batch window, in milliseconds, for permit-granted and nack grouping.
    #[serde(default = "default_take_cutoff_ms")]
    pub take_cutoff_ms: u64,

    // How much silence, in milliseconds, a node tolerates before claiming leadership itself.
    #[serde(default = "default_delay_before_claiming_leadership_ms")]
    pub delay_before_claiming_leadership_ms: u64,
}

fn default_quorum_size() -> usize {
    1
}

fn default_take_cutoff_ms() -> u64 {
    100
}

fn default_delay_before_claiming_leadership_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            quorum_size: default_quorum_size(),
            take_cutoff_ms: default_take_cutoff_ms(),
            delay_before_claiming_leadership_ms: default_delay_before_claiming_leadership_ms(),
        }
    }
}

impl Settings {
    /// Reads the settings from the configuration file with the given name.
    pub fn from_file(file_name: &str) -> Result<Self, PaxosError> {
        let settings: Settings = read_config(file_name)?
            .try_into()
            .map_err(|e| PaxosError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Refuses settings no node can run with.
    pub fn validate(&self) -> Result<(), PaxosError> {
        if self.quorum_size == 0 {
            return Err(PaxosError::Config(
                "quorum_size must be at least 1".to_owned(),
            ));
        }
        if self.take_cutoff_ms == 0 {
            return Err(PaxosError::Config(
                "take_cutoff_ms must be nonzero, a round needs a bounded wait".to_owned(),
            ));
        }
        if self.delay_before_claiming_leadership_ms == 0 {
            return Err(PaxosError::Config(
                "delay_before_claiming_leadership_ms must be nonzero".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn take_cutoff(&self) -> Duration {
        Duration::from_millis(self.take_cutoff_ms)
    }

    pub fn delay_before_claiming_leadership(&self) -> Duration {
        Duration::from_millis(self.delay_before_claiming_leadership_ms)
    }

    /// Renders the settings in the configuration file format.
    pub fn to_toml(&self) -> Result<String, PaxosError> {
        toml::to_string(self).map_err(|e| PaxosError::Config(e.to_string()))
    }
}

/// The shape a cluster of UDP nodes is described with: the multicast group every participant
/// joins for broadcasts, and one unicast socket address per participant uid.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub settings: Settings,

    pub multicast_address: SocketAddrV4,

    pub peers: HashMap<String, SocketAddrV4>,
}

#[derive(Deserialize)]
struct RawCluster {
    transport: Option<RawTransport>,

    #[serde(default)]
    peers: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawTransport {
    multicast: String,
}

/// Reads the settings together with the UDP cluster layout from the configuration file with the
/// given name.
pub fn get_cluster_config(file_name: &str) -> Result<ClusterConfig, PaxosError> {
    let c = read_config(file_name)?;

    let settings: Settings = c
        .clone()
        .try_into()
        .map_err(|e| PaxosError::Config(e.to_string()))?;
    settings.validate()?;

    let raw: RawCluster = c.try_into().map_err(|e| PaxosError::Config(e.to_string()))?;

    let transport = raw.transport.ok_or_else(|| {
        PaxosError::Config("missing [transport] section with a multicast address".to_owned())
    })?;
    let multicast_address = parse_address(&transport.multicast)?;

    if raw.peers.is_empty() {
        return Err(PaxosError::Config(
            "missing [peers] section mapping uids to socket addresses".to_owned(),
        ));
    }

    let mut peers = HashMap::new();
    for (uid, address) in raw.peers {
        let address = parse_address(&address)?;
        peers.insert(uid, address);
    }

    Ok(ClusterConfig {
        settings,
        multicast_address,
        peers,
    })
}

fn read_config(file_name: &str) -> Result<Config, PaxosError> {
    let mut c = Config::default();
    c.merge(File::with_name(file_name))
        .map_err(|e| PaxosError::Config(e.to_string()))?;
    Ok(c)
}

fn parse_address(address: &str) -> Result<SocketAddrV4, PaxosError> {
    SocketAddrV4::from_str(address)
        .map_err(|e| PaxosError::Config(format!("bad socket address {}: {}", address, e)))
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    use super::{get_cluster_config, Settings};

    struct TempConfig {
        path: PathBuf,
        // The name `config::File::with_name` resolves, i.e. the path without the extension.
        name: String,
    }

    impl TempConfig {
        fn new(label: &str, contents: &str) -> Self {
            let mut path = env::temp_dir();
            path.push(format!("classic-paxos-{}-{}", label, std::process::id()));
            let name = path.to_str().unwrap().to_owned();
            path.set_extension("toml");
            fs::write(&path, contents).unwrap();
            TempConfig { path, name }
        }
    }

    impl Drop for TempConfig {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    #[test]
    fn an_empty_file_yields_the_defaults() {
        let file = TempConfig::new("empty", "");
        let settings = Settings::from_file(&file.name).unwrap();
        assert_eq!(settings.quorum_size, 1);
        assert_eq!(settings.take_cutoff_ms, 100);
        assert_eq!(settings.delay_before_claiming_leadership_ms, 1000);
    }

    #[test]
    fn explicit_options_are_read() {
        let file = TempConfig::new(
            "explicit",
            "quorum_size = 10\ntake_cutoff_ms = 50\ndelay_before_claiming_leadership_ms = 300\n",
        );
        let settings = Settings::from_file(&file.name).unwrap();
        assert_eq!(settings.quorum_size, 10);
        assert_eq!(settings.take_cutoff_ms, 50);
        assert_eq!(settings.delay_before_claiming_leadership_ms, 300);
    }

    #[test]
    fn a_zero_quorum_is_refused() {
        let file = TempConfig::new("zero-quorum", "quorum_size = 0\n");
        assert!(Settings::from_file(&file.name).is_err());
    }

    #[test]
    fn a_zero_cutoff_is_refused() {
        assert!(Settings {
            take_cutoff_ms: 0,
            ..Settings::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn rendered_settings_parse_back() {
        let settings = Settings {
            quorum_size: 7,
            take_cutoff_ms: 80,
            delay_before_claiming_leadership_ms: 900,
        };
        let rendered = settings.to_toml().unwrap();
        let file = TempConfig::new("rendered", &rendered);
        let read_back = Settings::from_file(&file.name).unwrap();
        assert_eq!(read_back.quorum_size, 7);
        assert_eq!(read_back.take_cutoff_ms, 80);
        assert_eq!(read_back.delay_before_claiming_leadership_ms, 900);
    }

    #[test]
    fn a_cluster_config_needs_transport_and_peers() {
        let file = TempConfig::new("no-cluster", "quorum_size = 3\n");
        assert!(get_cluster_config(&file.name).is_err());

        let file = TempConfig::new(
            "cluster",
            "quorum_size = 3\n\n[transport]\nmulticast = \"239.0.0.1:9000\"\n\n\
             [peers]\nnode-1 = \"127.0.0.1:9001\"\nnode-2 = \"127.0.0.1:9002\"\n",
        );
        let cluster = get_cluster_config(&file.name).unwrap();
        assert_eq!(cluster.settings.quorum_size, 3);
        assert_eq!(cluster.multicast_address.port(), 9000);
        assert_eq!(cluster.peers.len(), 2);
        assert_eq!(cluster.peers["node-1"].port(), 9001);
    }
}
