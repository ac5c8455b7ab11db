use serde::Deserialize;

/// Genesis fork version and genesis time per network, mirroring the Go
/// original's `modules/relay/common/constants.go`. The application-builder
/// signing domain depends only on the fork version and the genesis
/// validators root (defaulted to all-zero bytes unless overridden, matching
/// the Go config default); `genesis_time` is unrelated to signing and is
/// only consumed by the aggregator's slot-deadline arithmetic.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Sepolia,
    Goerli,
    #[serde(skip)]
    Custom {
        genesis_fork_version: [u8; 4],
        genesis_time: u64,
    },
}

impl Network {
    pub fn genesis_fork_version(&self) -> [u8; 4] {
        match self {
            Self::Mainnet => [0x00, 0x00, 0x00, 0x00],
            Self::Sepolia => [0x90, 0x00, 0x00, 0x69],
            Self::Goerli => [0x00, 0x00, 0x10, 0x20],
            Self::Custom { genesis_fork_version, .. } => *genesis_fork_version,
        }
    }

    pub fn genesis_time(&self) -> u64 {
        match self {
            Self::Mainnet => 1_606_824_023,
            Self::Sepolia => 1_655_733_600,
            Self::Goerli => 1_614_588_812,
            Self::Custom { genesis_time, .. } => *genesis_time,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Sepolia => write!(f, "sepolia"),
            Self::Goerli => write!(f, "goerli"),
            Self::Custom { genesis_fork_version, .. } => {
                write!(f, "custom network with fork version 0x{}", hex::encode(genesis_fork_version))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_fork_versions_match_known_constants() {
        assert_eq!(Network::Mainnet.genesis_fork_version(), [0, 0, 0, 0]);
        assert_eq!(Network::Sepolia.genesis_fork_version(), [0x90, 0x00, 0x00, 0x69]);
        assert_eq!(Network::Goerli.genesis_fork_version(), [0x00, 0x00, 0x10, 0x20]);
        assert_eq!(Network::Mainnet.genesis_time(), 1_606_824_023);
    }
}
