use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the fixed time resolutions at which snapshots are buffered and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Granularity {
    /// Finest tier, fed directly from the upstream source (seconds by default).
    Fine,
    /// Rolled up from the fine tier (minutes by default).
    Medium,
    /// Rolled up from the medium tier (hours by default).
    Coarse,
}

impl Granularity {
    /// All tiers, finest first.
    pub const ALL: [Self; 3] = [Self::Fine, Self::Medium, Self::Coarse];

    /// Label written to the granularity column of the backing store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fine => "sec",
            Self::Medium => "min",
            Self::Coarse => "hr",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replica acknowledgement level requested for a persistence batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ConsistencyLevel {
    /// A single replica must acknowledge.
    One,
    /// Two replicas must acknowledge.
    Two,
    /// Three replicas must acknowledge.
    Three,
    /// A majority of all replicas must acknowledge.
    #[default]
    Quorum,
    /// A majority of replicas in the local datacenter must acknowledge.
    LocalQuorum,
    /// A majority of replicas in every datacenter must acknowledge.
    EachQuorum,
    /// Every replica must acknowledge.
    All,
}

impl ConsistencyLevel {
    /// Number of acknowledgements required for a replication factor `rf`.
    ///
    /// Datacenter-scoped levels are evaluated as if the cluster had one datacenter.
    #[must_use]
    pub const fn required_acks(self, rf: u32) -> u32 {
        let n = match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Quorum | Self::LocalQuorum | Self::EachQuorum => rf / 2 + 1,
            Self::All => rf,
        };
        if n > rf { rf } else { n }
    }
}
