use serde::Deserialize;
use serde::Serialize;

/// One voting member of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub address: String,
}

impl Member {
    pub fn new(
        id: &str,
        address: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            address: address.to_string(),
        }
    }
}

/// Cluster membership as known to the consensus engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub members: Vec<Member>,
}

impl Configuration {
    pub fn new(members: Vec<Member>) -> Self {
        Self { members }
    }

    pub fn single(member: Member) -> Self {
        Self {
            members: vec![member],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub fn get(
        &self,
        id: &str,
    ) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// True when `id` is the only voter, so it can elect itself.
    pub fn is_sole_voter(
        &self,
        id: &str,
    ) -> bool {
        self.members.len() == 1 && self.contains(id)
    }
}
