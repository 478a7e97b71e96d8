//! Messages sent from a worker back to the coordinator.

use crate::core::state_dict::WorkerStateDict;

/// Acknowledgement for one control message.
#[derive(Debug, Clone)]
pub enum ReplyMsg {
    /// Environment reseeded; carries the effective seed after sequential
    /// per-lane assignment.
    Seeded(u64),

    /// All lanes reset.
    Reset,

    /// Policy weights loaded.
    Updated,

    /// Snapshot of the worker's policy and environment state.
    StateDict(WorkerStateDict),

    /// State restored from a snapshot.
    Loaded,

    /// Worker terminated.
    Closed,
}

impl ReplyMsg {
    /// Tag name used in protocol error messages.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Seeded(_) => "Seeded",
            Self::Reset => "Reset",
            Self::Updated => "Updated",
            Self::StateDict(_) => "StateDict",
            Self::Loaded => "Loaded",
            Self::Closed => "Closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(ReplyMsg::Seeded(1).tag(), "Seeded");
        assert_eq!(ReplyMsg::Closed.tag(), "Closed");
        assert_eq!(ReplyMsg::StateDict(WorkerStateDict::default()).tag(), "StateDict");
    }
}
