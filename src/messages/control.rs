//! Messages sent from the coordinator to a worker.

use crate::core::state_dict::WorkerStateDict;

/// Directive for one worker. One reply is expected for every message except
/// the production directives, which answer through the shared block queue.
#[derive(Debug, Clone)]
pub enum ControlMsg {
    /// Produce one block with the policy.
    Continue,

    /// Produce one block with random actions, regardless of the configured
    /// warmup budget.
    ContinueRandom,

    /// Reseed the worker's environment and RNG. Replies
    /// [`Seeded`](crate::messages::ReplyMsg::Seeded) with the effective
    /// seed.
    Seed(u64),

    /// Reset every lane. Replies [`Reset`](crate::messages::ReplyMsg::Reset).
    Reset,

    /// Pull the latest policy weights from the worker's device slot.
    /// Replies [`Updated`](crate::messages::ReplyMsg::Updated).
    UpdateWeights,

    /// Snapshot policy and environment state. Replies
    /// [`StateDict`](crate::messages::ReplyMsg::StateDict).
    StateDictRequest,

    /// Restore policy and environment state. Replies
    /// [`Loaded`](crate::messages::ReplyMsg::Loaded).
    LoadStateDict(WorkerStateDict),

    /// Finish the current block if one is in flight, release resources and
    /// terminate. Replies [`Closed`](crate::messages::ReplyMsg::Closed).
    Close,
}

impl ControlMsg {
    /// Whether this is a production directive.
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue | Self::ContinueRandom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_continue() {
        assert!(ControlMsg::Continue.is_continue());
        assert!(ControlMsg::ContinueRandom.is_continue());
        assert!(!ControlMsg::Reset.is_continue());
        assert!(!ControlMsg::Seed(0).is_continue());
        assert!(!ControlMsg::Close.is_continue());
    }
}
