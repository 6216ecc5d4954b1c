pub mod block;
pub mod bundle;
pub mod outcome;
pub mod plan;

pub use block::BlockHead;
pub use bundle::{
    BundleAttempt, BundleLeg, LegKind, SignedBundle, SignedLeg, SignerRole, TransactionSet,
    UnsignedTransaction,
};
pub use outcome::{LoopDecision, Outcome};
pub use plan::RescuePlan;
