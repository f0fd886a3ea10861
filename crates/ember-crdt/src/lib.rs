//! Ember CRDT - dot-context causal framework
//!
//! Delta-state CRDT machinery for the emberfleet drone swarm:
//!
//! - [`dot`] - dots and dot contexts (causality tracking)
//! - [`kernel`] - the dot kernel primitive (dot-to-payload map + context)
//! - [`aworset`] - Add-Wins Observed-Remove Set layered on the kernel
//!
//! # Delta-state replication
//!
//! Mutators accumulate their effect into a small delta kernel that can be
//! shipped and merged exactly like a full state:
//!
//! ```text
//! On local mutation m:
//!   core = core ⊔ mδ(core)      // apply
//!   delta = delta ⊔ mδ(core)    // mirror for dissemination
//!
//! On receive delta d:
//!   core = core ⊔ d             // commutative, associative, idempotent
//! ```
//!
//! Convergence holds regardless of message order, duplication or loss, as
//! long as every delta eventually reaches every replica (gossip plus
//! anti-entropy take care of that upstairs).

pub mod aworset;
pub mod dot;
pub mod kernel;

pub use aworset::AworSet;
pub use dot::{Dot, DotContext, NodeId};
pub use kernel::DotKernel;
