//! Async runtime around the surface engine
//!
//! The engine itself is synchronous; this module puts a surface group behind
//! a tokio actor, turns scheduled tasks into tokio timers and builds the
//! group from configuration.

pub mod actor;
pub mod actor_handle;
pub mod builders;
pub mod commands;
pub mod scheduler;

pub use actor::SurfaceActor;
pub use actor_handle::SurfaceHandle;
pub use builders::{build_group, units, UnitConfig};
pub use commands::{SurfaceCommand, SurfaceStatus};
pub use scheduler::TokioScheduler;
