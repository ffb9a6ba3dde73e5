//! Record instances
//!
//! - `record`: the instance type and its set pipeline
//! - `construct`: the template factory
//! - `history`: optional per-field change log
//! - `reducer`: reconstructible snapshots

mod construct;
mod flags;
mod history;
mod record;
mod reducer;

pub use flags::InstanceFlags;
pub use history::{Delta, DeltaState, History, LoggedDelta};
pub use record::Instance;
pub use reducer::Reduced;
