mod config;
mod pagination;
mod roles;
mod snapshot;
mod util;

pub use config::*;
pub use pagination::*;
pub use roles::*;
pub use snapshot::*;
pub use util::*;

/// The type used for primary keys of persisted resources.
pub type PrimaryKey = i32;
