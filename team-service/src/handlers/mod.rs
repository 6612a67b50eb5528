//! HTTP handlers for team-service.

pub mod audit;
pub mod invitations;
pub mod members;
pub mod providers;

pub use audit::*;
pub use invitations::*;
pub use members::*;
pub use providers::*;
