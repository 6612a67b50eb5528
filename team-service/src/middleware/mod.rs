pub mod actor;

pub use actor::{ACTOR_ID_HEADER, ActorIdentity};
