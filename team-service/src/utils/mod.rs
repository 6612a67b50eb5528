pub mod token;
pub mod validation;

pub use token::{generate_invite_token, hash_token};
pub use validation::ValidatedJson;
