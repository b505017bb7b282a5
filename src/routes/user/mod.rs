mod handler;
mod model;

pub use handler::{list_users, me, register};
pub use model::User;
