mod handler;
mod model;

pub use handler::{delete_mail, inbox, read_mail, send_mail};
