mod handler;
mod model;

pub use handler::{delete_page, get_page, my_page, random_pages, update_page};
