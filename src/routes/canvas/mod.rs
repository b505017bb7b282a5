mod handler;
mod model;

pub use handler::{edit_status, get_pixel, image, paint, pixel_history, region, stats};
