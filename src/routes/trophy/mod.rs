pub mod handler;
pub mod model;

pub use handler::{admin_read, admin_write, public_trophies, report_webhook};
