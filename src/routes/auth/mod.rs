pub mod handler;
pub mod model;

pub use handler::{
    forgot_password, login, logout, register, resend_verification, reset_password, session,
    verify_email,
};
