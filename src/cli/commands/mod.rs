pub mod permission;
pub mod role;
pub mod trophy;
pub mod user;
