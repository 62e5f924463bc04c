pub mod attendance;
pub mod teaching;
