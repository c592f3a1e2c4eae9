pub mod client;
pub mod debate;
