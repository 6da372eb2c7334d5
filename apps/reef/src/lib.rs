pub mod anim;
pub mod compound;
pub mod config;
pub mod model;
pub mod object;
pub mod protocol;
pub mod server;
pub mod telemetry;
pub mod transport;
