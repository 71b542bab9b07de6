mod calibration;
mod cloud;
mod config;
mod converter;
mod packet;

pub use calibration::*;
pub use cloud::*;
pub use config::*;
pub use converter::*;
pub use packet::*;
