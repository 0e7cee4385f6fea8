pub mod channel;
pub mod logging;
