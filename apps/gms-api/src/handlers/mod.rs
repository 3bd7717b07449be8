//! Handlers 模块

pub mod bus;
pub mod metrics;
pub mod realtime;
pub mod state;

pub use bus::*;
pub use metrics::*;
pub use realtime::*;
pub use state::*;
