pub mod config;
pub mod debuggee;
pub mod frame;
pub mod log;
pub mod protocol;
pub mod registry;
pub mod remote;
pub mod ui;
