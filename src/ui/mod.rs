//! User interface of the frame side.

pub mod command;
pub mod console;
