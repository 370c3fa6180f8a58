pub mod breakpoint;
pub mod source;

pub use breakpoint::BreakpointList;
pub use source::{SourceError, SourceManager};
