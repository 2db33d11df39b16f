mod message;
mod operation;
mod version;

pub use message::*;
pub use operation::*;
pub use version::*;
