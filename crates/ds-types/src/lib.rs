pub mod diagnostics;
pub mod errors;
pub mod path;

pub use diagnostics::*;
pub use errors::*;
pub use path::*;
