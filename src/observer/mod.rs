// Observer system for side effects that follow a successful write.
// Observers never block or fail the request that triggered them.

pub mod error;
pub mod event;
pub mod implementations;
pub mod pipeline;
pub mod traits;

pub use error::*;
pub use event::*;
pub use pipeline::*;
pub use traits::*;
