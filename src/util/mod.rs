//! Small shared utilities.
//!
//! - **Cancellation**: a watch-channel token threaded through network calls
//! - **Text**: flattening feed-supplied strings for terminal output

mod cancel;
mod text;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use text::single_line;
