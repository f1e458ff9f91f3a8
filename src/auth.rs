//! Identity projections, scope sets, and secret wrappers used by the bridge.

pub mod identity;
pub mod scope;
pub mod secret;

pub use identity::*;
pub use scope::*;
pub use secret::*;
