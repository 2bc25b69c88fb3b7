mod lease;
mod primitives;

pub use lease::*;
pub use primitives::*;
