//! Prelude module for convenient imports

pub use webpush_core::prelude::*;
pub use webpush_h2::prelude::*;
