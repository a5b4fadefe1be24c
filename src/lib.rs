//! Push streams and a keyed resource cache for building interactive applications out of disposable components.
mod error;
pub mod keyed;
mod obs;
mod sink;
mod stream;
mod subject;
mod subscription;

#[cfg(test)]
mod utils;

pub use error::*;
pub use keyed::{attach, attach_with, DedupPolicy, Keyed, KeyedOptions};
pub use obs::*;
pub use sink::*;
pub use stream::*;
pub use subject::*;
pub use subscription::*;
