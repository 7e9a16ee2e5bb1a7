pub mod jsonl;
pub mod panel;
pub mod text;
pub mod trace;
pub mod validate;

pub use panel::*;
pub use trace::*;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
