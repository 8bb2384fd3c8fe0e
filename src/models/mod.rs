//! Domain model module declarations.

pub mod answer;
pub mod record;

pub use answer::{Answer, WinnerSet};
pub use record::{Batch, Record};
