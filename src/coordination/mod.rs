//! Background coordination for work that happens after a commit

pub mod side_effects;

pub use side_effects::{SideEffect, SideEffectQueue, SideEffectStats};
