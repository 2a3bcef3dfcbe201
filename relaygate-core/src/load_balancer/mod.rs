//! Backend selection.

pub mod selector;
