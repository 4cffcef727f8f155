//! Markup handling for navigation responses.
//!
//! Navigation responses carry HTML fragments rather than whole documents. This crate
//! parses them with html5ever into an `rcdom` tree, matches CSS selectors against that
//! tree through the `selectors` crate, and pulls stylesheet and script references out
//! of the markup so they can be loaded separately from the inserted content.
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

pub mod assets;
pub mod fragment;
pub mod selector;

pub use assets::{ExtractedAssets, ScriptRef, StylesheetRef, extract_assets};
pub use fragment::{Fragment, Node};
pub use selector::{Selector, SelectorError};
