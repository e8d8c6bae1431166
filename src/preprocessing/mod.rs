//! Image preprocessing shared by the segmenter and the recognizer
//!
//! Pages are clamped and padded before tiling, tiles and line crops are
//! binarized before they reach a model.

pub mod steps;

pub use steps::pad::{fit_to_box, pad_square_margins, pad_to_multiple};
pub use steps::resize::{fit_page, MAX_PAGE_SIDE};
pub use steps::threshold::{apply_fixed, binarize};
