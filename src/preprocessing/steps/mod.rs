//! Individual preprocessing steps

pub mod grayscale;
pub mod pad;
pub mod resize;
pub mod threshold;
