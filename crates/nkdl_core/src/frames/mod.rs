//! Frame ranges and frame requests.
//!
//! [`FrameRange`] parses, substitutes and expands frame expressions such as
//! `1001-1100x2,1200` or `f-l`. [`FrameRequest`] classifies what a caller
//! asked for on the command line before any project values are known.

mod range;
mod request;

pub use range::{
    normalize_hero_list, Frame, FrameRange, FrameRangeError, FrameResult, MAX_EXPANDED_FRAMES,
};
pub use request::FrameRequest;
