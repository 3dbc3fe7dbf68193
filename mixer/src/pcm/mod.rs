//! PCM format handling.
//!
//! - [`Format`]: sample rate and channel layout
//! - conversion helpers between PCM16 little-endian bytes and f32 samples

mod convert;
mod format;

pub use convert::{decode_pcm16, encode_pcm16, f32_to_i16, i16_to_f32};
pub use format::Format;
