pub mod frame;
pub mod jpeg_seq;
pub mod source;
pub mod synthetic;
pub mod y4m;

pub use frame::{FrameBuffer, PixelFormat};
pub use jpeg_seq::JpegSequence;
pub use source::{Decoded, FrameSource};
pub use synthetic::TestPattern;
pub use y4m::Y4mSource;
