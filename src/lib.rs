pub mod backend;
pub mod converter;
pub mod error;
pub mod geometry;
pub mod task;

pub use converter::{ConversionHandle, Converter};
pub use error::ConvertError;
pub use geometry::FrameSize;
pub use task::{AbortHandle, ConvertRequest, ConvertTask, TaskEvent};
