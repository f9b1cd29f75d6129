pub mod accumulator;
pub mod geometry;
pub mod negotiate;
pub mod producer;
pub mod record;

pub use accumulator::{integral_channel, FlowIntegral, FlowReader, FlowSample, PipelineStats};
pub use geometry::{Correction, GeometryPlan};
pub use negotiate::{negotiate, Negotiated};
pub use producer::CaptureLoop;
pub use record::FrameRecorder;
