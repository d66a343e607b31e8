pub mod debug;
pub mod recompress;

pub use debug::DebugStage;
pub use recompress::RecompressStage;
