use crate::error::Error;
use crate::frame::Frame;

/// Common trait for consumers of capture frames
pub trait FrameAnalyzer {
    /// Initialization function, called before reading capture data (optional)
    fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Callback function for every captured frame, in file order
    fn handle_frame(&mut self, frame: &Frame) -> Result<(), Error>;

    /// Teardown function, called once after the last frame (optional)
    fn teardown(&mut self) {}
}
