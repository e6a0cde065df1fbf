mod dispatcher;
mod frame;
mod receiver;


pub use dispatcher::{DeviceCommand, ResponseDispatcher};
pub use frame::FrameCapture;
pub use receiver::FrameReceiver;
