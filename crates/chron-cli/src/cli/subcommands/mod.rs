mod capture;

pub use capture::CaptureCommands;
