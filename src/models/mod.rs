// Scenerec Models
// Data structures for the application

mod capture;
mod monitor;
mod settings;

pub use capture::*;
pub use monitor::*;
pub use settings::*;
