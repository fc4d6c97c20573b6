// Scenerec Services
// Recording control layer

mod encoder;
mod events;
mod hotkeys;
mod monitors;
mod session;
mod settings_manager;

pub use encoder::*;
pub use events::*;
pub use hotkeys::*;
pub use monitors::*;
pub use session::*;
pub use settings_manager::*;
