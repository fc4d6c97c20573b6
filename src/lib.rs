// Scenerec
// Display capture core: enumeration, encoder supervision, hotkeys, and
// the session state machine

pub mod models;
pub mod services;
