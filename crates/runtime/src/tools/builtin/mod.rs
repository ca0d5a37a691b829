//! Built-in tools.

pub mod shell;
pub mod sms;
pub mod weather;

pub use shell::ShellConfig;
