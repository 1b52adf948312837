pub mod cli;
pub mod core;
pub mod launcher;
pub mod venv;
