// ABOUTME: Display module for human-facing run output
// ABOUTME: Exports the terminal progress observer

pub mod terminal;

pub use terminal::TerminalDisplay;
