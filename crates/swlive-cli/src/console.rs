//! Prefixed status lines for people watching the terminal.

use colored::Colorize;
use std::fmt::Display;

pub fn wait(message: impl Display) {
    println!("{}  - {}", "wait".cyan(), message);
}

pub fn warn(message: impl Display) {
    eprintln!("{}  - {}", "warn".yellow(), message);
}

pub fn ready(message: impl Display) {
    println!("{} - {}", "ready".green(), message);
}

pub fn info(message: impl Display) {
    println!("{}  - {}", "info".cyan(), message);
}

pub fn event(message: impl Display) {
    println!("{} - {}", "event".magenta(), message);
}
