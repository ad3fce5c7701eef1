//! CLI 인터페이스 모듈.

pub mod command;

pub use command::{Cli, Command};
