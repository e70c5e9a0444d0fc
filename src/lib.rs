//! gradle-runner - a thin runner for a project's Gradle wrapper script
//!
//! This crate provides the core library functionality for gradle-runner:
//! building the `./gradlew` command line, injecting CI-friendly environment
//! variables, and streaming the child's output to the log as it arrives.

pub mod gradle;
pub mod process;

pub use gradle::{property, GradleInvocation, GRADLEW};
pub use process::{Completed, ExitError, ProcessBuilder};
