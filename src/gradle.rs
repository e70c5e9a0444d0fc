//! Gradle wrapper invocation.
//!
//! Every invocation goes through the project's own `./gradlew` script with
//! the environment tweaks CI builds need: `GRADLE_OPTS` injection for extra
//! JVM options and a longer adb install timeout for device tests.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::process::{Completed, ProcessBuilder};

/// Relative path of the wrapper script every invocation goes through.
pub const GRADLEW: &str = "./gradlew";

/// Environment variable Gradle reads extra JVM options from.
pub const GRADLE_OPTS_VAR: &str = "GRADLE_OPTS";

/// adb install timeout in minutes, 5 rather than the default 2.
pub const ADB_INSTALL_TIMEOUT: &str = "5";

const ADB_INSTALL_TIMEOUT_VAR: &str = "ADB_INSTALL_TIMEOUT";

/// Format a Gradle project property as a `-Pname=value` CLI token.
///
/// No escaping is performed; the caller is responsible for names and values
/// that survive Gradle's property parsing.
pub fn property(name: impl AsRef<str>, value: impl AsRef<str>) -> String {
    format!("-P{}={}", name.as_ref(), value.as_ref())
}

/// Builder for a single `./gradlew` invocation.
#[derive(Debug, Clone)]
pub struct GradleInvocation {
    args: Vec<String>,
    gradle_opts: String,
    workdir: Option<PathBuf>,
    check: bool,
}

impl GradleInvocation {
    /// Create an invocation with the given gradlew arguments.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GradleInvocation {
            args: args.into_iter().map(Into::into).collect(),
            gradle_opts: String::new(),
            workdir: None,
            check: true,
        }
    }

    /// Add a single gradlew argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set extra JVM options passed through `GRADLE_OPTS`.
    ///
    /// An empty string leaves the child's `GRADLE_OPTS` untouched, so a
    /// value inherited from the parent environment stays in effect.
    pub fn gradle_opts(mut self, opts: impl Into<String>) -> Self {
        self.gradle_opts = opts.into();
        self
    }

    /// Set the directory to run gradlew in; defaults to the current directory.
    pub fn workdir(mut self, dir: impl AsRef<Path>) -> Self {
        self.workdir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Control whether a non-zero Gradle exit is raised as an error.
    /// Defaults to true.
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Build the underlying process invocation.
    pub fn to_process(&self) -> ProcessBuilder {
        let mut process = ProcessBuilder::new(GRADLEW)
            .args(&self.args)
            .check(self.check)
            .env(ADB_INSTALL_TIMEOUT_VAR, ADB_INSTALL_TIMEOUT);

        if !self.gradle_opts.is_empty() {
            process = process.env(GRADLE_OPTS_VAR, &self.gradle_opts);
        }

        if let Some(ref dir) = self.workdir {
            process = process.cwd(dir);
        }

        process
    }

    /// Run gradlew, streaming its output to the log, and wait for it.
    pub fn run(&self) -> Result<Completed> {
        self.to_process().exec_streamed()
    }
}

/// Invoke `./gradlew` with the given arguments and default settings.
pub fn run<I, S>(args: I) -> Result<Completed>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    GradleInvocation::new(args).run()
}
