//! Shared fixtures: a scratch quiver home with a shell-script collaborator.
#![allow(dead_code)]

use clap::Parser;
use quiver_arrow::{Args, Implementation, OperationConfig};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const IMPLEMENTATION: Implementation = Implementation::QpidProtonCpp;

pub struct Fixture {
    pub home: TempDir,
}

impl Fixture {
    /// A home whose collaborator runs `script` under /bin/sh.
    ///
    /// The collaborator also records its arguments next to itself in
    /// `<exec>.args`.
    pub fn with_script(script: &str) -> Self {
        Self::with_script_mode(script, 0o755)
    }

    pub fn with_script_mode(script: &str, mode: u32) -> Self {
        let home = TempDir::new().unwrap();
        let exec = IMPLEMENTATION.exec_file(home.path());
        std::fs::create_dir_all(exec.parent().unwrap()).unwrap();
        std::fs::write(
            &exec,
            format!("#!/bin/sh\necho \"$@\" > \"$0.args\"\n{}\n", script),
        )
        .unwrap();
        std::fs::set_permissions(&exec, std::fs::Permissions::from_mode(mode)).unwrap();
        Self { home }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.home.path().join("output")
    }

    pub fn recorded_args(&self) -> String {
        let mut path = IMPLEMENTATION.exec_file(self.home.path()).into_os_string();
        path.push(".args");
        std::fs::read_to_string(Path::new(&path)).unwrap().trim().to_string()
    }

    /// Parse a command line for this home. `extra` follows the positionals.
    pub fn config(&self, operation: &str, extra: &[&str]) -> OperationConfig {
        let home = self.home.path().to_str().unwrap().to_string();
        let output = self.output_dir().to_str().unwrap().to_string();
        let mut argv = vec![
            "quiver-arrow",
            operation,
            "//127.0.0.1:5672/q0",
            "--impl",
            "cpp",
            "--id",
            "arrow-test",
            "--home",
            &home,
            "--output",
            &output,
        ];
        argv.extend_from_slice(extra);
        OperationConfig::from_args(&Args::parse_from(argv)).unwrap()
    }
}
