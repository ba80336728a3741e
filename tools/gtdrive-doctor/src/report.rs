// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Diagnostic reports: human (colored) or JSON output and the exit code.

use colored::*;
use gtdrive::LoadError;
use serde::Serialize;

/// Exit code when a bundle cannot be opened or the cycle fails.
pub const EXIT_RUN_FAILED: i32 = 2;

/// Machine-readable description of a [`LoadError`].
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    pub exit_code: i32,
}

impl From<&LoadError> for Failure {
    fn from(err: &LoadError) -> Self {
        let missing = match err {
            LoadError::MissingDependency { missing, .. } => missing.clone(),
            LoadError::SymbolMissing { symbols, .. } => symbols.clone(),
            _ => Vec::new(),
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            missing,
            exit_code: err.exit_code(),
        }
    }
}

/// Outcome of one doctor command.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub command: &'static str,
    pub target: String,
    /// Ordered `(label, value)` findings.
    pub facts: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl Report {
    pub fn new(command: &'static str, target: impl Into<String>) -> Self {
        Self {
            command,
            target: target.into(),
            facts: Vec::new(),
            failure: None,
        }
    }

    pub fn fact(&mut self, label: impl Into<String>, value: impl ToString) -> &mut Self {
        self.facts.push((label.into(), value.to_string()));
        self
    }

    pub fn fail(&mut self, err: &LoadError) -> &mut Self {
        self.failure = Some(Failure::from(err));
        self
    }

    /// Record a failure that is not a loader error (bundle, FMI status).
    pub fn fail_with(&mut self, kind: &'static str, message: impl Into<String>) -> &mut Self {
        self.failure = Some(Failure {
            kind,
            message: message.into(),
            missing: Vec::new(),
            exit_code: EXIT_RUN_FAILED,
        });
        self
    }

    #[cfg(test)]
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        self.failure.as_ref().map_or(0, |f| f.exit_code)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn print_human(&self) {
        println!("{} {}", self.command.bold(), self.target.cyan());
        let width = self.facts.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        for (label, value) in &self.facts {
            println!("  {:width$}  {}", label.dimmed(), value, width = width);
        }
        match &self.failure {
            None => println!("  {}", "OK".green().bold()),
            Some(failure) => {
                println!("  {} {}", failure.kind.red().bold(), failure.message);
                for item in &failure.missing {
                    println!("    {} {}", "missing:".yellow(), item);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_failure_from_missing_dependency() {
        let err = LoadError::MissingDependency {
            library: PathBuf::from("gtdrive_fmi.so"),
            detail: "libpolicy.so: cannot open shared object file".to_string(),
            missing: vec!["libpolicy.so".to_string()],
        };
        let mut report = Report::new("probe", "gtdrive_fmi.so");
        report.fail(&err);
        assert!(!report.is_ok());
        assert_eq!(report.exit_code(), 3);

        let json: serde_json::Value =
            serde_json::from_str(&report.to_json().expect("json")).expect("parse");
        assert_eq!(json["failure"]["kind"], "MissingDependency");
        assert_eq!(json["failure"]["missing"][0], "libpolicy.so");
    }

    #[test]
    fn test_ok_report_has_no_failure_key() {
        let mut report = Report::new("inspect", "lib.so");
        report.fact("format", "ELF").fact("arch", "x86_64");
        assert_eq!(report.exit_code(), 0);
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json().expect("json")).expect("parse");
        assert!(json.get("failure").is_none());
        assert_eq!(json["facts"][1][1], "x86_64");
    }

    #[test]
    fn test_run_failure_code() {
        let mut report = Report::new("run", "model.fmu");
        report.fail_with("Fmi2Error", "fmi2DoStep returned Error");
        assert_eq!(report.exit_code(), EXIT_RUN_FAILED);
    }
}
