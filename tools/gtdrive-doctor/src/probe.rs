// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `inspect` and `probe`: header checks and trial loads of a shim library.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use gtdrive::fmi2::COSIMULATION_SYMBOLS;
use gtdrive::resolver::{self, arch, ImageFormat, MachineArch};
use gtdrive::LoadError;
use tracing::{debug, info};

use crate::report::Report;

/// Read the image header without loading anything.
pub fn inspect(path: &Path) -> Report {
    let mut report = Report::new("inspect", path.display().to_string());
    match arch::read_image(path) {
        Ok(image) => {
            let host = MachineArch::host();
            let arches: Vec<String> = image.arches.iter().map(ToString::to_string).collect();
            report
                .fact("format", image.format)
                .fact("architecture", arches.join(", "))
                .fact("process", host)
                .fact("loadable", image.supports(host));
            if image.format == ImageFormat::Pe {
                match pe_dependencies(path) {
                    Ok(imports) => {
                        report.fact("imports", imports.join(", "));
                    }
                    Err(reason) => debug!("import table unreadable: {}", reason),
                }
            }
            if !image.supports(host) {
                report.fail(&LoadError::ArchitectureMismatch {
                    library: path.to_path_buf(),
                    expected: host,
                    found: image.primary(),
                });
            }
        }
        Err(reason) => {
            report.fail(&LoadError::InvalidImage {
                path: path.to_path_buf(),
                reason,
            });
        }
    }
    report
}

/// Load `path` and check the FMI symbol table.
///
/// With `isolated`, the library is first copied alone into an empty
/// directory, so dependencies shipped next to it can no longer be found.
pub fn probe(path: &Path, isolated: bool) -> anyhow::Result<Report> {
    let mut report = Report::new("probe", path.display().to_string());
    let staging = if isolated {
        Some(tempfile::tempdir().context("creating isolation directory")?)
    } else {
        None
    };
    let target = match &staging {
        Some(dir) => {
            let name = path
                .file_name()
                .with_context(|| format!("{} has no file name", path.display()))?;
            let copy = dir.path().join(name);
            std::fs::copy(path, &copy)
                .with_context(|| format!("copying {} to {}", path.display(), copy.display()))?;
            info!("isolated copy at {}", copy.display());
            copy
        }
        None => path.to_path_buf(),
    };
    report.fact("isolated", isolated).fact("loaded from", target.display());

    let library = match resolver::load_library(&target) {
        Ok(library) => library,
        Err(err) => {
            report.fail(&with_import_fallback(err));
            return Ok(report);
        }
    };
    report.fact("load", "ok");

    match resolver::require_symbols(&library, &target, COSIMULATION_SYMBOLS) {
        Ok(()) => {
            let total = COSIMULATION_SYMBOLS.len();
            report.fact("symbols", format!("{}/{}", total, total));
        }
        Err(err) => {
            if let LoadError::SymbolMissing { symbols, .. } = &err {
                let found = COSIMULATION_SYMBOLS.len() - symbols.len();
                report.fact("symbols", format!("{}/{}", found, COSIMULATION_SYMBOLS.len()));
            }
            report.fail(&err);
        }
    }
    Ok(report)
}

/// Windows loader messages do not name the missing module; fall back to the
/// import table entries that are neither system libraries nor present next
/// to the library.
fn with_import_fallback(err: LoadError) -> LoadError {
    match err {
        LoadError::MissingDependency {
            library,
            detail,
            missing,
        } if missing.is_empty() => {
            let missing = unresolved_imports(&library);
            LoadError::MissingDependency {
                library,
                detail,
                missing,
            }
        }
        other => other,
    }
}

fn unresolved_imports(library: &Path) -> Vec<String> {
    let Ok(imports) = pe_dependencies(library) else {
        return Vec::new();
    };
    let dir = library.parent().map(Path::to_path_buf).unwrap_or_default();
    imports
        .into_iter()
        .filter(|name| !resolver::is_system_library(OsStr::new(name)))
        .filter(|name| !sibling_exists(&dir, name))
        .collect()
}

fn sibling_exists(dir: &Path, name: &str) -> bool {
    let candidate: PathBuf = dir.join(name);
    candidate.is_file()
}

fn pe_dependencies(path: &Path) -> Result<Vec<String>, String> {
    let bytes = std::fs::read(path).map_err(|err| err.to_string())?;
    arch::pe_imports(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_current_executable() {
        let exe = std::env::current_exe().expect("current exe");
        let report = inspect(&exe);
        assert!(report.is_ok(), "{:?}", report.failure);
        assert!(report.facts.iter().any(|(label, value)| label == "loadable" && value == "true"));
    }

    #[test]
    fn test_inspect_text_file_is_invalid_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.so");
        std::fs::write(&path, "not a library").expect("write");
        let report = inspect(&path);
        assert_eq!(report.failure.as_ref().map(|f| f.kind), Some("InvalidImage"));
        assert_eq!(report.exit_code(), 6);
    }

    #[test]
    fn test_missing_file_is_invalid_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report = probe(&dir.path().join("absent.so"), false).expect("probe");
        assert_eq!(report.exit_code(), 6);
    }

    #[test]
    fn test_isolated_copy_of_text_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fake.dll");
        std::fs::write(&path, [0u8; 128]).expect("write");
        let report = probe(&path, true).expect("probe");
        assert!(report.facts.iter().any(|(label, value)| label == "isolated" && value == "true"));
        assert_eq!(report.exit_code(), 6);
    }

    /// Compiles a library that links against a sibling
    /// `libgtdrive_doctor_dep.so` through an `$ORIGIN` rpath. Returns `None`
    /// when no C compiler is available.
    #[cfg(target_os = "linux")]
    fn build_library_with_sibling(dir: &Path) -> Option<PathBuf> {
        use std::process::Command;

        std::fs::write(dir.join("dep.c"), "int gtdrive_doctor_dep(void) { return 1; }\n").ok()?;
        std::fs::write(
            dir.join("shim.c"),
            "int gtdrive_doctor_dep(void);\nint gtdrive_doctor_shim(void) { return gtdrive_doctor_dep(); }\n",
        )
        .ok()?;
        let cc = |args: &[&str]| {
            Command::new("cc")
                .current_dir(dir)
                .args(args)
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        };
        let built = cc(&[
            "-shared", "-fPIC", "-Wl,-soname,libgtdrive_doctor_dep.so",
            "-o", "libgtdrive_doctor_dep.so", "dep.c",
        ]) && cc(&[
            "-shared", "-fPIC", "-Wl,-rpath,$ORIGIN", "-o", "libgtdrive_doctor_shim.so",
            "shim.c", "-L.", "-lgtdrive_doctor_dep",
        ]);
        built.then(|| dir.join("libgtdrive_doctor_shim.so"))
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_isolated_load_names_missing_sibling() {
        let dir = tempfile::tempdir().expect("tempdir");
        let Some(shim) = build_library_with_sibling(dir.path()) else {
            eprintln!("[!] no C compiler, skipping");
            return;
        };

        // In place the sibling resolves; the FMI table is what is missing.
        let report = probe(&shim, false).expect("in place");
        assert_eq!(report.failure.as_ref().map(|f| f.kind), Some("SymbolMissing"));
        assert_eq!(report.exit_code(), 5);

        // Copied alone, the loader names the sibling.
        let report = probe(&shim, true).expect("isolated run");
        let failure = report.failure.as_ref().expect("load failure");
        assert_eq!(failure.kind, "MissingDependency");
        assert_eq!(failure.missing, vec!["libgtdrive_doctor_dep.so".to_string()]);
        assert_eq!(report.exit_code(), 3);
    }

    #[test]
    fn test_fallback_keeps_loader_named_items() {
        let err = LoadError::MissingDependency {
            library: PathBuf::from("/nowhere/gtdrive_fmi.so"),
            detail: "libpolicy.so: cannot open shared object file".to_string(),
            missing: vec!["libpolicy.so".to_string()],
        };
        assert_eq!(with_import_fallback(err.clone()), err);
    }

    #[test]
    fn test_fallback_on_unreadable_library_is_empty() {
        let err = LoadError::MissingDependency {
            library: PathBuf::from("/nowhere/gtdrive_fmi.dll"),
            detail: "os error 126".to_string(),
            missing: Vec::new(),
        };
        match with_import_fallback(err) {
            LoadError::MissingDependency { missing, .. } => assert!(missing.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
