// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dependency resolver.
//!
//! Hosts load the plugin from wherever they unpacked the FMU and with whatever
//! working directory they happen to run in. Libraries the plugin depends on at
//! runtime are therefore looked up relative to the plugin's own install
//! directory, never relative to the working directory.
//!
//! # Registration
//!
//! [`register_install_dir`] runs once per process, before the first dependent
//! library is touched, and appends the directory to a process-wide search
//! list consulted by [`locate`] and [`load_library`]. Failures are logged and
//! otherwise ignored; the host may still succeed if the dependencies sit on
//! the default search path.
//!
//! # Loading
//!
//! [`load_library`] never leaves loader state behind for the host:
//!
//! - Windows: the install directory is set with `SetDllDirectoryW` for the
//!   duration of the load only; the host's previous setting is restored
//!   right after.
//! - Elsewhere: `dlopen` has no runtime search path. When the loader names a
//!   missing dependency that [`locate`] finds in a registered directory, that
//!   library is loaded first and the load retried. The dependency resolves
//!   only if its `DT_SONAME` equals the name recorded in the dependent
//!   library; otherwise link dependents with an `$ORIGIN` rpath.

pub mod arch;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libloading::Library;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

pub use arch::{ImageFormat, ImageInfo, MachineArch};

/// Failure to load a shared library or resolve its symbols.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The loader refused the library, usually because a dependency is missing.
    #[error("cannot load {}: {detail}", library.display())]
    MissingDependency {
        library: PathBuf,
        detail: String,
        /// Unresolved items named by the loader, when it names them.
        missing: Vec<String>,
    },
    /// Image built for another machine than the running process.
    #[error("{} is built for {found}, this process is {expected}", library.display())]
    ArchitectureMismatch {
        library: PathBuf,
        expected: MachineArch,
        found: MachineArch,
    },
    /// Library loaded but required exports are absent.
    #[error("{} does not export {}", library.display(), symbols.join(", "))]
    SymbolMissing {
        library: PathBuf,
        symbols: Vec<String>,
    },
    /// File missing or not an executable image.
    #[error("{} is not a loadable image: {reason}", path.display())]
    InvalidImage { path: PathBuf, reason: String },
}

impl LoadError {
    /// Process exit code used by the diagnostic harness.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::MissingDependency { .. } => 3,
            LoadError::ArchitectureMismatch { .. } => 4,
            LoadError::SymbolMissing { .. } => 5,
            LoadError::InvalidImage { .. } => 6,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::MissingDependency { .. } => "MissingDependency",
            LoadError::ArchitectureMismatch { .. } => "ArchitectureMismatch",
            LoadError::SymbolMissing { .. } => "SymbolMissing",
            LoadError::InvalidImage { .. } => "InvalidImage",
        }
    }
}

/// FMI `binaries/` sub-directory for the running platform.
pub fn platform_dir() -> &'static str {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("windows", "x86_64") => "win64",
        ("windows", "x86") => "win32",
        ("linux", "x86_64") => "linux64",
        ("linux", "x86") => "linux32",
        ("macos", "x86_64") => "darwin64",
        // FMI 2 has no names for these, use the common 3.0 spelling.
        ("windows", "aarch64") => "aarch64-windows",
        ("linux", "aarch64") => "aarch64-linux",
        ("macos", "aarch64") => "aarch64-darwin",
        _ => "unknown",
    }
}

fn search_list() -> &'static RwLock<Vec<PathBuf>> {
    static SEARCH: OnceLock<RwLock<Vec<PathBuf>>> = OnceLock::new();
    SEARCH.get_or_init(|| RwLock::new(Vec::new()))
}

/// Add `dir` to the process-wide search list (duplicates are ignored).
pub fn register(dir: &Path) {
    let mut list = search_list().write();
    if !list.iter().any(|known| known == dir) {
        log::debug!("[gtdrive] search path += {}", dir.display());
        list.push(dir.to_path_buf());
    }
}

/// Snapshot of the registered directories, in registration order.
pub fn registered() -> Vec<PathBuf> {
    search_list().read().clone()
}

/// Dependency chain depth followed when preloading registered libraries.
const MAX_PRELOAD_DEPTH: usize = 4;

static INSTALL_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Register the directory holding this library, once per process.
///
/// Returns the directory when it could be determined.
pub fn register_install_dir() -> Option<&'static Path> {
    INSTALL_DIR
        .get_or_init(|| {
            let dir = match install_dir() {
                Ok(dir) => dir,
                Err(reason) => {
                    log::warn!("[gtdrive] cannot determine install directory: {}", reason);
                    return None;
                }
            };
            register(&dir);
            log::info!("[gtdrive] install directory {}", dir.display());
            Some(dir)
        })
        .as_deref()
}

/// Directory of the module (shared library or executable) containing this code.
pub fn install_dir() -> Result<PathBuf, String> {
    let module = platform::module_path()?;
    module
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| format!("{} has no parent directory", module.display()))
}

/// Find `name` in the registered directories.
///
/// `name` may be a path (returned as-is when it exists), a file name, or a
/// bare library stem expanded with the platform prefix and suffix
/// (`policy` -> `libpolicy.so`, `policy.dll`, ...).
pub fn locate(name: &Path) -> Option<PathBuf> {
    if name.is_absolute() {
        return name.is_file().then(|| name.to_path_buf());
    }
    let mut candidates = vec![name.to_path_buf()];
    if name.extension().is_none() {
        candidates.push(PathBuf::from(libloading::library_filename(name.as_os_str())));
    }
    registered().iter().find_map(|dir| {
        candidates
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.is_file())
    })
}

/// Check the image header, then load the library.
pub fn load_library(path: &Path) -> Result<Library, LoadError> {
    let info = arch::read_image(path).map_err(|reason| LoadError::InvalidImage {
        path: path.to_path_buf(),
        reason,
    })?;
    let host = MachineArch::host();
    if !info.supports(host) {
        return Err(LoadError::ArchitectureMismatch {
            library: path.to_path_buf(),
            expected: host,
            found: info.primary(),
        });
    }

    // Loader state is process-wide; one load at a time.
    static LOADER: Mutex<()> = Mutex::new(());
    let _serialized = LOADER.lock();
    let _scope = platform::LoaderScope::enter(INSTALL_DIR.get().and_then(Option::as_deref));
    open_with_preload(path, MAX_PRELOAD_DEPTH).map_err(|detail| LoadError::MissingDependency {
        library: path.to_path_buf(),
        missing: parse_missing(&detail),
        detail,
    })
}

/// Libraries loaded ahead of their dependents; held for the process lifetime.
fn preloaded() -> &'static Mutex<Vec<PathBuf>> {
    static PRELOADED: OnceLock<Mutex<Vec<PathBuf>>> = OnceLock::new();
    PRELOADED.get_or_init(|| Mutex::new(Vec::new()))
}

/// Open `path`; on failure, preload the missing items found in the
/// registered directories and retry while that makes progress.
fn open_with_preload(path: &Path, depth: usize) -> Result<Library, String> {
    loop {
        // SAFETY:
        // - Loading runs the library's initialisers; callers only pass libraries
        //   shipped inside the FMU, named by its configuration, or found in a
        //   registered directory.
        let detail = match unsafe { Library::new(path.as_os_str()) } {
            Ok(library) => return Ok(library),
            Err(err) => err.to_string(),
        };
        if depth == 0 || !preload_registered(&parse_missing(&detail), depth - 1) {
            return Err(detail);
        }
    }
}

/// Returns `true` when at least one library was newly loaded.
fn preload_registered(missing: &[String], depth: usize) -> bool {
    let mut progressed = false;
    for name in missing {
        let Some(file) = Path::new(name).file_name() else {
            continue;
        };
        let Some(path) = locate(Path::new(file)) else {
            continue;
        };
        if preloaded().lock().contains(&path) {
            continue;
        }
        match open_with_preload(&path, depth) {
            Ok(library) => {
                log::debug!("[gtdrive] preloaded {}", path.display());
                // Unloading would pull the dependency from under its dependents.
                std::mem::forget(library);
                preloaded().lock().push(path);
                progressed = true;
            }
            Err(detail) => log::debug!("[gtdrive] cannot preload {}: {}", path.display(), detail),
        }
    }
    progressed
}

/// Check that `library` exports every name in `symbols`.
pub fn require_symbols(library: &Library, path: &Path, symbols: &[&str]) -> Result<(), LoadError> {
    let missing: Vec<String> = symbols
        .iter()
        .filter(|name| {
            // SAFETY: the symbol is only probed, never called through this type.
            unsafe { library.get::<*const ()>(name.as_bytes()) }.is_err()
        })
        .map(|name| (*name).to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(LoadError::SymbolMissing {
            library: path.to_path_buf(),
            symbols: missing,
        })
    }
}

/// Extract unresolved library names from a loader error message.
///
/// Understands the glibc/musl `dlopen` and macOS `dyld` wordings. Windows
/// messages carry only an error code, so the result is empty there.
pub fn parse_missing(message: &str) -> Vec<String> {
    let mut missing = Vec::new();
    for line in message.lines() {
        let line = line.trim();
        if let Some(index) = line.find(": cannot open shared object file") {
            let name = line[..index].rsplit(": ").next().unwrap_or_default();
            push_unique(&mut missing, name);
        } else if let Some(index) = line.find("Library not loaded: ") {
            let rest = &line[index + "Library not loaded: ".len()..];
            let name = rest.split_whitespace().next().unwrap_or_default();
            push_unique(&mut missing, name);
        } else if let Some(index) = line.find("Error loading shared library ") {
            // musl: "Error loading shared library libfoo.so: No such file or directory"
            let rest = &line[index + "Error loading shared library ".len()..];
            let name = rest.split(':').next().unwrap_or_default();
            push_unique(&mut missing, name);
        }
    }
    missing
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    let name = name.trim();
    if !name.is_empty() && !list.iter().any(|known| known == name) {
        list.push(name.to_string());
    }
}

/// `true` when `name` looks like a system library that is always resolvable.
pub fn is_system_library(name: &OsStr) -> bool {
    let lower = name.to_string_lossy().to_ascii_lowercase();
    const SYSTEM_PREFIXES: &[&str] = &[
        "kernel32", "ntdll", "user32", "advapi32", "ws2_32", "bcrypt", "api-ms-win-",
        "ext-ms-", "ucrtbase", "msvcrt", "shell32", "ole32", "oleaut32", "userenv",
        "secur32", "crypt32", "libc.so", "libm.so", "libdl.so", "libpthread.so",
        "libgcc_s.so", "librt.so", "ld-linux", "libsystem",
    ];
    SYSTEM_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

#[cfg(unix)]
mod platform {
    use std::ffi::CStr;
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};

    pub(super) fn module_path() -> Result<PathBuf, String> {
        let mut info = std::mem::MaybeUninit::<libc::Dl_info>::zeroed();
        // SAFETY:
        // - the address belongs to a function of this module, so dladdr
        //   resolves it to the object mapped from our own file
        // - info is written by dladdr before being read (checked by the return value)
        let found = unsafe {
            libc::dladdr(module_path as *const libc::c_void, info.as_mut_ptr())
        };
        if found == 0 {
            return Err("dladdr could not resolve the module".to_string());
        }
        // SAFETY: dladdr returned non-zero, so info is initialised.
        let info = unsafe { info.assume_init() };
        if info.dli_fname.is_null() {
            return Err("dladdr returned no file name".to_string());
        }
        // SAFETY: dli_fname is a NUL-terminated string owned by the loader.
        let name = unsafe { CStr::from_ptr(info.dli_fname) };
        let path = PathBuf::from(std::ffi::OsStr::from_bytes(name.to_bytes()));
        // Executables may report a relative argv[0]-style path.
        Ok(std::fs::canonicalize(&path).unwrap_or(path))
    }

    /// No loader state to scope; preloading covers this platform.
    pub(super) struct LoaderScope;

    impl LoaderScope {
        pub(super) fn enter(_dir: Option<&Path>) -> Self {
            LoaderScope
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::ffi::OsString;
    use std::os::windows::ffi::{OsStrExt, OsStringExt};
    use std::path::{Path, PathBuf};

    use windows_sys::Win32::Foundation::HMODULE;
    use windows_sys::Win32::System::LibraryLoader::{
        GetDllDirectoryW, GetModuleFileNameW, GetModuleHandleExW, SetDllDirectoryW,
        GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS, GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
    };

    pub(super) fn module_path() -> Result<PathBuf, String> {
        let mut module: HMODULE = std::ptr::null_mut();
        // SAFETY:
        // - FROM_ADDRESS interprets the name argument as an address inside the module
        // - UNCHANGED_REFCOUNT means no FreeLibrary is owed for the handle
        let ok = unsafe {
            GetModuleHandleExW(
                GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
                module_path as *const u16,
                &mut module,
            )
        };
        if ok == 0 {
            return Err(format!(
                "GetModuleHandleExW failed: {}",
                std::io::Error::last_os_error()
            ));
        }

        let mut buffer = vec![0u16; 260];
        loop {
            // SAFETY: buffer is valid for buffer.len() UTF-16 units.
            let len = unsafe {
                GetModuleFileNameW(module, buffer.as_mut_ptr(), buffer.len() as u32)
            } as usize;
            if len == 0 {
                return Err(format!(
                    "GetModuleFileNameW failed: {}",
                    std::io::Error::last_os_error()
                ));
            }
            if len < buffer.len() {
                return Ok(PathBuf::from(OsString::from_wide(&buffer[..len])));
            }
            // Truncated, retry with a bigger buffer.
            buffer.resize(buffer.len() * 2, 0);
        }
    }

    /// `SetDllDirectoryW(dir)` until dropped, then the previous setting.
    pub(super) struct LoaderScope {
        previous: Option<Vec<u16>>,
        active: bool,
    }

    impl LoaderScope {
        pub(super) fn enter(dir: Option<&Path>) -> Self {
            let inactive = Self {
                previous: None,
                active: false,
            };
            let Some(dir) = dir else {
                return inactive;
            };
            let previous = dll_directory();
            let wide: Vec<u16> = dir.as_os_str().encode_wide().chain(Some(0)).collect();
            if let Err(reason) = set_dll_directory(Some(&wide)) {
                log::warn!(
                    "[gtdrive] cannot add {} to the DLL search path: {}",
                    dir.display(),
                    reason
                );
                return inactive;
            }
            Self {
                previous,
                active: true,
            }
        }
    }

    impl Drop for LoaderScope {
        fn drop(&mut self) {
            if self.active {
                if let Err(reason) = set_dll_directory(self.previous.as_deref()) {
                    log::warn!("[gtdrive] cannot restore the DLL search path: {}", reason);
                }
            }
        }
    }

    /// Current `SetDllDirectoryW` value, NUL-terminated; `None` when unset.
    pub(super) fn dll_directory() -> Option<Vec<u16>> {
        // SAFETY: a zero-length query only returns the required size.
        let needed = unsafe { GetDllDirectoryW(0, std::ptr::null_mut()) };
        if needed == 0 {
            return None;
        }
        let mut buffer = vec![0u16; needed as usize];
        // SAFETY: buffer is valid for `needed` UTF-16 units.
        let len = unsafe { GetDllDirectoryW(needed, buffer.as_mut_ptr()) } as usize;
        if len == 0 || len >= buffer.len() {
            return None;
        }
        buffer.truncate(len);
        buffer.push(0);
        Some(buffer)
    }

    /// `None` restores the default search order.
    pub(super) fn set_dll_directory(wide: Option<&[u16]>) -> Result<(), String> {
        let ptr = wide.map_or(std::ptr::null(), <[u16]>::as_ptr);
        // SAFETY: ptr is null or a NUL-terminated buffer outliving the call.
        if unsafe { SetDllDirectoryW(ptr) } == 0 {
            return Err(format!(
                "SetDllDirectoryW failed: {}",
                std::io::Error::last_os_error()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_missing_glibc() {
        let message = "/tmp/x/libgtdrive_fmi.so: libpolicy_core.so.2: cannot open shared object file: No such file or directory";
        assert_eq!(parse_missing(message), vec!["libpolicy_core.so.2".to_string()]);
    }

    #[test]
    fn test_parse_missing_dyld() {
        let message = "dlopen(/tmp/x/gtdrive_fmi.dylib, 0x0005): Library not loaded: @rpath/libcore.dylib\n  Referenced from: /tmp/x/gtdrive_fmi.dylib\n  Reason: tried: '/tmp/x/libcore.dylib' (no such file)";
        assert_eq!(parse_missing(message), vec!["@rpath/libcore.dylib".to_string()]);
    }

    #[test]
    fn test_parse_missing_windows_is_empty() {
        assert!(parse_missing("LoadLibraryExW failed").is_empty());
    }

    #[test]
    fn test_register_dedup() {
        let dir = tempfile::tempdir().expect("tempdir");
        register(dir.path());
        register(dir.path());
        let hits = registered()
            .iter()
            .filter(|known| known.as_path() == dir.path())
            .count();
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_locate_in_registered_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = libloading::library_filename("gtdrive_locate_fixture");
        std::fs::write(dir.path().join(&file), b"stub").expect("write");
        register(dir.path());

        assert_eq!(
            locate(Path::new("gtdrive_locate_fixture")),
            Some(dir.path().join(&file))
        );
        assert_eq!(locate(Path::new("gtdrive_absent_fixture")), None);
    }

    #[test]
    fn test_install_dir_registered_once() {
        let first = register_install_dir();
        let second = register_install_dir();
        assert_eq!(first, second);
        if let Some(dir) = first {
            assert!(registered().iter().any(|known| known == dir));
        }
    }

    #[test]
    fn test_load_library_rejects_non_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("not_a_library.so");
        std::fs::write(&path, b"plain text").expect("write");
        let err = load_library(&path).unwrap_err();
        assert!(matches!(err, LoadError::InvalidImage { .. }));
        assert_eq!(err.exit_code(), 6);
    }

    #[cfg(windows)]
    #[test]
    fn test_loader_scope_restores_host_directory() {
        use std::os::windows::ffi::OsStrExt;

        let host = tempfile::tempdir().expect("tempdir");
        let install = tempfile::tempdir().expect("tempdir");
        let wide = |path: &Path| -> Vec<u16> {
            path.as_os_str().encode_wide().chain(Some(0)).collect()
        };
        platform::set_dll_directory(Some(&wide(host.path()))).expect("set host dir");
        {
            let _scope = platform::LoaderScope::enter(Some(install.path()));
            assert_eq!(platform::dll_directory(), Some(wide(install.path())));
        }
        assert_eq!(platform::dll_directory(), Some(wide(host.path())));
        platform::set_dll_directory(None).expect("clear");
        assert_eq!(platform::dll_directory(), None);
    }

    /// Builds `libgtdrive_fixture_dep.so` and a dependent
    /// `libgtdrive_fixture_user.so` with the system C compiler.
    /// Returns `None` when no compiler is available.
    #[cfg(target_os = "linux")]
    fn build_dependent_pair(dir: &Path) -> Option<PathBuf> {
        use std::process::Command;

        std::fs::write(dir.join("dep.c"), "int gtdrive_fixture_dep(void) { return 7; }\n").ok()?;
        std::fs::write(
            dir.join("user.c"),
            "int gtdrive_fixture_dep(void);\nint gtdrive_fixture_user(void) { return gtdrive_fixture_dep(); }\n",
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
            "-shared", "-fPIC", "-Wl,-soname,libgtdrive_fixture_dep.so",
            "-o", "libgtdrive_fixture_dep.so", "dep.c",
        ]) && cc(&[
            "-shared", "-fPIC", "-o", "libgtdrive_fixture_user.so", "user.c",
            "-L.", "-lgtdrive_fixture_dep",
        ]);
        built.then(|| dir.join("libgtdrive_fixture_user.so"))
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_registered_dependency_is_preloaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let Some(user) = build_dependent_pair(dir.path()) else {
            eprintln!("[!] no C compiler, skipping");
            return;
        };

        match load_library(&user) {
            Err(LoadError::MissingDependency { missing, .. }) => {
                assert_eq!(missing, vec!["libgtdrive_fixture_dep.so".to_string()]);
            }
            other => panic!("expected MissingDependency, got {:?}", other.map(|_| ())),
        }

        register(dir.path());
        let library = load_library(&user).expect("dependency preloaded from registered dir");
        // SAFETY: the fixture exports `int gtdrive_fixture_user(void)`.
        let value = unsafe {
            let entry = library
                .get::<unsafe extern "C" fn() -> i32>(b"gtdrive_fixture_user")
                .expect("symbol");
            entry()
        };
        assert_eq!(value, 7);
    }

    #[test]
    fn test_platform_dir_known() {
        if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
            assert_eq!(platform_dir(), "linux64");
        }
        if cfg!(all(windows, target_arch = "x86_64")) {
            assert_eq!(platform_dir(), "win64");
        }
    }
}
