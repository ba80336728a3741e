// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging for the FMI shim.
//!
//! Two sinks:
//!
//! - the process-wide `log` backend (`env_logger`, filter from `GTDRIVE_LOG`,
//!   default `warn`), initialised once on first instantiation;
//! - the host's `fmi2CallbackLogger`, per instance, when `loggingOn` is set.

use std::ffi::{CStr, CString};
use std::sync::Once;

use gtdrive::fmi2::{Fmi2CallbackLogger, Fmi2ComponentEnvironment, Fmi2Status};

/// Environment variable holding the `env_logger` filter.
pub const LOG_ENV: &str = "GTDRIVE_LOG";

pub(crate) fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env = env_logger::Env::new().filter_or(LOG_ENV, "warn");
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .try_init();
    });
}

/// Forwards messages to the host logger of one instance.
pub(crate) struct HostLogger {
    callback: Fmi2CallbackLogger,
    environment: Fmi2ComponentEnvironment,
    instance_name: CString,
    enabled: bool,
}

// SAFETY: the environment pointer is only handed back to the host's logger,
// which the FMI standard requires to accept calls from the stepping thread.
unsafe impl Send for HostLogger {}

impl HostLogger {
    pub(crate) fn new(
        callback: Fmi2CallbackLogger,
        environment: Fmi2ComponentEnvironment,
        instance_name: &str,
        enabled: bool,
    ) -> Self {
        Self {
            callback,
            environment,
            instance_name: to_cstring(instance_name),
            enabled,
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Log through `log` and, if enabled, the host callback.
    ///
    /// Errors and fatals reach the host even with logging disabled.
    pub(crate) fn emit(&self, status: Fmi2Status, message: &str) {
        match status {
            Fmi2Status::Ok | Fmi2Status::Pending => log::debug!("[gtdrive-fmi] {}", message),
            Fmi2Status::Warning | Fmi2Status::Discard => log::warn!("[gtdrive-fmi] {}", message),
            Fmi2Status::Error | Fmi2Status::Fatal => log::error!("[gtdrive-fmi] {}", message),
        }
        if self.should_forward(status) {
            self.forward(status, status.category(), message);
        }
    }

    fn should_forward(&self, status: Fmi2Status) -> bool {
        self.enabled || status >= Fmi2Status::Error
    }

    fn forward(&self, status: Fmi2Status, category: &CStr, message: &str) {
        let Some(callback) = self.callback else {
            return;
        };
        let message = to_cstring(message);
        // SAFETY:
        // - all strings are NUL-terminated and live for the duration of the call
        // - the fixed "%s" format keeps message text from being interpreted
        unsafe {
            callback(
                self.environment,
                self.instance_name.as_ptr(),
                status,
                category.as_ptr(),
                c"%s".as_ptr(),
                message.as_ptr(),
            );
        }
    }
}

/// Interior NULs cannot cross the C boundary; replace them.
fn to_cstring(text: &str) -> CString {
    CString::new(text.replace('\0', "\u{FFFD}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cstring_strips_nul() {
        assert_eq!(to_cstring("a\0b").to_str().expect("utf8"), "a\u{FFFD}b");
    }

    #[test]
    fn test_forwarding_respects_flag() {
        let mut logger = HostLogger::new(None, std::ptr::null_mut(), "ego", false);
        assert!(!logger.should_forward(Fmi2Status::Ok));
        assert!(!logger.should_forward(Fmi2Status::Warning));
        assert!(logger.should_forward(Fmi2Status::Error));
        assert!(logger.should_forward(Fmi2Status::Fatal));
        logger.set_enabled(true);
        assert!(logger.should_forward(Fmi2Status::Ok));
        // No callback registered: emitting is a no-op for the host.
        logger.emit(Fmi2Status::Fatal, "format %s %n is never interpreted");
    }
}
