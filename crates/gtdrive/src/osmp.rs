// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OSMP binary variables: a buffer address split across two FMI integers
//! (`base.lo`, `base.hi`) plus an explicit `size`.

use crate::fmi2::Fmi2Integer;

/// One OSMP binary variable triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryVariable {
    pub lo: Fmi2Integer,
    pub hi: Fmi2Integer,
    pub size: Fmi2Integer,
}

impl BinaryVariable {
    /// Describe `buf` (address and length); the slice must outlive every reader.
    pub fn describe(buf: &[u8]) -> Self {
        let (lo, hi) = split_pointer(buf.as_ptr());
        Self {
            lo,
            hi,
            size: Fmi2Integer::try_from(buf.len()).unwrap_or(Fmi2Integer::MAX),
        }
    }

    pub fn pointer(&self) -> *const u8 {
        join_pointer(self.lo, self.hi)
    }

    /// `None` when the size is negative.
    pub fn len(&self) -> Option<usize> {
        usize::try_from(self.size).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Borrow the described bytes.
    ///
    /// # Safety
    /// `pointer()` must reference at least `size` readable bytes for `'a`.
    pub unsafe fn as_slice<'a>(&self) -> Option<&'a [u8]> {
        let len = self.len()?;
        if len == 0 {
            return Some(&[]);
        }
        let ptr = self.pointer();
        if ptr.is_null() {
            return None;
        }
        Some(std::slice::from_raw_parts(ptr, len))
    }
}

/// Split an address into OSMP `(lo, hi)` halves.
pub fn split_pointer(ptr: *const u8) -> (Fmi2Integer, Fmi2Integer) {
    let addr = ptr as usize as u64;
    ((addr & 0xFFFF_FFFF) as u32 as i32, (addr >> 32) as u32 as i32)
}

/// Rebuild an address from OSMP halves; `hi` is ignored on 32-bit targets.
pub fn join_pointer(lo: Fmi2Integer, hi: Fmi2Integer) -> *const u8 {
    let addr = (u64::from(hi as u32) << 32) | u64::from(lo as u32);
    addr as usize as *const u8
}
