//! Executable memory for generated code.
//!
//! Pages are mapped read+write, filled, then flipped to read+execute. A region is never
//! writable and executable at the same time: the two states are separate types and
//! [`WritableRegion::finalize`] consumes the writable one.
//!
//! ```text
//! allocate(size) ──> WritableRegion ──finalize──> ExecutableRegion ──drop/release──> unmapped
//!                         │
//!                         └──drop──> unmapped
//! ```
//!
//! Only unix hosts are supported; elsewhere allocation fails with
//! [`AllocationError::Unsupported`].

use std::ptr::NonNull;
use std::sync::OnceLock;

use tracing::debug;

use crate::errors::AllocationError;

/// The host page size in bytes.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(sys::page_size)
}

/// Rounds `size` up to a whole number of pages.
fn round_to_pages(size: usize) -> Option<usize> {
    let page = page_size();
    size.checked_add(page - 1).map(|padded| padded / page * page)
}

/// Freshly mapped, zero-filled, writable pages.
#[derive(Debug)]
pub struct WritableRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl WritableRegion {
    /// Maps at least `size` bytes, rounded up to the page size.
    ///
    /// # Errors
    /// `Empty` for `size == 0`, `Map` if the kernel refuses the mapping, `Unsupported` on
    /// hosts without `mmap`.
    pub fn allocate(size: usize) -> Result<Self, AllocationError> {
        if size == 0 {
            return Err(AllocationError::Empty);
        }
        let len = round_to_pages(size).ok_or_else(|| AllocationError::Map {
            size,
            source: std::io::Error::from(std::io::ErrorKind::OutOfMemory),
        })?;
        let ptr = sys::map(len).map_err(|err| match err {
            sys::Error::Unsupported => AllocationError::Unsupported,
            sys::Error::Os(source) => AllocationError::Map { size: len, source },
        })?;
        debug!(event = "region_allocate", size = len);
        Ok(Self { ptr, len })
    }

    /// Mapped size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is `len` bytes, readable and writable, and owned by `self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Makes the region executable and read-only.
    ///
    /// On failure the pages are released and the error returned.
    pub fn finalize(self) -> Result<ExecutableRegion, AllocationError> {
        sys::protect_exec(self.ptr, self.len).map_err(|err| match err {
            sys::Error::Unsupported => AllocationError::Unsupported,
            sys::Error::Os(source) => AllocationError::Protect {
                size: self.len,
                source,
            },
        })?;
        sys::flush_icache(self.ptr, self.len);
        debug!(event = "region_finalize", size = self.len);

        let region = ExecutableRegion {
            ptr: self.ptr,
            len: self.len,
        };
        std::mem::forget(self);
        Ok(region)
    }
}

impl Drop for WritableRegion {
    fn drop(&mut self) {
        sys::unmap(self.ptr, self.len);
        debug!(event = "region_release", size = self.len);
    }
}

/// Read-only, executable pages holding finished code.
#[derive(Debug)]
pub struct ExecutableRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the pages are immutable after finalize; sharing the address is sound.
unsafe impl Send for ExecutableRegion {}
unsafe impl Sync for ExecutableRegion {}

impl ExecutableRegion {
    /// Address of the first byte of code.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Unmaps the region. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ExecutableRegion {
    fn drop(&mut self) {
        sys::unmap(self.ptr, self.len);
        debug!(event = "region_release", size = self.len);
    }
}

#[cfg(unix)]
mod sys {
    use std::io;
    use std::ptr::{self, NonNull};

    pub enum Error {
        #[allow(dead_code)]
        Unsupported,
        Os(io::Error),
    }

    pub fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).ok().filter(|&s| s > 0).unwrap_or(4096)
    }

    pub fn map(len: usize) -> Result<NonNull<u8>, Error> {
        // SAFETY: anonymous private mapping, no existing memory is touched.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::Os(io::Error::last_os_error()));
        }
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| Error::Os(io::Error::last_os_error()))
    }

    pub fn protect_exec(ptr: NonNull<u8>, len: usize) -> Result<(), Error> {
        // SAFETY: `ptr..ptr+len` is a mapping created by `map`.
        let result = unsafe {
            libc::mprotect(
                ptr.as_ptr().cast(),
                len,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if result != 0 {
            return Err(Error::Os(io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn unmap(ptr: NonNull<u8>, len: usize) {
        // SAFETY: `ptr..ptr+len` is a mapping created by `map` and unmapped only once.
        unsafe {
            libc::munmap(ptr.as_ptr().cast(), len);
        }
    }

    #[cfg(all(target_arch = "aarch64", target_os = "macos"))]
    pub fn flush_icache(ptr: NonNull<u8>, len: usize) {
        extern "C" {
            fn sys_icache_invalidate(start: *mut libc::c_void, len: libc::size_t);
        }
        // SAFETY: the range is mapped.
        unsafe { sys_icache_invalidate(ptr.as_ptr().cast(), len) }
    }

    #[cfg(all(target_arch = "aarch64", not(target_os = "macos")))]
    pub fn flush_icache(ptr: NonNull<u8>, len: usize) {
        extern "C" {
            fn __clear_cache(start: *mut libc::c_char, end: *mut libc::c_char);
        }
        let start = ptr.as_ptr().cast::<libc::c_char>();
        // SAFETY: the range is mapped; `end` is one past its last byte.
        unsafe { __clear_cache(start, start.add(len)) }
    }

    // instruction and data caches are coherent
    #[cfg(not(target_arch = "aarch64"))]
    pub fn flush_icache(_ptr: NonNull<u8>, _len: usize) {}
}

#[cfg(not(unix))]
mod sys {
    use std::ptr::NonNull;

    pub enum Error {
        Unsupported,
        #[allow(dead_code)]
        Os(std::io::Error),
    }

    pub fn page_size() -> usize {
        4096
    }

    pub fn map(_len: usize) -> Result<NonNull<u8>, Error> {
        Err(Error::Unsupported)
    }

    pub fn protect_exec(_ptr: NonNull<u8>, _len: usize) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    pub fn unmap(_ptr: NonNull<u8>, _len: usize) {}

    pub fn flush_icache(_ptr: NonNull<u8>, _len: usize) {}
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_page_rounding() {
        let page = page_size();
        assert!(page.is_power_of_two());
        assert_eq!(WritableRegion::allocate(1).unwrap().len(), page);
        assert_eq!(WritableRegion::allocate(page).unwrap().len(), page);
        assert_eq!(WritableRegion::allocate(page + 1).unwrap().len(), 2 * page);
        assert_eq!(round_to_pages(usize::MAX), None);
    }

    #[test]
    fn test_empty_region() {
        assert!(matches!(
            WritableRegion::allocate(0),
            Err(AllocationError::Empty)
        ));
    }

    #[test]
    fn test_zero_filled() {
        let mut region = WritableRegion::allocate(100).unwrap();
        assert!(region.as_mut_slice().iter().all(|&b| b == 0));
        region.as_mut_slice()[..4].copy_from_slice(&[1, 2, 3, 4]);
        let exec = region.finalize().unwrap();
        assert!(!exec.is_empty());
        exec.release();
    }

    /// Machine code for `fn() -> i32 { 42 }` on the host, if the host is covered.
    fn return_42() -> Option<Vec<u8>> {
        if cfg!(target_arch = "x86_64") {
            // mov eax, 42; ret
            Some(vec![0xb8, 42, 0, 0, 0, 0xc3])
        } else if cfg!(target_arch = "aarch64") {
            // mov w0, #42; ret
            Some(
                [0x5280_0540u32, 0xd65f_03c0]
                    .iter()
                    .flat_map(|word| word.to_le_bytes())
                    .collect(),
            )
        } else {
            None
        }
    }

    #[test]
    fn test_run_finalized_code() {
        let Some(code) = return_42() else {
            return;
        };
        let mut region = WritableRegion::allocate(code.len()).unwrap();
        region.as_mut_slice()[..code.len()].copy_from_slice(&code);
        let exec = region.finalize().unwrap();

        // SAFETY: the region holds a complete function with this signature.
        let f: extern "C" fn() -> i32 = unsafe { std::mem::transmute(exec.as_ptr()) };
        assert_eq!(f(), 42);
        assert_eq!(f(), 42);
    }
}
