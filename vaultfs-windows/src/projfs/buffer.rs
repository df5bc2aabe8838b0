//! RAII wrapper for platform-aligned buffers.
//!
//! Buffers handed to `PrjWriteFileData` must come from the platform's own
//! allocator. Pairing the allocation with a `Drop` release keeps every exit
//! path balanced; this is the only memory the provider obtains from the
//! platform.

use vaultfs_core::error::VaultError;
use windows::Win32::Storage::ProjectedFileSystem::{
    PrjAllocateAlignedBuffer, PrjFreeAlignedBuffer, PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT,
};

pub struct AlignedBuffer {
    ptr: *mut u8,
    len: usize,
}

impl AlignedBuffer {
    /// Allocates `size` bytes through the platform allocator.
    pub fn allocate(
        context: PRJ_NAMESPACE_VIRTUALIZATION_CONTEXT,
        size: usize,
    ) -> Result<AlignedBuffer, VaultError> {
        let ptr = unsafe { PrjAllocateAlignedBuffer(context, size) };
        if ptr.is_null() {
            Err(VaultError::OutOfMemory { requested: size })
        } else {
            Ok(AlignedBuffer {
                ptr: ptr.cast(),
                len: size,
            })
        }
    }
}

impl std::ops::Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl std::ops::DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe {
            PrjFreeAlignedBuffer(self.ptr.cast());
        }
    }
}
