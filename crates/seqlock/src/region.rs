//! Memory that hosts a seqlock: an in-process buffer or a named POSIX shared
//! memory object.
//!
//! A named region is created by the first process that claims its name and
//! attached to by every later process asking for the same name and size. Only
//! the creator unlinks the name on teardown.

use crate::errors::SeqLockError;
use crate::header::{HEADER_LEN, Header, Layout};
use crate::{name, page};
use memmap2::MmapMut;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap, shm_open, shm_unlink};
use nix::sys::stat::Mode;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU64;

enum Backing {
    /// Process-local buffer; unmapped when the `MmapMut` drops.
    Anonymous(MmapMut),
    /// `shm_open` object mapped `MAP_SHARED`.
    Named { name: String, creator: bool },
}

pub struct SharedRegion {
    base: NonNull<u8>,
    layout: Layout,
    backing: Backing,
    released: bool,
}

// All access to the mapped bytes goes through atomics.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Allocate a process-local region able to hold `payload_size` bytes.
    pub fn anonymous(payload_size: usize) -> Result<Self, SeqLockError> {
        let total = total_size(payload_size)?;
        let buffer = MmapMut::map_anon(total).map_err(|source| SeqLockError::Mapping {
            name: "<anonymous>".to_string(),
            len: total,
            source,
        })?;
        Self::from_buffer(buffer)
    }

    /// Wrap a caller-allocated buffer. The whole buffer becomes the region:
    /// header first, payload after it.
    ///
    /// The buffer is consumed: the region owns it from here on and unmaps it
    /// when destroyed or dropped. Callers that need the bytes afterwards read
    /// them through a `SeqLock` over the region.
    ///
    /// The buffer length must be a page multiple larger than the header. A
    /// buffer without a header is initialized with the counter reset to zero;
    /// a buffer that already carries a header is accepted only if its header
    /// length matches.
    pub fn from_buffer(mut buffer: MmapMut) -> Result<Self, SeqLockError> {
        let page_size = page::page_size()?;
        if buffer.len() % page_size != 0 {
            return Err(SeqLockError::InvalidBuffer(
                "buffer length must be a multiple of the page size",
            ));
        }
        let layout = Layout::for_total(buffer.len())?;

        let base = NonNull::new(buffer.as_mut_ptr())
            .ok_or(SeqLockError::InvalidBuffer("buffer pointer is null"))?;
        if base.as_ptr().align_offset(std::mem::align_of::<Header>()) != 0 {
            return Err(SeqLockError::InvalidBuffer(
                "buffer must be aligned to the header alignment",
            ));
        }

        let region = Self {
            base,
            layout,
            backing: Backing::Anonymous(buffer),
            released: false,
        };
        region.header().adopt()?;

        tracing::debug!("Anonymous region of {} bytes ready", layout.total());
        Ok(region)
    }

    /// Create the shared memory object `name`, or attach to it if another
    /// process already created it.
    ///
    /// Both sides compute the object size as
    /// `round_up_to_page(HEADER_LEN + payload_size)`; an attacher fails with
    /// `SizeMismatch` if the existing object has any other size.
    pub fn create(name: &str, payload_size: usize) -> Result<Self, SeqLockError> {
        name::validate(name)?;
        let total = total_size(payload_size)?;
        let layout = Layout::for_total(total)?;

        let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IWGRP;
        let (fd, creator) = match shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            mode,
        ) {
            Ok(fd) => (fd, true),
            Err(Errno::EEXIST) => {
                let fd = shm_open(name, OFlag::O_RDWR, mode)
                    .map_err(|e| SeqLockError::os("shm_open", name, e))?;
                (fd, false)
            }
            Err(e) => return Err(SeqLockError::os("shm_open", name, e)),
        };
        let file = File::from(fd);

        if creator {
            if let Err(source) = file.set_len(total as u64) {
                unlink_after_failure(name);
                return Err(SeqLockError::ObjectCreate {
                    op: "ftruncate",
                    name: name.to_string(),
                    source,
                });
            }
        } else {
            let actual = file
                .metadata()
                .map_err(|source| SeqLockError::ObjectCreate {
                    op: "fstat",
                    name: name.to_string(),
                    source,
                })?
                .len();
            if actual != total as u64 {
                return Err(SeqLockError::SizeMismatch {
                    expected: total,
                    actual: usize::try_from(actual).unwrap_or(usize::MAX),
                });
            }
        }

        let base = match map_shared(&file, total) {
            Ok(base) => base,
            Err(errno) => {
                if creator {
                    unlink_after_failure(name);
                }
                return Err(SeqLockError::Mapping {
                    name: name.to_string(),
                    len: total,
                    source: errno.into(),
                });
            }
        };
        // The mapping outlives the descriptor.
        drop(file);

        let region = Self {
            base,
            layout,
            backing: Backing::Named {
                name: name.to_string(),
                creator,
            },
            released: false,
        };

        if creator {
            region.header().initialize();
        } else {
            // Dropping `region` on failure unmaps without unlinking.
            region.header().verify()?;
        }

        tracing::info!(
            "{} shared memory {} ({} bytes, payload {})",
            if creator { "Created" } else { "Attached to" },
            name,
            total,
            region.size()
        );
        Ok(region)
    }

    /// Create a named region under a freshly generated name.
    pub fn create_unique(payload_size: usize) -> Result<Self, SeqLockError> {
        Self::create(&name::unique_name(), payload_size)
    }

    /// Payload capacity in bytes: region length minus the header.
    pub fn size(&self) -> usize {
        self.layout.payload_len()
    }

    /// Total mapped length, always a page multiple.
    pub fn mapped_len(&self) -> usize {
        self.layout.total()
    }

    /// The shared memory name, `None` for anonymous regions.
    pub fn name(&self) -> Option<&str> {
        match &self.backing {
            Backing::Anonymous(_) => None,
            Backing::Named { name, .. } => Some(name),
        }
    }

    /// True if this process created the backing object (always true for
    /// anonymous regions).
    pub fn is_creator(&self) -> bool {
        match &self.backing {
            Backing::Anonymous(_) => true,
            Backing::Named { creator, .. } => *creator,
        }
    }

    pub(crate) fn header(&self) -> &Header {
        // Safety: `base` is valid for `layout.total()` bytes, aligned to
        // `Header` (page aligned for named regions, checked for buffers), and
        // `Header` consists of atomics plus padding that is never read.
        unsafe { &*(self.base.as_ptr() as *const Header) }
    }

    pub(crate) fn payload(&self) -> &[AtomicU64] {
        // Safety: `Layout::for_total` guarantees the payload lies inside the
        // mapping and is a whole number of words; the offset keeps it 8-byte
        // aligned.
        unsafe {
            std::slice::from_raw_parts(
                self.base
                    .as_ptr()
                    .add(self.layout.payload_offset())
                    .cast::<AtomicU64>(),
                self.layout.payload_words(),
            )
        }
    }

    /// Unmap the region and, for the creator of a named region, unlink the
    /// name so no later process can attach to it.
    ///
    /// Attachers only unmap; their teardown never touches the name.
    pub fn destroy(mut self) -> Result<(), SeqLockError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), SeqLockError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let Backing::Named { name, creator } = &self.backing else {
            return Ok(());
        };

        // Safety: `base`/`len` describe a live mapping created in `create`;
        // `released` keeps this from running twice and `&mut self` means no
        // views into the region are alive.
        let unmapped = unsafe { munmap(self.base.cast(), self.layout.total()) }.map_err(|e| {
            SeqLockError::Unmap {
                name: name.clone(),
                source: e.into(),
            }
        });

        // Unlink even if unmapping failed so the name is not leaked.
        let unlinked = if *creator {
            shm_unlink(name.as_str()).map_err(|e| SeqLockError::Unlink {
                name: name.clone(),
                source: e.into(),
            })
        } else {
            Ok(())
        };

        tracing::info!(
            "Released shared memory {} ({})",
            name,
            if *creator { "unlinked" } else { "detached" }
        );

        unmapped.and(unlinked)
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Failed to tear down shared memory region on drop: {}", e);
        }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name())
            .field("creator", &self.is_creator())
            .field("mapped_len", &self.mapped_len())
            .field("size", &self.size())
            .finish()
    }
}

/// `round_up_to_page(HEADER_LEN + payload_size)`.
pub fn total_size(payload_size: usize) -> Result<usize, SeqLockError> {
    let page_size = page::page_size()?;
    let with_header =
        payload_size
            .checked_add(HEADER_LEN)
            .ok_or(SeqLockError::PageRoundingOverflow {
                size: payload_size,
                page_size,
            })?;
    let total = page::round_up(with_header, page_size)?;
    tracing::debug!(
        "Payload of {} bytes needs a {} byte region",
        payload_size,
        total
    );
    Ok(total)
}

fn map_shared(file: &File, len: usize) -> Result<NonNull<u8>, Errno> {
    let len = NonZeroUsize::new(len).ok_or(Errno::EINVAL)?;
    // Safety: fresh mapping chosen by the kernel, nothing else aliases it yet.
    let ptr = unsafe {
        mmap(
            None,
            len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
            file,
            0,
        )
    }?;
    Ok(ptr.cast())
}

fn unlink_after_failure(name: &str) {
    if let Err(e) = shm_unlink(name) {
        tracing::warn!("Failed to unlink {} after a failed create: {}", name, e);
    }
}
