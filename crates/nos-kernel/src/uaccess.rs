//! Access to user memory through an address space's translation.
//!
//! Every byte is translated individually; a range is only touched once every
//! byte in it is known to be mapped.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use nos_hal::{AddressTranslator, HAL};

/// A user-space virtual address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct UserPtr {
    addr: u32,
}

impl UserPtr {
    pub const fn new(addr: u32) -> Self {
        Self { addr }
    }

    pub fn addr(self) -> u32 {
        self.addr
    }

    /// Pointer `offset` bytes further on, or `None` on address overflow.
    pub fn offset(self, offset: usize) -> Option<Self> {
        let offset = u32::try_from(offset).ok()?;
        self.addr.checked_add(offset).map(Self::new)
    }
}

impl From<u32> for UserPtr {
    fn from(addr: u32) -> Self {
        Self::new(addr)
    }
}

/// Errors from user memory access
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserAccessError {
    /// Address not mapped in the caller's space
    OutOfRange { vaddr: u32 },
    /// No NUL terminator within the first `limit` bytes
    Unterminated { limit: usize },
    /// Negative buffer length
    BadLength(i32),
    /// String is not valid UTF-8
    InvalidUtf8,
}

impl fmt::Display for UserAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserAccessError::OutOfRange { vaddr } => {
                write!(f, "address {:#x} out of range", vaddr)
            }
            UserAccessError::Unterminated { limit } => {
                write!(f, "string longer than {} bytes", limit)
            }
            UserAccessError::BadLength(len) => write!(f, "bad length {}", len),
            UserAccessError::InvalidUtf8 => f.write_str("invalid utf-8"),
        }
    }
}

/// Validate a user-supplied length register.
pub fn user_len(len: i32) -> Result<usize, UserAccessError> {
    usize::try_from(len).map_err(|_| UserAccessError::BadLength(len))
}

fn translate<H: HAL>(space: &H::Space, ptr: UserPtr) -> Result<usize, UserAccessError> {
    space
        .translate(ptr.addr())
        .ok_or(UserAccessError::OutOfRange { vaddr: ptr.addr() })
}

fn read_byte<H: HAL>(hal: &H, space: &H::Space, ptr: UserPtr) -> Result<u8, UserAccessError> {
    let paddr = translate::<H>(space, ptr)?;
    hal.read_byte(paddr)
        .ok_or(UserAccessError::OutOfRange { vaddr: ptr.addr() })
}

/// Translate every byte of `[ptr, ptr + len)`.
///
/// Returns the physical index of each byte in order. A range longer than
/// the whole space is refused before anything is translated.
pub fn check_range<H: HAL>(
    hal: &H,
    space: &H::Space,
    ptr: UserPtr,
    len: usize,
) -> Result<Vec<usize>, UserAccessError> {
    let size = space.size();
    if len > size {
        let first_unmapped = if ptr.addr() as usize >= size {
            ptr.addr()
        } else {
            u32::try_from(size).unwrap_or(u32::MAX)
        };
        return Err(UserAccessError::OutOfRange {
            vaddr: first_unmapped,
        });
    }
    let mut frames = Vec::with_capacity(len);
    for i in 0..len {
        let at = ptr
            .offset(i)
            .ok_or(UserAccessError::OutOfRange { vaddr: u32::MAX })?;
        let paddr = translate::<H>(space, at)?;
        if paddr >= hal.memory_size() {
            return Err(UserAccessError::OutOfRange { vaddr: at.addr() });
        }
        frames.push(paddr);
    }
    Ok(frames)
}

/// Read a NUL-terminated string of at most `limit` bytes (terminator excluded).
pub fn read_cstr<H: HAL>(
    hal: &H,
    space: &H::Space,
    ptr: UserPtr,
    limit: usize,
) -> Result<String, UserAccessError> {
    let mut bytes = Vec::new();
    for i in 0..=limit {
        let at = ptr
            .offset(i)
            .ok_or(UserAccessError::OutOfRange { vaddr: u32::MAX })?;
        let byte = read_byte(hal, space, at)?;
        if byte == 0 {
            return String::from_utf8(bytes).map_err(|_| UserAccessError::InvalidUtf8);
        }
        bytes.push(byte);
    }
    Err(UserAccessError::Unterminated { limit })
}

/// Copy `len` bytes out of user memory. Nothing is read unless the whole
/// range is mapped.
pub fn copy_from_user<H: HAL>(
    hal: &H,
    space: &H::Space,
    ptr: UserPtr,
    len: usize,
) -> Result<Vec<u8>, UserAccessError> {
    let frames = check_range(hal, space, ptr, len)?;
    frames
        .into_iter()
        .enumerate()
        .map(|(i, paddr)| {
            hal.read_byte(paddr).ok_or(UserAccessError::OutOfRange {
                vaddr: ptr.addr().wrapping_add(i as u32),
            })
        })
        .collect()
}

/// Copy `data` into user memory at `ptr`. Nothing is written unless the
/// whole range is mapped.
pub fn copy_to_user<H: HAL>(
    hal: &H,
    space: &H::Space,
    ptr: UserPtr,
    data: &[u8],
) -> Result<(), UserAccessError> {
    let frames = check_range(hal, space, ptr, data.len())?;
    for (i, (paddr, byte)) in frames.into_iter().zip(data).enumerate() {
        hal.write_byte(paddr, *byte)
            .map_err(|_| UserAccessError::OutOfRange {
                vaddr: ptr.addr().wrapping_add(i as u32),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_ptr_offset() {
        let p = UserPtr::new(10);
        assert_eq!(p.offset(5), Some(UserPtr::new(15)));
        assert_eq!(UserPtr::new(u32::MAX).offset(1), None);
    }

    #[test]
    fn test_user_len() {
        assert_eq!(user_len(8), Ok(8));
        assert_eq!(user_len(0), Ok(0));
        assert_eq!(user_len(-1), Err(UserAccessError::BadLength(-1)));
    }

    #[test]
    fn test_error_display() {
        let e = UserAccessError::OutOfRange { vaddr: 0x100 };
        assert_eq!(alloc::format!("{}", e), "address 0x100 out of range");
    }
}
