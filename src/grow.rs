//! Fallible growth helpers for protocol buffers.
//!
//! Every resize in the session core can fail; allocation failure maps
//! to [`ErrorSet::BAD_ALLOC`] and leaves the container at its prior
//! length so callers can roll back to a consistent state.

use crate::error::ErrorSet;

#[inline]
pub(crate) fn try_push<T>(vec: &mut Vec<T>, value: T) -> Result<(), ErrorSet> {
    vec.try_reserve(1).map_err(|_| ErrorSet::BAD_ALLOC)?;
    vec.push(value);
    Ok(())
}

pub(crate) fn try_resize_with<T, F>(
    vec: &mut Vec<T>,
    new_len: usize,
    fill: F,
) -> Result<(), ErrorSet>
where
    F: FnMut() -> T,
{
    if new_len > vec.len() {
        vec.try_reserve(new_len - vec.len())
            .map_err(|_| ErrorSet::BAD_ALLOC)?;
    }
    vec.resize_with(new_len, fill);
    Ok(())
}

pub(crate) fn try_extend<T>(vec: &mut Vec<T>, mut items: Vec<T>) -> Result<(), ErrorSet> {
    vec.try_reserve(items.len()).map_err(|_| ErrorSet::BAD_ALLOC)?;
    vec.append(&mut items);
    Ok(())
}

pub(crate) fn try_copied(bytes: &[u8]) -> Result<Vec<u8>, ErrorSet> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(bytes.len())
        .map_err(|_| ErrorSet::BAD_ALLOC)?;
    vec.extend_from_slice(bytes);
    Ok(vec)
}

pub(crate) fn try_zeroed(len: usize) -> Result<Vec<u8>, ErrorSet> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len).map_err(|_| ErrorSet::BAD_ALLOC)?;
    vec.resize(len, 0);
    Ok(vec)
}
