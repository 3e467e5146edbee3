use bytemuck::Pod;

use crate::error::{MangoError, MangoResult};

/// Serum accounts are framed by these two markers.
pub const SERUM_HEAD_PADDING: &[u8; 5] = b"serum";
#[allow(missing_docs)]
pub const SERUM_TAIL_PADDING: &[u8; 7] = b"padding";

/// Fails with [`MangoError::SizeMismatch`] unless `data` is exactly `expected` bytes long.
pub fn check_size(layout: &'static str, expected: usize, data: &[u8]) -> MangoResult {
    if data.len() != expected {
        return Err(MangoError::SizeMismatch {
            layout,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Views `data` as the fixed layout `T`, failing unless the length is exact.
pub fn cast_layout<'a, T: Pod>(layout: &'static str, data: &'a [u8]) -> MangoResult<&'a T> {
    let expected = std::mem::size_of::<T>();
    check_size(layout, expected, data)?;
    bytemuck::try_from_bytes(data).map_err(|_| MangoError::SizeMismatch {
        layout,
        expected,
        actual: data.len(),
    })
}

/// Returns the body between the serum head and tail markers.
pub fn strip_serum_padding(data: &[u8]) -> MangoResult<&[u8]> {
    let framing = SERUM_HEAD_PADDING.len() + SERUM_TAIL_PADDING.len();
    if data.len() < framing {
        return Err(MangoError::SizeMismatch {
            layout: "serum account",
            expected: framing,
            actual: data.len(),
        });
    }
    if !data.starts_with(SERUM_HEAD_PADDING) {
        return Err(MangoError::WrongAccountHeadPadding);
    }
    if !data.ends_with(SERUM_TAIL_PADDING) {
        return Err(MangoError::WrongAccountTailPadding);
    }
    Ok(&data[SERUM_HEAD_PADDING.len()..data.len() - SERUM_TAIL_PADDING.len()])
}

/// Wraps a serum account body in its head and tail markers.
pub fn add_serum_padding(body: &[u8]) -> Vec<u8> {
    let mut data =
        Vec::with_capacity(body.len() + SERUM_HEAD_PADDING.len() + SERUM_TAIL_PADDING.len());
    data.extend_from_slice(SERUM_HEAD_PADDING);
    data.extend_from_slice(body);
    data.extend_from_slice(SERUM_TAIL_PADDING);
    data
}
