use lotus_hashes::HasherBase;

pub mod sighash;
pub mod sighash_type;
pub mod tx;

pub trait HasherExtensions {
    /// Writes the len as a Bitcoin compact size
    fn write_len(&mut self, len: usize) -> &mut Self;

    /// Writes a single u8
    fn write_u8(&mut self, element: u8) -> &mut Self;

    /// Writes the u32 as a little endian u8 array
    fn write_u32(&mut self, element: u32) -> &mut Self;

    /// Writes the i32 as a little endian u8 array
    fn write_i32(&mut self, element: i32) -> &mut Self;

    /// Writes the u64 as a little endian u8 array
    fn write_u64(&mut self, element: u64) -> &mut Self;

    /// Writes the i64 as a little endian u8 array
    fn write_i64(&mut self, element: i64) -> &mut Self;

    /// Writes the number of bytes followed by the bytes themselves
    fn write_var_bytes(&mut self, bytes: &[u8]) -> &mut Self;
}

/// Fails at compile time if `usize::MAX > u64::MAX`.
/// If `usize` will ever grow larger than `u64`, we need to verify
/// that the lossy conversion below at `write_len` remains precise.
const _: usize = u64::MAX as usize - usize::MAX;

impl<T: HasherBase> HasherExtensions for T {
    #[inline(always)]
    fn write_len(&mut self, len: usize) -> &mut Self {
        match len {
            0..=0xfc => self.update([len as u8]),
            0xfd..=0xffff => self.update([0xfd]).update((len as u16).to_le_bytes()),
            0x10000..=0xffff_ffff => self.update([0xfe]).update((len as u32).to_le_bytes()),
            _ => self.update([0xff]).update((len as u64).to_le_bytes()),
        }
    }

    #[inline(always)]
    fn write_u8(&mut self, element: u8) -> &mut Self {
        self.update(element.to_le_bytes())
    }

    #[inline(always)]
    fn write_u32(&mut self, element: u32) -> &mut Self {
        self.update(element.to_le_bytes())
    }

    #[inline(always)]
    fn write_i32(&mut self, element: i32) -> &mut Self {
        self.update(element.to_le_bytes())
    }

    #[inline(always)]
    fn write_u64(&mut self, element: u64) -> &mut Self {
        self.update(element.to_le_bytes())
    }

    #[inline(always)]
    fn write_i64(&mut self, element: i64) -> &mut Self {
        self.update(element.to_le_bytes())
    }

    #[inline(always)]
    fn write_var_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_len(bytes.len()).update(bytes)
    }
}

/// Collects written bytes instead of hashing them, so the same encoding routines produce
/// the wire serialization.
#[derive(Default)]
pub struct BytesWriter(pub Vec<u8>);

impl HasherBase for BytesWriter {
    fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self {
        self.0.extend_from_slice(data.as_ref());
        self
    }
}

/// Counts written bytes
#[derive(Default)]
pub struct SizeCounter(pub usize);

impl HasherBase for SizeCounter {
    fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self {
        self.0 += data.as_ref().len();
        self
    }
}
