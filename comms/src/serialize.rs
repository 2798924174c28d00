/// Encodes a value into an outgoing frame.
pub trait Serialize<'a> {
    /// Writes the value's header bytes into `buf`.
    ///
    /// # Returns
    /// A trailing slice borrowed from `self` that should be written right after
    /// `buf` without copying, if any.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
