/// Splits `payload` into chunks of at most `mtu` bytes, preserving order,
/// for sequential write-without-response delivery to the command
/// characteristic. `mtu` must be non-zero.
#[must_use]
pub fn chunk_for_mtu(payload: &[u8], mtu: usize) -> Vec<&[u8]> {
    assert!(mtu > 0, "mtu must be non-zero");
    payload.chunks(mtu).collect()
}
