/// Errors raised while parsing a canonical address string.
#[derive(Debug, thiserror::Error)]
pub enum AddressParseError {
    #[error("expected 6 colon-separated segments, found {found} in {input:?}")]
    WrongSegmentCount { found: usize, input: String },

    #[error("segment {segment:?} in {input:?} is not a valid hex byte")]
    InvalidByte { segment: String, input: String },
}
