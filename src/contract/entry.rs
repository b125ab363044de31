use bytes::Bytes;

/// TTL value meaning "never expires".
pub const NO_TTL: i64 = 0;

/// An entry as seen through the storage contract.
///
/// `ttl` is in whole seconds; any value `<= 0` means the entry never
/// expires. `version` is 0 for an entry that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub key: Bytes,
    pub value: Bytes,
    pub ttl: i64,
    pub version: u64,
}

impl RawEntry {
    /// Placeholder handed to a transaction when the key is absent.
    pub fn empty(key: Bytes) -> Self {
        Self {
            key,
            value: Bytes::new(),
            ttl: NO_TTL,
            version: 0,
        }
    }

    /// Returns true if the entry carries an expiry.
    pub fn has_ttl(&self) -> bool {
        self.ttl > 0
    }
}
