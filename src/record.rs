use crate::clock::Millis;

/// Estimated cost of one character of a stored value.
pub const BYTES_PER_CHAR: usize = 2;

/// Fixed estimated cost of one record, independent of its value.
pub const RECORD_OVERHEAD_BYTES: usize = 64;

/// Timestamps of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Metadata {
    /// When the value was inserted, in ms since the UNIX epoch.
    pub created_at: Millis,
    /// When the value stops being readable, in ms since the UNIX epoch.
    pub expires_at: Millis,
}

pub(crate) struct Record {
    value: String,
    created_at: Millis,
    expires_at: Millis,
}

impl Record {
    pub fn new(value: String, created_at: Millis, expires_at: Millis) -> Self {
        Self {
            value,
            created_at,
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Millis {
        self.expires_at
    }

    // created_at is kept.
    pub fn set_expires_at(&mut self, expires_at: Millis) {
        self.expires_at = expires_at;
    }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }

    pub fn is_expired(&self, now: Millis) -> bool {
        self.expires_at <= now
    }

    pub fn approx_bytes(&self) -> usize {
        self.value.chars().count() * BYTES_PER_CHAR + RECORD_OVERHEAD_BYTES
    }
}
