//! Correlation keys joining raw video chunks to decoded images.
//!
//! A [`MessageKey`] is derived from a message's log time and channel topic.
//! The same message produces the same key in the demux pass and in the
//! rewrite pass, which is how a decoded still image finds its way back to
//! the message it came from.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Width of the zero-padded timestamp prefix in [`MessageKey::file_name`].
///
/// `u64::MAX` has 20 decimal digits.
const TIMESTAMP_WIDTH: usize = 20;

/// Longest file name most filesystems accept, in bytes.
const MAX_FILE_NAME_BYTES: usize = 255;

/// Hex digits of the topic digest kept in shortened file names.
const DIGEST_WIDTH: usize = 32;

/// Identity of one log message, unique within a restore run.
///
/// Kept as a structured `(log_time, topic)` pair so that equality never
/// depends on how the two parts would be glued into a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    /// Message log time in nanoseconds.
    pub log_time: u64,
    /// Channel topic.
    pub topic: String,
}

impl MessageKey {
    /// Build the key for a message.
    pub fn new(log_time: u64, topic: impl Into<String>) -> Self {
        Self {
            log_time,
            topic: topic.into(),
        }
    }

    /// Render the key as a flat, filesystem-safe file name.
    ///
    /// The timestamp is zero-padded to a fixed width and the topic is
    /// percent-escaped, so distinct keys always map to distinct names.
    ///
    /// Names never exceed 255 bytes. When the escaped topic is too long it
    /// is cut short and followed by `~` and a BLAKE3 digest of the full
    /// topic; `~` is escaped everywhere else, so shortened names cannot
    /// collide with regular ones.
    pub fn file_name(&self) -> String {
        let mut name = format!("{:0width$}", self.log_time, width = TIMESTAMP_WIDTH);
        name.reserve(self.topic.len() + 1);
        name.push('-');
        for character in self.topic.chars() {
            match character {
                '/' => name.push_str("%2F"),
                '%' => name.push_str("%25"),
                '\\' => name.push_str("%5C"),
                ':' => name.push_str("%3A"),
                '~' => name.push_str("%7E"),
                other => name.push(other),
            }
        }

        if name.len() > MAX_FILE_NAME_BYTES {
            let digest = blake3::hash(self.topic.as_bytes()).to_hex();
            let mut cut = MAX_FILE_NAME_BYTES - DIGEST_WIDTH - 1;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            name.truncate(cut);
            name.push('~');
            name.push_str(&digest.as_str()[..DIGEST_WIDTH]);
        }
        name
    }
}

impl Display for MessageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}@{}", self.topic, self.log_time)
    }
}
