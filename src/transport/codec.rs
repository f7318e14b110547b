//! Wire format of the streaming color-control protocol
//!
//! One datagram carries every pending panel write: a count byte followed by one 7-byte
//! record per panel, `[panel][1][r][g][b][0][1]`.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::{color::Rgb8, PanelId};

/// Size of one panel record on the wire
pub const RECORD_LEN: usize = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty datagram")]
    Empty,
    #[error("datagram announces {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("malformed record for panel {panel}")]
    MalformedRecord { panel: PanelId },
}

/// Panel writes accumulated during one flush window
///
/// Writing the same panel twice keeps only the latest color.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingCommands {
    commands: BTreeMap<PanelId, Rgb8>,
}

impl PendingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, panel: PanelId, color: Rgb8) {
        self.commands.insert(panel, color);
    }

    pub fn get(&self, panel: PanelId) -> Option<Rgb8> {
        self.commands.get(&panel).copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take the pending set, leaving an empty one in its place
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PanelId, Rgb8)> + '_ {
        self.commands.iter().map(|(&panel, &color)| (panel, color))
    }

    /// Encode into `buffer`, replacing its contents
    ///
    /// The count is a single byte, so at most 255 panels fit in one datagram.
    pub fn encode(&self, buffer: &mut Vec<u8>) {
        let count = self.commands.len().min(u8::MAX as usize);

        buffer.clear();
        buffer.reserve(1 + count * RECORD_LEN);
        buffer.push(count as u8);

        for (panel, color) in self.iter().take(count) {
            buffer.extend_from_slice(&[panel, 1, color.red, color.green, color.blue, 0, 1]);
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let (&count, records) = data.split_first().ok_or(CodecError::Empty)?;

        let expected = count as usize * RECORD_LEN;
        if records.len() != expected {
            return Err(CodecError::Truncated {
                expected: expected + 1,
                actual: data.len(),
            });
        }

        let mut result = Self::new();
        for record in records.chunks_exact(RECORD_LEN) {
            match *record {
                [panel, 1, red, green, blue, 0, 1] => {
                    result.set(panel, Rgb8::new(red, green, blue));
                }
                _ => {
                    return Err(CodecError::MalformedRecord { panel: record[0] });
                }
            }
        }

        Ok(result)
    }
}

impl std::iter::FromIterator<(PanelId, Rgb8)> for PendingCommands {
    fn from_iter<I: IntoIterator<Item = (PanelId, Rgb8)>>(iter: I) -> Self {
        let mut result = Self::new();
        for (panel, color) in iter {
            result.set(panel, color);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let pending: PendingCommands = vec![(3, Rgb8::new(10, 20, 30))].into_iter().collect();

        let mut buffer = Vec::new();
        pending.encode(&mut buffer);

        assert_eq!(buffer, vec![1, 3, 1, 10, 20, 30, 0, 1]);
    }

    #[test]
    fn decode_encoded_batch() {
        // Insert in reverse order: the decoded content must not depend on it
        let pending: PendingCommands = vec![(7, Rgb8::new(1, 2, 3)), (3, Rgb8::new(10, 20, 30))]
            .into_iter()
            .collect();

        let mut buffer = Vec::new();
        pending.encode(&mut buffer);

        assert_eq!(buffer[0], 2);
        assert_eq!(buffer.len(), 1 + 2 * RECORD_LEN);

        let decoded = PendingCommands::decode(&buffer).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.get(3), Some(Rgb8::new(10, 20, 30)));
        assert_eq!(decoded.get(7), Some(Rgb8::new(1, 2, 3)));
    }

    #[test]
    fn last_write_wins() {
        let mut pending = PendingCommands::new();
        pending.set(4, Rgb8::new(255, 0, 0));
        pending.set(4, Rgb8::new(0, 0, 255));

        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get(4), Some(Rgb8::new(0, 0, 255)));

        let taken = pending.take();
        assert!(pending.is_empty());
        assert_eq!(taken.len(), 1);
    }

    #[test]
    fn encode_empty() {
        let mut buffer = vec![42; 3];
        PendingCommands::new().encode(&mut buffer);
        assert_eq!(buffer, vec![0]);
    }

    #[test]
    fn decode_errors() {
        assert_eq!(PendingCommands::decode(&[]), Err(CodecError::Empty));
        assert_eq!(
            PendingCommands::decode(&[1, 3, 1, 10]),
            Err(CodecError::Truncated {
                expected: 8,
                actual: 4
            })
        );
        assert_eq!(
            PendingCommands::decode(&[1, 3, 2, 10, 20, 30, 0, 1]),
            Err(CodecError::MalformedRecord { panel: 3 })
        );
    }
}
