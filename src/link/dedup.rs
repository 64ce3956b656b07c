use crate::protocol::MessageHeader;

/// Verdict for one inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    /// First sighting of this sender and sequence
    Unique,
    /// Same sequence as the last one accepted from this sender
    Duplicate,
    /// No recognisable header, so nothing to compare
    Unchecked,
}

/// Last accepted sequence number per originating system.
///
/// Only the immediately preceding value is remembered, so an 8-bit wrap
/// (255 then 0) is never mistaken for a repeat, while a duplicate arriving
/// after another message from the same sender goes undetected.
#[derive(Debug, Clone)]
pub struct DedupTable {
    last_seen: [Option<u8>; 256],
    duplicates: u64,
}

impl Default for DedupTable {
    fn default() -> Self {
        DedupTable {
            last_seen: [None; 256],
            duplicates: 0,
        }
    }
}

impl DedupTable {
    pub fn new() -> Self {
        DedupTable::default()
    }

    /// Records `sequence` for `system_id` unless it repeats the last one
    pub fn check(&mut self, system_id: u8, sequence: u8) -> DedupVerdict {
        let slot = &mut self.last_seen[system_id as usize];
        if *slot == Some(sequence) {
            self.duplicates += 1;
            return DedupVerdict::Duplicate;
        }
        *slot = Some(sequence);
        DedupVerdict::Unique
    }

    /// Checks a payload by its encapsulated header
    pub fn check_payload(&mut self, payload: &[u8]) -> DedupVerdict {
        match MessageHeader::parse(payload) {
            Some(header) => self.check(header.system_id, header.sequence),
            None => DedupVerdict::Unchecked,
        }
    }

    pub fn last_sequence(&self, system_id: u8) -> Option<u8> {
        self.last_seen[system_id as usize]
    }

    /// Duplicates dropped so far
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }
}
