//! Compiles a set of byte-level bit patterns into a flat prefix-matching
//! table.
//!
//! The table is the build-time twin of `tgdis_core::decode::DecodeTable`:
//! one 256-entry block per distinct decoding state, children before
//! parents, identical subtries shared through memoization.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use tgdis_core::decode::{payload_entry, DecodeTable, NO_MATCH};

/// One instruction pattern in byte-stream order.
///
/// Bit `b` of `required` is set iff the pattern constrains it; `value`
/// gives the constrained bits' values.
#[derive(Clone, Debug)]
pub struct TriePattern<P> {
    pub tag: String,
    pub required: Vec<u8>,
    pub value: Vec<u8>,
    pub payload: P,
}

impl<P> TriePattern<P> {
    pub fn new(tag: impl Into<String>, required: Vec<u8>, value: Vec<u8>, payload: P) -> Self {
        Self {
            tag: tag.into(),
            required,
            value,
            payload,
        }
    }

    fn accepts(&self, depth: usize, byte: u8) -> bool {
        byte & self.required[depth] == self.value[depth] & self.required[depth]
    }
}

/// Two or more patterns accept a common byte sequence.
#[derive(Clone, Debug)]
pub struct AmbiguityError {
    /// Conflicting tag groups, first seen first.
    pub conflicts: Vec<Vec<String>>,
}

impl fmt::Display for AmbiguityError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str("ambiguous encodings: ")?;
        for (i, group) in self.conflicts.iter().enumerate() {
            if i != 0 {
                fmt.write_str("; ")?;
            }
            write!(fmt, "{}", group.join(" / "))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ByteTrie<P> {
    entries: Vec<i32>,
    payloads: Vec<P>,
    start: u32,
    width: u32,
}

impl<P> ByteTrie<P> {
    /// Builds the matching table for fixed-width patterns.
    ///
    /// `width` is the instruction size in bytes; every pattern's masks must
    /// have exactly that length.
    pub fn build(width: usize, patterns: Vec<TriePattern<P>>) -> Result<Self, AmbiguityError> {
        Self::build_with_default(width, patterns, None)
    }

    /// Like [`ByteTrie::build`], with a fallback payload produced after
    /// `width` bytes whenever no pattern matches.
    pub fn build_with_default(
        width: usize,
        patterns: Vec<TriePattern<P>>,
        default: Option<P>,
    ) -> Result<Self, AmbiguityError> {
        assert!(width > 0 && width <= 8);
        for pattern in &patterns {
            assert_eq!(pattern.required.len(), width, "pattern width mismatch");
            assert_eq!(pattern.value.len(), width, "pattern width mismatch");
        }

        let mut builder = Builder {
            width,
            patterns: &patterns,
            has_default: default.is_some(),
            entries: Vec::new(),
            leaves: Vec::new(),
            leaf_index: HashMap::new(),
            memo: HashMap::new(),
            conflicts: Vec::new(),
            conflict_seen: HashSet::new(),
        };

        let all: Vec<u32> = (0..patterns.len() as u32).collect();
        let start = builder.block(0, &all);

        if !builder.conflicts.is_empty() {
            let conflicts = builder
                .conflicts
                .iter()
                .map(|group| {
                    group
                        .iter()
                        .map(|i| patterns[*i as usize].tag.clone())
                        .collect()
                })
                .collect();
            return Err(AmbiguityError { conflicts });
        }

        let entries = builder.entries;
        let leaves = builder.leaves;

        let mut slots: Vec<Option<P>> = patterns.into_iter().map(|p| Some(p.payload)).collect();
        let mut default = default;
        let payloads = leaves
            .into_iter()
            .map(|leaf| match leaf {
                Leaf::Pattern(index) => slots[index as usize].take().expect("payload reused"),
                Leaf::Default => default.take().expect("default payload reused"),
            })
            .collect();

        Ok(Self {
            entries,
            payloads,
            start: start as u32,
            width: width as u32,
        })
    }

    pub fn entries(&self) -> &[i32] {
        &self.entries
    }

    pub fn payloads(&self) -> &[P] {
        &self.payloads
    }

    /// Total number of table entries.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Offset of the root block.
    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    pub fn as_table(&self) -> DecodeTable<'_> {
        DecodeTable::new(&self.entries, self.start, self.width)
    }

    /// Matches one instruction prefix, returning consumption and payload.
    pub fn lookup(&self, bytes: &[u8]) -> (usize, Option<&P>) {
        let (len, index) = self.as_table().lookup(bytes);
        (len, index.map(|i| &self.payloads[i]))
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
enum Leaf {
    Pattern(u32),
    Default,
}

struct Builder<'p, P> {
    width: usize,
    patterns: &'p [TriePattern<P>],
    has_default: bool,
    entries: Vec<i32>,
    /// Payload slots in first-occurrence order.
    leaves: Vec<Leaf>,
    leaf_index: HashMap<Leaf, u32>,
    /// Identical subtries share one block.
    memo: HashMap<(usize, Vec<u32>), i32>,
    conflicts: Vec<Vec<u32>>,
    conflict_seen: HashSet<Vec<u32>>,
}

impl<P> Builder<'_, P> {
    fn block(&mut self, depth: usize, viable: &[u32]) -> i32 {
        let key = (depth, viable.to_vec());
        if let Some(offset) = self.memo.get(&key) {
            return *offset;
        }

        let mut block = [NO_MATCH; 256];
        for byte in 0..=255u8 {
            let next: Vec<u32> = viable
                .iter()
                .copied()
                .filter(|i| self.patterns[*i as usize].accepts(depth, byte))
                .collect();
            block[byte as usize] = self.entry(depth, next);
        }

        let offset = self.entries.len() as i32;
        self.entries.extend_from_slice(&block);
        self.memo.insert(key, offset);
        offset
    }

    fn entry(&mut self, depth: usize, next: Vec<u32>) -> i32 {
        let last = depth + 1 == self.width;
        if next.is_empty() && !self.has_default {
            return NO_MATCH;
        }
        if last {
            return match next.as_slice() {
                [] => self.leaf(Leaf::Default),
                [single] => self.leaf(Leaf::Pattern(*single)),
                _ => {
                    if self.conflict_seen.insert(next.clone()) {
                        self.conflicts.push(next.clone());
                    }
                    // keep the first-seen pattern so the walk stays valid
                    self.leaf(Leaf::Pattern(next[0]))
                }
            };
        }
        self.block(depth + 1, &next)
    }

    fn leaf(&mut self, leaf: Leaf) -> i32 {
        let index = match self.leaf_index.get(&leaf) {
            Some(index) => *index,
            None => {
                let index = self.leaves.len() as u32;
                self.leaves.push(leaf);
                self.leaf_index.insert(leaf, index);
                index
            }
        };
        payload_entry(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(tag: &str, required: &[u8], value: &[u8]) -> TriePattern<String> {
        TriePattern::new(tag, required.to_vec(), value.to_vec(), tag.to_owned())
    }

    #[test]
    fn fixed_opcode() {
        let trie = ByteTrie::build(
            4,
            vec![pattern(
                "ADD",
                &[0xff, 0x00, 0x00, 0x00],
                &[0x60, 0x00, 0x00, 0x00],
            )],
        )
        .unwrap();

        let (len, payload) = trie.lookup(&[0x60, 0x00, 0x00, 0x00]);
        assert_eq!((len, payload.map(String::as_str)), (4, Some("ADD")));

        // trailing don't-care bytes are free
        let (len, payload) = trie.lookup(&[0x60, 0xab, 0xcd, 0xef]);
        assert_eq!((len, payload.map(String::as_str)), (4, Some("ADD")));

        assert_eq!(trie.lookup(&[0x61, 0x00, 0x00, 0x00]), (1, None));
        assert_eq!(trie.lookup(&[0x60, 0x00]), (2, None));
    }

    #[test]
    fn masked_operand_bits() {
        let trie = ByteTrie::build(
            4,
            vec![pattern(
                "MOV",
                &[0xf0, 0x00, 0x00, 0x00],
                &[0x80, 0x00, 0x00, 0x00],
            )],
        )
        .unwrap();

        let (len, payload) = trie.lookup(&[0x82, 0x00, 0x12, 0x34]);
        assert_eq!((len, payload.map(String::as_str)), (4, Some("MOV")));
        assert_eq!(trie.lookup(&[0x92, 0x00, 0x12, 0x34]), (1, None));
    }

    #[test]
    fn ambiguous_patterns_are_rejected() {
        let err = ByteTrie::build(
            2,
            vec![
                pattern("A", &[0xf0, 0x00], &[0xa0, 0x00]),
                pattern("B", &[0xff, 0x00], &[0xa0, 0x00]),
            ],
        )
        .unwrap_err();

        assert_eq!(err.conflicts, [["A".to_owned(), "B".to_owned()]]);
        let report = err.to_string();
        assert!(report.contains('A') && report.contains('B'));
    }

    #[test]
    fn disjoint_patterns_coexist() {
        let trie = ByteTrie::build(
            2,
            vec![
                pattern("A", &[0xff, 0x00], &[0xa0, 0x00]),
                pattern("B", &[0xff, 0x00], &[0xb0, 0x00]),
            ],
        )
        .unwrap();

        assert_eq!(trie.lookup(&[0xa0, 0x55]).1.map(String::as_str), Some("A"));
        assert_eq!(trie.lookup(&[0xb0, 0x55]).1.map(String::as_str), Some("B"));
        assert_eq!(trie.lookup(&[0xc0, 0x55]), (1, None));
    }

    #[test]
    fn build_is_deterministic() {
        let patterns = || {
            vec![
                pattern("A", &[0xff, 0xff], &[0x12, 0x34]),
                pattern("B", &[0xf0, 0x00], &[0x40, 0x00]),
                pattern("C", &[0xff, 0x0f], &[0x56, 0x07]),
            ]
        };
        let first = ByteTrie::build(2, patterns()).unwrap();
        let second = ByteTrie::build(2, patterns()).unwrap();
        assert_eq!(first.entries(), second.entries());
        assert_eq!(first.payloads(), second.payloads());
        assert_eq!(first.start(), second.start());
    }

    #[test]
    fn identical_subtries_share_blocks() {
        // every accepted first byte leads to the same residual set, so the
        // depth-1 block must be stored once
        let trie = ByteTrie::build(
            2,
            vec![pattern("X", &[0xf0, 0xff], &[0xa0, 0x12])],
        )
        .unwrap();
        assert_eq!(trie.size(), 512);
        assert_eq!(trie.start(), 256);
    }

    #[test]
    fn payloads_in_first_occurrence_order() {
        let trie = ByteTrie::build(
            1,
            vec![
                pattern("HIGH", &[0xff], &[0x80]),
                pattern("LOW", &[0xff], &[0x01]),
            ],
        )
        .unwrap();
        // byte 0x01 is reached before byte 0x80 while filling the block
        assert_eq!(trie.payloads(), ["LOW".to_owned(), "HIGH".to_owned()]);
    }

    #[test]
    fn default_payload() {
        let trie = ByteTrie::build_with_default(
            2,
            vec![pattern("A", &[0xff, 0xff], &[0x10, 0x20])],
            Some("FALLBACK".to_owned()),
        )
        .unwrap();

        assert_eq!(trie.lookup(&[0x10, 0x20]).1.map(String::as_str), Some("A"));
        let (len, payload) = trie.lookup(&[0xff, 0xff]);
        assert_eq!((len, payload.map(String::as_str)), (2, Some("FALLBACK")));
    }

    #[test]
    fn zero_payloads_without_patterns() {
        let trie = ByteTrie::<String>::build(2, Vec::new()).unwrap();
        assert_eq!(trie.lookup(&[0x00, 0x00]), (1, None));
        assert!(trie.payloads().is_empty());
    }
}
