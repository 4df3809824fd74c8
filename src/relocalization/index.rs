//! Descriptor search index abstraction.
//!
//! Place recognition runs against an external approximate-search structure.
//! The relocalizer only needs the small surface captured by
//! [`AppearanceIndex`]; [`LinearIndex`] is a brute-force implementation that
//! serves as the in-tree default and as the reference for tests.

use crate::map::{AppearanceId, BinaryDescriptor, LandmarkId};

/// One descriptor handed to the index, with its back-references.
#[derive(Debug, Clone)]
pub struct IndexedAppearance {
    pub id: AppearanceId,
    pub landmark: LandmarkId,
    pub descriptor: BinaryDescriptor,
}

/// A raw descriptor match between the current query and one indexed entry.
#[derive(Debug, Clone)]
pub struct AppearanceMatch {
    pub query: AppearanceId,
    pub query_landmark: LandmarkId,
    pub reference: AppearanceId,
    pub reference_landmark: LandmarkId,
    pub distance: u32,
}

/// Report that the index coalesced a near-duplicate descriptor.
///
/// The absorbed handle is dead after the merge; owners must rewrite their
/// bookkeeping to the surviving handle and never dereference the absorbed
/// one again.
#[derive(Debug, Clone)]
pub struct AppearanceMerge {
    pub absorbed: AppearanceId,
    pub absorbed_landmark: LandmarkId,
    pub surviving: AppearanceId,
}

/// The descriptor index surface the relocalizer depends on.
///
/// One entry per submitted local map; entries are addressed by insertion
/// order.
pub trait AppearanceIndex {
    /// Number of indexed entries (local maps).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert descriptors as a new entry without matching.
    fn add(&mut self, appearances: &[IndexedAppearance]);

    /// Match the query descriptors against every indexed entry and insert
    /// them as a new entry in the same pass.
    ///
    /// Returns, per historical entry in insertion order, the raw matches
    /// within `maximum_distance`.
    fn match_and_add(
        &mut self,
        appearances: &[IndexedAppearance],
        maximum_distance: u32,
    ) -> Vec<Vec<AppearanceMatch>>;

    /// Drain the merges performed during the most recent insertion.
    fn take_merges(&mut self) -> Vec<AppearanceMerge>;
}

/// Brute-force Hamming index.
///
/// With a nonzero `merge_distance`, inserted descriptors closer than that
/// distance to an already-indexed one are absorbed instead of stored, and
/// the merge is reported through [`AppearanceIndex::take_merges`].
#[derive(Debug, Default)]
pub struct LinearIndex {
    entries: Vec<Vec<IndexedAppearance>>,
    merge_distance: u32,
    pending_merges: Vec<AppearanceMerge>,
}

impl LinearIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable near-duplicate merging; a distance of 0 disables it.
    pub fn with_merge_distance(merge_distance: u32) -> Self {
        Self {
            merge_distance,
            ..Self::default()
        }
    }

    /// Store a new entry, absorbing near-duplicates when merging is enabled.
    fn insert_entry(&mut self, appearances: &[IndexedAppearance]) {
        if self.merge_distance == 0 {
            self.entries.push(appearances.to_vec());
            return;
        }

        let mut kept = Vec::with_capacity(appearances.len());
        for appearance in appearances {
            let surviving = self.entries.iter().flatten().find(|indexed| {
                indexed
                    .descriptor
                    .hamming_distance(&appearance.descriptor)
                    <= self.merge_distance
            });
            match surviving {
                Some(indexed) => self.pending_merges.push(AppearanceMerge {
                    absorbed: appearance.id,
                    absorbed_landmark: appearance.landmark,
                    surviving: indexed.id,
                }),
                None => kept.push(appearance.clone()),
            }
        }
        self.entries.push(kept);
    }
}

impl AppearanceIndex for LinearIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn add(&mut self, appearances: &[IndexedAppearance]) {
        self.insert_entry(appearances);
    }

    fn match_and_add(
        &mut self,
        appearances: &[IndexedAppearance],
        maximum_distance: u32,
    ) -> Vec<Vec<AppearanceMatch>> {
        let mut matches_per_entry = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let mut matches = Vec::new();
            for query in appearances {
                // Nearest neighbor within this entry.
                let mut best: Option<(&IndexedAppearance, u32)> = None;
                for reference in entry {
                    let distance = query.descriptor.hamming_distance(&reference.descriptor);
                    if best.map_or(true, |(_, d)| distance < d) {
                        best = Some((reference, distance));
                    }
                }
                if let Some((reference, distance)) = best {
                    if distance <= maximum_distance {
                        matches.push(AppearanceMatch {
                            query: query.id,
                            query_landmark: query.landmark,
                            reference: reference.id,
                            reference_landmark: reference.landmark,
                            distance,
                        });
                    }
                }
            }
            matches_per_entry.push(matches);
        }

        self.insert_entry(appearances);
        matches_per_entry
    }

    fn take_merges(&mut self) -> Vec<AppearanceMerge> {
        std::mem::take(&mut self.pending_merges)
    }
}

/// Convenience for tests and synthetic scenes: descriptors whose Hamming
/// distance encodes a landmark identity.
pub fn descriptor_for_seed(seed: u64) -> BinaryDescriptor {
    let mut bytes = [0u8; crate::map::DESCRIPTOR_SIZE_BYTES];
    let mut state = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15).wrapping_add(1);
    for byte in bytes.iter_mut() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *byte = (state & 0xff) as u8;
    }
    BinaryDescriptor(bytes)
}
