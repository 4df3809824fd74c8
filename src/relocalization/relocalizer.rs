//! Closure detection and verification orchestration.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use nalgebra::{Isometry3, Point3};
use tracing::{debug, info, warn};

use crate::config::RelocalizerConfig;
use crate::map::{LandmarkId, LocalMapId, WorldMap};
use crate::metrics::{MetricsSink, NullMetrics};
use crate::solver::{Aligner, XyzCorrespondence, XyzModel};

use super::closure::{Closure, ClosureAlignment, Correspondence};
use super::index::{AppearanceIndex, AppearanceMatch, IndexedAppearance};

/// Detects loop-closure candidates for each newly created local map and
/// verifies them geometrically.
///
/// Closures stay owned here until the consumer takes them or calls
/// [`Relocalizer::clear`]; the descriptor index and the submission history
/// persist across cycles.
pub struct Relocalizer<I: AppearanceIndex, S: MetricsSink = NullMetrics> {
    config: RelocalizerConfig,
    index: I,

    /// Local maps in index-submission order; maps index entry positions
    /// back to local map identifiers.
    added_local_maps: Vec<LocalMapId>,

    closures: Vec<Closure>,
    metrics: S,
}

impl<I: AppearanceIndex> Relocalizer<I> {
    pub fn new(config: RelocalizerConfig, index: I) -> Self {
        Self::with_metrics(config, index, NullMetrics)
    }
}

impl<I: AppearanceIndex, S: MetricsSink> Relocalizer<I, S> {
    pub fn with_metrics(config: RelocalizerConfig, index: I, metrics: S) -> Self {
        Self {
            config,
            index,
            added_local_maps: Vec::new(),
            closures: Vec::new(),
            metrics,
        }
    }

    /// Submit a local map to place recognition and collect closure
    /// candidates against all sufficiently old indexed local maps.
    ///
    /// The appearance set is always inserted into the index; matching only
    /// starts once the index holds enough history to rule out trivial
    /// self-matches.
    pub fn detect_closures(&mut self, world_map: &mut WorldMap, query: LocalMapId) {
        let started = Instant::now();

        let Some(local_map) = world_map.local_map(query) else {
            warn!(%query, "closure detection requested for unknown local map");
            return;
        };
        let appearances: Vec<IndexedAppearance> = local_map
            .appearances
            .iter()
            .map(|appearance| IndexedAppearance {
                id: appearance.id,
                landmark: appearance.landmark,
                descriptor: appearance.descriptor,
            })
            .collect();

        self.added_local_maps.push(query);

        if self.index.len() < self.config.minimum_interspace {
            // Warm-up: build history only.
            self.index.add(&appearances);
        } else {
            let matches_per_reference = self
                .index
                .match_and_add(&appearances, self.config.maximum_descriptor_distance);

            let number_of_query_appearances = appearances.len();
            // The index now contains the query as well; eligible references
            // end one interspace before it.
            let maximum_reference = self
                .index
                .len()
                .saturating_sub(self.config.minimum_interspace);

            for (position, matches) in matches_per_reference
                .iter()
                .enumerate()
                .take(maximum_reference)
            {
                if number_of_query_appearances == 0 {
                    break;
                }
                let match_ratio = matches.len() as f64 / number_of_query_appearances as f64;
                if match_ratio < self.config.minimum_matching_ratio {
                    continue;
                }

                // A query landmark can collect several candidate references
                // through approximate search; group them per landmark.
                let mut matches_per_landmark: BTreeMap<LandmarkId, Vec<&AppearanceMatch>> =
                    BTreeMap::new();
                for candidate in matches {
                    matches_per_landmark
                        .entry(candidate.query_landmark)
                        .or_default()
                        .push(candidate);
                }
                if matches_per_landmark.len() < self.config.minimum_matched_landmarks {
                    continue;
                }

                let reference = self.added_local_maps[position];
                let mut used_references: HashSet<LandmarkId> = HashSet::new();
                let mut correspondences = Vec::new();
                for candidates in matches_per_landmark.values() {
                    if let Some(correspondence) = correspondence_nn(
                        candidates,
                        &mut used_references,
                        self.config.minimum_matches_per_correspondence,
                    ) {
                        correspondences.push(correspondence);
                    }
                }

                info!(
                    %query,
                    %reference,
                    match_ratio,
                    matched_landmarks = matches_per_landmark.len(),
                    correspondences = correspondences.len(),
                    "closure candidate"
                );
                self.closures.push(Closure::new(
                    query,
                    reference,
                    matches_per_landmark.len(),
                    match_ratio,
                    correspondences,
                ));
            }
        }

        // The insertion may have coalesced near-duplicate descriptors; keep
        // the map-side bookkeeping pointing at surviving handles only.
        let merges = self.index.take_merges();
        if !merges.is_empty() {
            for merge in &merges {
                if let Some(local_map) = world_map.local_map_mut(query) {
                    local_map.replace_appearance(merge.absorbed, merge.surviving);
                }
                if let Some(landmark) = world_map.landmark_mut(merge.absorbed_landmark) {
                    landmark.replace_appearance(merge.absorbed, merge.surviving);
                }
            }
            debug!(merged = merges.len(), "absorbed appearance handles rewritten");
        }

        self.metrics.record("detect_closures", started.elapsed());
    }

    /// Geometrically verify every pending closure.
    ///
    /// Runs the alignment solver on the closure's correspondences, expressed
    /// in the respective local map frames, and attaches the outcome. Whether
    /// a closure is accepted stays with the consumer.
    pub fn register_closures(&mut self, world_map: &WorldMap) {
        let started = Instant::now();

        for closure in &mut self.closures {
            if closure.alignment.is_some() {
                continue;
            }
            let (Some(query_map), Some(reference_map)) = (
                world_map.local_map(closure.query),
                world_map.local_map(closure.reference),
            ) else {
                warn!(
                    query = %closure.query,
                    reference = %closure.reference,
                    "closure references a missing local map"
                );
                continue;
            };
            let world_to_query = query_map.robot_to_world.inverse();
            let world_to_reference = reference_map.robot_to_world.inverse();

            let mut items = Vec::with_capacity(closure.correspondences.len());
            for correspondence in &closure.correspondences {
                let (Some(query_landmark), Some(reference_landmark)) = (
                    world_map.landmark(correspondence.query),
                    world_map.landmark(correspondence.reference),
                ) else {
                    continue;
                };
                let weight =
                    if query_landmark.is_validated && reference_landmark.is_validated {
                        1.0
                    } else {
                        self.config.weight_unvalidated_landmark
                    };
                items.push(XyzCorrespondence {
                    moving: world_to_query
                        .transform_point(&Point3::from(query_landmark.coordinates))
                        .coords,
                    fixed: world_to_reference
                        .transform_point(&Point3::from(reference_landmark.coordinates))
                        .coords,
                    weight,
                });
            }
            if items.is_empty() {
                debug!(
                    query = %closure.query,
                    reference = %closure.reference,
                    "closure has no usable correspondences, skipping verification"
                );
                continue;
            }

            let model = XyzModel;
            let mut aligner = Aligner::new(&model, &items, &self.config.aligner);
            aligner.initialize(Isometry3::identity());
            aligner.converge();

            closure.alignment = Some(ClosureAlignment {
                query_to_reference: aligner.estimate(),
                information: aligner.information(),
                converged: aligner.converged(),
                inlier_ratio: aligner.inlier_ratio(),
            });
        }

        self.metrics.record("register_closures", started.elapsed());
    }

    /// Release all pending closures. The descriptor index and the
    /// submission history are unaffected.
    pub fn clear(&mut self) {
        self.closures.clear();
    }

    pub fn closures(&self) -> &[Closure] {
        &self.closures
    }

    /// Hand the pending closures to the consumer, leaving none behind.
    pub fn take_closures(&mut self) -> Vec<Closure> {
        std::mem::take(&mut self.closures)
    }

    pub fn number_of_indexed_local_maps(&self) -> usize {
        self.index.len()
    }
}

/// Majority-vote nearest neighbor over one query landmark's candidates.
///
/// Counts votes per reference landmark, skipping references already claimed
/// within this closure, and accepts the winner only when its vote count is
/// strictly above the minimum. The first accepted correspondence claims its
/// reference for the rest of the closure.
fn correspondence_nn(
    candidates: &[&AppearanceMatch],
    used_references: &mut HashSet<LandmarkId>,
    minimum_votes: usize,
) -> Option<Correspondence> {
    let mut votes: BTreeMap<LandmarkId, usize> = BTreeMap::new();
    let mut best: Option<&AppearanceMatch> = None;
    let mut best_votes = 0;

    for &candidate in candidates {
        if used_references.contains(&candidate.reference_landmark) {
            continue;
        }
        let count = votes.entry(candidate.reference_landmark).or_insert(0);
        *count += 1;
        if *count > best_votes {
            best_votes = *count;
            best = Some(candidate);
        }
    }

    let best = best?;
    if best_votes <= minimum_votes {
        return None;
    }
    used_references.insert(best.reference_landmark);
    Some(Correspondence {
        query: best.query_landmark,
        reference: best.reference_landmark,
        votes: best_votes,
        confidence: best_votes as f64 / candidates.len() as f64,
    })
}
