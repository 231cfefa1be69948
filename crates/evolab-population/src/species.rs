//! Species bookkeeping over the live population.
//!
//! Records are derived state: each tracking pass recomputes counts and
//! averages from the agent snapshot. Records outlive their last member so the
//! historical view (first/last seen, peak, extinction) survives.

use evolab_core::{RandomSource, SpeciesMarker, SpeciesSettings, Tick};
use evolab_genome::{Genome, genetic_distance, is_same_species};
use ordered_float::OrderedFloat;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::reproduction::SpeciationEvent;

#[derive(Debug, Error)]
pub enum SpeciesDataError {
    #[error("malformed species data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("species {0} appears more than once")]
    DuplicateMarker(SpeciesMarker),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeciesRecord {
    pub marker: SpeciesMarker,
    pub color: [f32; 3],
    pub count: usize,
    pub energy_sum: f32,
    pub fitness_sum: f32,
    pub age_sum: f64,
    pub avg_energy: f32,
    pub avg_fitness: f32,
    pub avg_age: f32,
    pub first_seen: Tick,
    pub last_seen: Tick,
    pub peak_population: usize,
    pub extinct: bool,
    /// Species this one split from, when known.
    pub ancestor: Option<SpeciesMarker>,
    pub representative: Option<Genome>,
}

impl SpeciesRecord {
    fn new(marker: SpeciesMarker, tick: Tick) -> Self {
        Self {
            marker,
            color: species_color(marker),
            count: 0,
            energy_sum: 0.0,
            fitness_sum: 0.0,
            age_sum: 0.0,
            avg_energy: 0.0,
            avg_fitness: 0.0,
            avg_age: 0.0,
            first_seen: tick,
            last_seen: tick,
            peak_population: 0,
            extinct: false,
            ancestor: None,
            representative: None,
        }
    }

    fn reset_pass(&mut self) {
        self.count = 0;
        self.energy_sum = 0.0;
        self.fitness_sum = 0.0;
        self.age_sum = 0.0;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpeciesEvent {
    Emerged {
        marker: SpeciesMarker,
        tick: Tick,
    },
    Extinct {
        marker: SpeciesMarker,
        tick: Tick,
    },
    Reemerged {
        marker: SpeciesMarker,
        tick: Tick,
    },
    Speciated {
        parent: SpeciesMarker,
        child: SpeciesMarker,
        tick: Tick,
    },
    Merged {
        from: SpeciesMarker,
        into: SpeciesMarker,
        tick: Tick,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhylogenyEntry {
    pub marker: SpeciesMarker,
    pub ancestor: Option<SpeciesMarker>,
    pub depth: usize,
    pub first_seen: Tick,
    pub extinct: bool,
}

/// Deterministic display color: golden-angle hue stepping over markers.
#[must_use]
pub fn species_color(marker: SpeciesMarker) -> [f32; 3] {
    const GOLDEN_ANGLE: f64 = 137.507_764;
    let hue = (f64::from(marker.0) * GOLDEN_ANGLE).rem_euclid(360.0) as f32;
    hsv_to_rgb(hue, 0.65, 0.9)
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [f32; 3] {
    let chroma = value * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    [r + m, g + m, b + m]
}

#[derive(Debug, Clone)]
pub struct SpeciesTracker {
    species: BTreeMap<SpeciesMarker, SpeciesRecord>,
    history: VecDeque<SpeciesEvent>,
    settings: SpeciesSettings,
}

impl SpeciesTracker {
    #[must_use]
    pub fn new(settings: SpeciesSettings) -> Self {
        Self {
            species: BTreeMap::new(),
            history: VecDeque::with_capacity(settings.history_capacity),
            settings,
        }
    }

    fn push_event(&mut self, event: SpeciesEvent) {
        if self.settings.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.settings.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    /// Recompute per-species aggregates from the living agents.
    pub fn update_species_tracking(&mut self, agents: &[Agent], tick: Tick) {
        for record in self.species.values_mut() {
            record.reset_pass();
        }

        let mut best: BTreeMap<SpeciesMarker, (OrderedFloat<f32>, usize)> = BTreeMap::new();
        let mut emerged = Vec::new();
        for (index, agent) in agents.iter().enumerate() {
            if !agent.alive {
                continue;
            }
            let marker = agent.species_marker();
            let record = self.species.entry(marker).or_insert_with(|| {
                emerged.push(marker);
                SpeciesRecord::new(marker, tick)
            });
            record.count += 1;
            record.energy_sum += agent.energy;
            record.fitness_sum += agent.fitness;
            record.age_sum += f64::from(agent.age);
            record.last_seen = tick;

            let fitness = OrderedFloat(agent.fitness);
            best.entry(marker)
                .and_modify(|slot| {
                    if fitness > slot.0 {
                        *slot = (fitness, index);
                    }
                })
                .or_insert((fitness, index));
        }
        for marker in emerged {
            info!(%marker, tick = tick.0, "species emerged");
            self.push_event(SpeciesEvent::Emerged { marker, tick });
        }

        let mut transitions = Vec::new();
        for (marker, record) in &mut self.species {
            if record.count == 0 {
                if !record.extinct {
                    record.extinct = true;
                    transitions.push(SpeciesEvent::Extinct {
                        marker: *marker,
                        tick,
                    });
                }
                continue;
            }
            if let Some((fitness, index)) = best.get(marker)
                && (record.representative.is_none() || fitness.0 > record.avg_fitness)
            {
                record.representative = Some(agents[*index].genome.clone());
            }
            let count = record.count as f32;
            record.avg_energy = record.energy_sum / count;
            record.avg_fitness = record.fitness_sum / count;
            record.avg_age = (record.age_sum / record.count as f64) as f32;
            record.peak_population = record.peak_population.max(record.count);
            if record.extinct {
                record.extinct = false;
                transitions.push(SpeciesEvent::Reemerged {
                    marker: *marker,
                    tick,
                });
            }
        }
        for event in transitions {
            match event {
                SpeciesEvent::Extinct { marker, .. } => info!(%marker, tick = tick.0, "species extinct"),
                SpeciesEvent::Reemerged { marker, .. } => {
                    info!(%marker, tick = tick.0, "species re-emerged");
                }
                _ => {}
            }
            self.push_event(event);
        }
    }

    /// Single-linkage reclustering. Each connected component under
    /// [`is_same_species`] takes the marker of its fittest member, which can
    /// merge previously distinct species. Tracking is refreshed afterwards.
    /// Returns the number of agents whose marker changed.
    ///
    /// Compares every living pair in the worst case, O(n²) distance calls,
    /// so callers run it on `recluster_interval` rather than every tick.
    pub fn recluster_species(&mut self, agents: &mut [Agent], tick: Tick) -> usize {
        let threshold = self.settings.distance_threshold;
        let living: Vec<usize> = (0..agents.len()).filter(|i| agents[*i].alive).collect();
        let mut assigned = vec![false; living.len()];
        let mut relabelled = 0;
        let mut merges: BTreeSet<(SpeciesMarker, SpeciesMarker)> = BTreeSet::new();

        for seed in 0..living.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;
            let mut cluster = vec![seed];
            let mut cursor = 0;
            while cursor < cluster.len() {
                let member = living[cluster[cursor]];
                for candidate in 0..living.len() {
                    if assigned[candidate] {
                        continue;
                    }
                    let other = living[candidate];
                    if is_same_species(&agents[member].genome, &agents[other].genome, threshold) {
                        assigned[candidate] = true;
                        cluster.push(candidate);
                    }
                }
                cursor += 1;
            }

            let Some(leader) = cluster
                .iter()
                .map(|slot| living[*slot])
                .max_by_key(|index| OrderedFloat(agents[*index].fitness))
            else {
                continue;
            };
            let marker = agents[leader].species_marker();
            for slot in cluster {
                let genome = &mut agents[living[slot]].genome;
                if genome.species_marker != marker {
                    merges.insert((genome.species_marker, marker));
                    genome.species_marker = marker;
                    relabelled += 1;
                }
            }
        }

        for (from, into) in merges {
            info!(%from, %into, tick = tick.0, "species merged");
            self.push_event(SpeciesEvent::Merged { from, into, tick });
        }
        self.update_species_tracking(agents, tick);
        relabelled
    }

    /// Record that `event.child` split from `event.parent`.
    pub fn register_speciation(&mut self, event: &SpeciationEvent, tick: Tick) {
        let record = self
            .species
            .entry(event.child)
            .or_insert_with(|| SpeciesRecord::new(event.child, tick));
        record.ancestor = Some(event.parent);
        debug!(parent = %event.parent, child = %event.child, tick = tick.0, "speciation registered");
        self.push_event(SpeciesEvent::Speciated {
            parent: event.parent,
            child: event.child,
            tick,
        });
    }

    /// Every known species with its ancestry depth, oldest first.
    #[must_use]
    pub fn phylogeny(&self) -> Vec<PhylogenyEntry> {
        let mut entries: Vec<PhylogenyEntry> = self
            .species
            .values()
            .map(|record| PhylogenyEntry {
                marker: record.marker,
                ancestor: record.ancestor,
                depth: self.depth(record.marker),
                first_seen: record.first_seen,
                extinct: record.extinct,
            })
            .collect();
        entries.sort_by_key(|entry| (entry.first_seen, entry.marker));
        entries
    }

    fn depth(&self, marker: SpeciesMarker) -> usize {
        let mut depth = 0;
        let mut current = marker;
        while let Some(parent) = self.species.get(&current).and_then(|r| r.ancestor) {
            depth += 1;
            // Markers can be reused, so ancestry may loop.
            if depth > self.species.len() {
                break;
            }
            current = parent;
        }
        depth
    }

    #[must_use]
    pub fn species_color(&self, marker: SpeciesMarker) -> [f32; 3] {
        self.species
            .get(&marker)
            .map_or_else(|| species_color(marker), |record| record.color)
    }

    #[must_use]
    pub fn species_info(&self, marker: SpeciesMarker) -> Option<&SpeciesRecord> {
        self.species.get(&marker)
    }

    pub fn records(&self) -> impl Iterator<Item = &SpeciesRecord> + '_ {
        self.species.values()
    }

    /// Number of species with living members.
    #[must_use]
    pub fn species_count(&self) -> usize {
        self.species.values().filter(|r| r.count > 0).count()
    }

    /// Share of the living population per species, in percent.
    #[must_use]
    pub fn species_percentages(&self) -> Vec<(SpeciesMarker, f32)> {
        let total: usize = self.species.values().map(|r| r.count).sum();
        if total == 0 {
            return Vec::new();
        }
        self.species
            .values()
            .filter(|r| r.count > 0)
            .map(|r| (r.marker, r.count as f32 * 100.0 / total as f32))
            .collect()
    }

    /// Living species at or below the endangered threshold.
    #[must_use]
    pub fn endangered_species(&self) -> Vec<SpeciesMarker> {
        self.species
            .values()
            .filter(|r| r.count > 0 && r.count <= self.settings.endangered_threshold)
            .map(|r| r.marker)
            .collect()
    }

    pub fn history(&self) -> impl Iterator<Item = &SpeciesEvent> + '_ {
        self.history.iter()
    }

    /// Mean genetic distance between living members of `marker`, sampled
    /// when the number of pairs exceeds the configured cap.
    pub fn intra_species_distance(
        &self,
        marker: SpeciesMarker,
        agents: &[Agent],
        rng: &mut dyn RngCore,
    ) -> f32 {
        let members: Vec<&Genome> = agents
            .iter()
            .filter(|a| a.alive && a.species_marker() == marker)
            .map(|a| &a.genome)
            .collect();
        let n = members.len();
        if n < 2 {
            return 0.0;
        }
        let cap = self.settings.distance_sample_pairs.max(1);
        let pairs = n * (n - 1) / 2;
        let (total, sampled) = if pairs <= cap {
            let mut total = 0.0;
            for i in 0..n {
                for j in (i + 1)..n {
                    total += genetic_distance(members[i], members[j]);
                }
            }
            (total, pairs)
        } else {
            let mut total = 0.0;
            for _ in 0..cap {
                let i = rng.pick_index(n).unwrap_or(0);
                let offset = rng.int_between(1, n as i64 - 1) as usize;
                let j = (i + offset) % n;
                total += genetic_distance(members[i], members[j]);
            }
            (total, cap)
        };
        total / sampled as f32
    }

    /// Distance between the representatives of two species.
    #[must_use]
    pub fn inter_species_distance(&self, a: SpeciesMarker, b: SpeciesMarker) -> Option<f32> {
        let ra = self.species.get(&a)?.representative.as_ref()?;
        let rb = self.species.get(&b)?.representative.as_ref()?;
        Some(genetic_distance(ra, rb))
    }

    /// JSON list of every record, representative genome included.
    pub fn serialize_species_data(&self) -> Result<String, SpeciesDataError> {
        let records: Vec<&SpeciesRecord> = self.species.values().collect();
        Ok(serde_json::to_string(&records)?)
    }

    /// Replace the species map with records parsed from `data`. Returns the
    /// number of records loaded; on error the current map is left untouched.
    pub fn deserialize_species_data(&mut self, data: &str) -> Result<usize, SpeciesDataError> {
        let records: Vec<SpeciesRecord> = serde_json::from_str(data)?;
        let mut species = BTreeMap::new();
        for record in records {
            let marker = record.marker;
            if species.insert(marker, record).is_some() {
                return Err(SpeciesDataError::DuplicateMarker(marker));
            }
        }
        let loaded = species.len();
        self.species = species;
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolab_core::{EvolabConfig, Position};
    use evolab_genome::{FoodType, GenomeId, RandomBodyOptions, generate_random_genome};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn population(markers: &[u32]) -> Vec<Agent> {
        let config = EvolabConfig::default();
        let mut rng = SmallRng::seed_from_u64(90);
        markers
            .iter()
            .enumerate()
            .map(|(i, marker)| {
                let genome = generate_random_genome(
                    RandomBodyOptions {
                        node_count: None,
                        species_marker: Some(SpeciesMarker(*marker)),
                    },
                    &config,
                    &mut rng,
                );
                let mut agent = Agent::new(genome, &config.simulation, Position::default());
                agent.fitness = 1.0 + i as f32;
                agent.energy = 10.0 * (i + 1) as f32;
                agent
            })
            .collect()
    }

    #[test]
    fn tracking_aggregates_and_detects_extinction() {
        let mut tracker = SpeciesTracker::new(SpeciesSettings::default());
        let mut agents = population(&[1, 1, 2]);
        tracker.update_species_tracking(&agents, Tick(1));

        let one = tracker.species_info(SpeciesMarker(1)).expect("tracked");
        assert_eq!(one.count, 2);
        assert!((one.avg_energy - 15.0).abs() < 1e-6);
        assert!((one.avg_fitness - 1.5).abs() < 1e-6);
        assert_eq!(one.peak_population, 2);
        assert_eq!(tracker.species_count(), 2);

        agents[2].alive = false;
        tracker.update_species_tracking(&agents, Tick(2));
        let two = tracker.species_info(SpeciesMarker(2)).expect("retained");
        assert!(two.extinct);
        assert_eq!(two.count, 0);
        assert_eq!(two.last_seen, Tick(1));
        assert_eq!(tracker.species_count(), 1);
        assert_eq!(
            tracker.history().filter(|e| matches!(e, SpeciesEvent::Extinct { .. })).count(),
            1
        );

        tracker.update_species_tracking(&agents, Tick(3));
        assert_eq!(
            tracker.history().filter(|e| matches!(e, SpeciesEvent::Extinct { .. })).count(),
            1,
            "extinction is logged once"
        );

        agents[2].alive = true;
        tracker.update_species_tracking(&agents, Tick(4));
        assert!(!tracker.species_info(SpeciesMarker(2)).expect("tracked").extinct);
        assert!(tracker.history().any(|e| matches!(e, SpeciesEvent::Reemerged { .. })));
    }

    #[test]
    fn representative_follows_members_that_beat_the_average() {
        let mut tracker = SpeciesTracker::new(SpeciesSettings::default());
        let mut agents = population(&[1, 1, 1]);
        for (i, agent) in agents.iter_mut().enumerate() {
            agent.genome.id = GenomeId(10 + i as u64);
        }
        let representative = |tracker: &SpeciesTracker| {
            tracker
                .species_info(SpeciesMarker(1))
                .and_then(|r| r.representative.as_ref())
                .map(|g| g.id)
        };

        tracker.update_species_tracking(&agents, Tick(1));
        assert_eq!(representative(&tracker), Some(GenomeId(12)));
        assert!((tracker.species_info(SpeciesMarker(1)).expect("tracked").avg_fitness - 2.0).abs() < 1e-6);

        // Best living member now sits below the recorded average of 2.0.
        agents[2].alive = false;
        agents[1].fitness = 1.9;
        tracker.update_species_tracking(&agents, Tick(2));
        assert_eq!(representative(&tracker), Some(GenomeId(12)));
        assert!((tracker.species_info(SpeciesMarker(1)).expect("tracked").avg_fitness - 1.45).abs() < 1e-6);

        agents[1].fitness = 1.6;
        tracker.update_species_tracking(&agents, Tick(3));
        assert_eq!(representative(&tracker), Some(GenomeId(11)));
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let mut tracker = SpeciesTracker::new(SpeciesSettings::default());
        let agents = population(&[1, 1, 1, 2, 3, 3]);
        tracker.update_species_tracking(&agents, Tick(1));
        let total: f32 = tracker.species_percentages().iter().map(|(_, p)| p).sum();
        assert!((total - 100.0).abs() < 1e-3);
        assert_eq!(tracker.endangered_species().len(), 3);
    }

    #[test]
    fn reclustering_merges_close_genomes() {
        let mut tracker = SpeciesTracker::new(SpeciesSettings::default());
        let mut agents = population(&[5, 6, 7]);
        let template = agents[0].genome.clone();
        for agent in &mut agents[1..] {
            let marker = agent.genome.species_marker;
            agent.genome = template.clone();
            agent.genome.species_marker = marker;
        }
        agents[2].genome.nodes.clear();
        agents[2].genome.links.clear();
        agents[2].genome.motors.clear();
        agents[2].genome.metabolism.primary_food = match template.metabolism.primary_food {
            FoodType::Meat => FoodType::Plant,
            _ => FoodType::Meat,
        };

        let changed = tracker.recluster_species(&mut agents, Tick(10));
        assert_eq!(changed, 1);
        assert_eq!(agents[0].genome.species_marker, SpeciesMarker(6));
        assert_eq!(agents[1].genome.species_marker, SpeciesMarker(6));
        assert_eq!(agents[2].genome.species_marker, SpeciesMarker(7));
        assert!(tracker.history().any(|e| matches!(
            e,
            SpeciesEvent::Merged { from: SpeciesMarker(5), into: SpeciesMarker(6), .. }
        )));
    }

    #[test]
    fn phylogeny_follows_speciation() {
        let mut tracker = SpeciesTracker::new(SpeciesSettings::default());
        let agents = population(&[1]);
        tracker.update_species_tracking(&agents, Tick(0));
        let event = SpeciationEvent {
            parent: SpeciesMarker(1),
            child: SpeciesMarker(2),
            genome: agents[0].genome.id,
            distance: 0.5,
        };
        tracker.register_speciation(&event, Tick(5));
        let grandchild = SpeciationEvent {
            parent: SpeciesMarker(2),
            child: SpeciesMarker(3),
            ..event
        };
        tracker.register_speciation(&grandchild, Tick(9));
        let tree = tracker.phylogeny();
        let depths: Vec<(u32, usize)> = tree.iter().map(|e| (e.marker.0, e.depth)).collect();
        assert_eq!(depths, vec![(1, 0), (2, 1), (3, 2)]);
    }

    #[test]
    fn species_data_round_trips() {
        let mut tracker = SpeciesTracker::new(SpeciesSettings::default());
        let agents = population(&[1, 2, 2]);
        tracker.update_species_tracking(&agents, Tick(3));
        let data = tracker.serialize_species_data().expect("serialize");

        let mut restored = SpeciesTracker::new(SpeciesSettings::default());
        assert_eq!(restored.deserialize_species_data(&data).expect("deserialize"), 2);
        let before: Vec<&SpeciesRecord> = tracker.records().collect();
        let after: Vec<&SpeciesRecord> = restored.records().collect();
        assert_eq!(before, after);
        assert!(after.iter().all(|r| r.representative.is_some()));

        assert!(matches!(
            restored.deserialize_species_data("[{\"marker\": 1}]"),
            Err(SpeciesDataError::Json(_))
        ));
        assert_eq!(restored.species_count(), 2);
    }

    #[test]
    fn colors_are_stable_and_in_range() {
        for marker in 1..50 {
            let color = species_color(SpeciesMarker(marker));
            assert_eq!(color, species_color(SpeciesMarker(marker)));
            assert!(color.iter().all(|c| (0.0..=1.0).contains(c)));
        }
        assert_ne!(species_color(SpeciesMarker(1)), species_color(SpeciesMarker(2)));
    }
}
