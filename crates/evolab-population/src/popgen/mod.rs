//! Per-species population genetics: effective size, diversity, drift,
//! inbreeding, bottlenecks, and the fitness effects they imply.

mod fst;
mod sweeps;

pub use fst::{Barrier, calculate_fst, calculate_geographic_fst, heterozygosity};
pub use sweeps::{BeneficialMutation, MutationStatus};

use evolab_core::{PopGenSettings, RandomSource, SpeciesMarker, Tick};
use evolab_genome::neutral_distance;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

use crate::agent::Agent;

/// Weight of a fresh diversity sample in the moving average.
const DIVERSITY_SMOOTHING: f32 = 0.1;
/// Diversity assigned to a species observed for the first time.
const INITIAL_DIVERSITY: f32 = 0.5;

/// Derived genetic state of one species.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopGenRecord {
    pub marker: SpeciesMarker,
    pub effective_size: f32,
    pub census_size: usize,
    pub genetic_diversity: f32,
    pub inbreeding: f32,
    pub drift_rate: f32,
    pub bottleneck_severity: f32,
    pub historical_max: usize,
    pub founding_tick: Tick,
    pub last_updated: Tick,
    /// Last tick the species had living members; drives pruning.
    pub last_alive: Tick,
}

impl PopGenRecord {
    fn new(marker: SpeciesMarker, tick: Tick) -> Self {
        Self {
            marker,
            effective_size: 1.0,
            census_size: 0,
            genetic_diversity: INITIAL_DIVERSITY,
            inbreeding: 0.0,
            drift_rate: 0.25,
            bottleneck_severity: 0.0,
            historical_max: 0,
            founding_tick: tick,
            last_updated: tick,
            last_alive: tick,
        }
    }
}

/// Rolling census history for bottleneck detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SizeHistory {
    capacity: usize,
    sizes: VecDeque<usize>,
}

impl SizeHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sizes: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, size: usize) {
        if self.sizes.len() == self.capacity {
            self.sizes.pop_front();
        }
        self.sizes.push_back(size);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    #[must_use]
    pub fn max(&self) -> usize {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    /// `1 - min(last window) / max(history)`, floored at zero. Zero until
    /// `window` samples exist.
    #[must_use]
    pub fn bottleneck_severity(&self, window: usize) -> f32 {
        let window = window.max(1);
        if self.sizes.len() < window {
            return 0.0;
        }
        let peak = self.max();
        if peak == 0 {
            return 0.0;
        }
        let recent = self.sizes.iter().rev().take(window).copied().min().unwrap_or(0);
        (1.0 - recent as f32 / peak as f32).max(0.0)
    }
}

/// Wright's effective size from the spread of reproductive potential,
/// clamped to `[1, N]`. Degenerate inputs fall back to the census size.
#[must_use]
pub fn effective_population_size(members: &[&Agent]) -> f32 {
    let n = members.len();
    if n == 0 {
        return 0.0;
    }
    let census = n as f32;
    let k = members.iter().map(|a| a.reproductive_potential()).sum::<f32>() / census;
    if k <= 0.0 {
        return census;
    }
    let vk = members
        .iter()
        .map(|a| (a.reproductive_potential() - k).powi(2))
        .sum::<f32>()
        / census;
    let denominator = k - 1.0 + vk / k;
    if denominator <= 0.0 {
        return census;
    }
    let ne = (census * k - 1.0) / denominator;
    if ne.is_finite() {
        ne.clamp(1.0, census)
    } else {
        census
    }
}

/// Kimura's probability that a new mutation with selection coefficient `s`
/// fixes in a population of effective size `ne`.
#[must_use]
pub fn fixation_probability(ne: f32, s: f32) -> f32 {
    if ne <= 0.0 {
        return 0.0;
    }
    let neutral = (1.0 / (2.0 * ne)).min(1.0);
    if s == 0.0 || (ne * s).abs() < 0.01 {
        return neutral;
    }
    let s = f64::from(s);
    let ne = f64::from(ne);
    let p = (1.0 - (-2.0 * s).exp()) / (1.0 - (-4.0 * ne * s).exp());
    if p.is_finite() {
        (p as f32).clamp(0.0, 1.0)
    } else {
        neutral
    }
}

/// Mean pairwise neutral distance over up to `pairs` random pairs.
fn sample_diversity(members: &[&Agent], pairs: usize, rng: &mut dyn RngCore) -> f32 {
    let n = members.len();
    if n < 2 || pairs == 0 {
        return 0.0;
    }
    let all = n * (n - 1) / 2;
    let mut total = 0.0;
    let mut counted = 0usize;
    if all <= pairs {
        for i in 0..n {
            for j in (i + 1)..n {
                total += neutral_distance(&members[i].genome, &members[j].genome);
                counted += 1;
            }
        }
    } else {
        for _ in 0..pairs {
            let i = rng.pick_index(n).unwrap_or(0);
            let j = (i + rng.int_between(1, n as i64 - 1) as usize) % n;
            total += neutral_distance(&members[i].genome, &members[j].genome);
            counted += 1;
        }
    }
    total / counted as f32
}

/// Compact per-species view for logging and run summaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopGenSummary {
    pub marker: SpeciesMarker,
    pub census_size: usize,
    pub effective_size: f32,
    pub genetic_diversity: f32,
    pub inbreeding: f32,
    pub bottleneck_severity: f32,
    pub active_mutations: usize,
    pub clonal_interference: f32,
}

/// Owner of every species' population-genetics record.
#[derive(Debug, Clone)]
pub struct PopulationGenetics {
    settings: PopGenSettings,
    records: BTreeMap<SpeciesMarker, PopGenRecord>,
    histories: BTreeMap<SpeciesMarker, SizeHistory>,
    mutations: BTreeMap<SpeciesMarker, Vec<BeneficialMutation>>,
    last_diversity_sample: Option<Tick>,
}

impl PopulationGenetics {
    #[must_use]
    pub fn new(settings: PopGenSettings) -> Self {
        Self {
            settings,
            records: BTreeMap::new(),
            histories: BTreeMap::new(),
            mutations: BTreeMap::new(),
            last_diversity_sample: None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &PopGenSettings {
        &self.settings
    }

    fn generations(&self, dt: f32) -> f32 {
        if self.settings.ticks_per_generation <= 0.0 {
            return 0.0;
        }
        (f64::from(dt) / self.settings.ticks_per_generation) as f32
    }

    /// Refresh every species' record from the living agents. `dt` is the
    /// number of ticks since the previous update.
    pub fn update_population_genetics(
        &mut self,
        agents: &[Agent],
        dt: f32,
        tick: Tick,
        rng: &mut dyn RngCore,
    ) {
        let mut groups: BTreeMap<SpeciesMarker, Vec<&Agent>> = BTreeMap::new();
        for agent in agents.iter().filter(|a| a.alive) {
            groups.entry(agent.species_marker()).or_default().push(agent);
        }

        let resample = self
            .last_diversity_sample
            .is_none_or(|last| tick.since(last) >= self.settings.diversity_interval);
        if resample {
            self.last_diversity_sample = Some(tick);
        }
        let generations = self.generations(dt);

        for (marker, members) in &groups {
            let record = self.records.entry(*marker).or_insert_with(|| {
                debug!(%marker, tick = tick.0, "population genetics record created");
                PopGenRecord::new(*marker, tick)
            });
            let history = self
                .histories
                .entry(*marker)
                .or_insert_with(|| SizeHistory::new(self.settings.size_history_len));

            let census = members.len();
            record.census_size = census;
            record.effective_size = effective_population_size(members);
            history.push(census);
            record.historical_max = record.historical_max.max(census);
            record.bottleneck_severity = history.bottleneck_severity(self.settings.bottleneck_window);

            if resample {
                let sample = sample_diversity(members, self.settings.diversity_sample_pairs, rng);
                record.genetic_diversity = record.genetic_diversity * (1.0 - DIVERSITY_SMOOTHING)
                    + sample * DIVERSITY_SMOOTHING;
            }

            let ne = record.effective_size.max(1.0);
            let loss = (1.0 / (2.0 * ne)) * generations;
            record.genetic_diversity = (record.genetic_diversity * (1.0 - loss)).clamp(0.0, 1.0);
            record.inbreeding = (record.inbreeding + (1.0 - record.inbreeding) * loss).clamp(0.0, 1.0);
            record.drift_rate = 1.0 / (4.0 * ne);
            record.last_updated = tick;
            record.last_alive = tick;
        }

        for (marker, record) in &mut self.records {
            if groups.contains_key(marker) {
                continue;
            }
            record.census_size = 0;
            record.last_updated = tick;
            if let Some(history) = self.histories.get_mut(marker) {
                history.push(0);
                record.bottleneck_severity =
                    history.bottleneck_severity(self.settings.bottleneck_window);
            }
        }
        self.prune(tick);
    }

    fn prune(&mut self, tick: Tick) {
        let grace = self.settings.grace_period;
        let expired: Vec<SpeciesMarker> = self
            .records
            .values()
            .filter(|r| r.census_size == 0 && tick.since(r.last_alive) > grace)
            .map(|r| r.marker)
            .collect();
        for marker in expired {
            debug!(%marker, tick = tick.0, "population genetics record pruned");
            self.records.remove(&marker);
            self.histories.remove(&marker);
            self.mutations.remove(&marker);
        }
    }

    /// Seed a record for a population founded by `founders` individuals:
    /// diversity `1 - 1/(2n)` and inbreeding `1/(2n)`.
    pub fn record_founding_event(&mut self, marker: SpeciesMarker, founders: usize, tick: Tick) {
        let founders = founders.max(1);
        let share = 1.0 / (2.0 * founders as f32);
        let mut record = PopGenRecord::new(marker, tick);
        record.census_size = founders;
        record.effective_size = founders as f32;
        record.genetic_diversity = 1.0 - share;
        record.inbreeding = share;
        record.drift_rate = 1.0 / (4.0 * founders as f32);
        record.historical_max = founders;
        debug!(%marker, founders, tick = tick.0, "founding event");
        self.records.insert(marker, record);
        let mut history = SizeHistory::new(self.settings.size_history_len);
        history.push(founders);
        self.histories.insert(marker, history);
    }

    #[must_use]
    pub fn record(&self, marker: SpeciesMarker) -> Option<&PopGenRecord> {
        self.records.get(&marker)
    }

    pub fn records(&self) -> impl Iterator<Item = &PopGenRecord> + '_ {
        self.records.values()
    }

    #[must_use]
    pub fn history(&self, marker: SpeciesMarker) -> Option<&SizeHistory> {
        self.histories.get(&marker)
    }

    #[must_use]
    pub fn effective_population_size(&self, marker: SpeciesMarker) -> Option<f32> {
        self.record(marker).map(|r| r.effective_size)
    }

    #[must_use]
    pub fn genetic_diversity(&self, marker: SpeciesMarker) -> Option<f32> {
        self.record(marker).map(|r| r.genetic_diversity)
    }

    #[must_use]
    pub fn bottleneck_severity(&self, marker: SpeciesMarker) -> Option<f32> {
        self.record(marker).map(|r| r.bottleneck_severity)
    }

    #[must_use]
    pub fn species_inbreeding(&self, marker: SpeciesMarker) -> Option<f32> {
        self.record(marker).map(|r| r.inbreeding)
    }

    /// Fixation probability of a mutation with coefficient `s` in `marker`.
    #[must_use]
    pub fn fixation_probability(&self, marker: SpeciesMarker, s: f32) -> Option<f32> {
        self.record(marker)
            .map(|r| fixation_probability(r.effective_size, s))
    }

    /// Fitness multiplier from inbreeding depression, bottleneck stress, and
    /// low diversity. Agents of untracked species are unaffected.
    #[must_use]
    pub fn apply_population_level_effects(&self, agent: &Agent) -> f32 {
        let Some(record) = self.record(agent.species_marker()) else {
            return 1.0;
        };
        let mut multiplier = (-agent.genetic_load * record.inbreeding * 2.0).exp();
        if record.bottleneck_severity > 0.5 {
            multiplier *= 1.0 - (record.bottleneck_severity - 0.5);
        }
        if record.genetic_diversity < 0.3 {
            multiplier *= 1.0 - (0.3 - record.genetic_diversity) * 0.5;
        }
        if multiplier.is_finite() {
            multiplier.max(0.1)
        } else {
            1.0
        }
    }

    /// Differentiation between two species; see [`calculate_fst`].
    #[must_use]
    pub fn species_fst(&self, a: SpeciesMarker, b: SpeciesMarker, agents: &[Agent]) -> f32 {
        calculate_fst(a, b, agents, &self.settings)
    }

    #[must_use]
    pub fn summary(&self) -> Vec<PopGenSummary> {
        self.records
            .values()
            .map(|r| PopGenSummary {
                marker: r.marker,
                census_size: r.census_size,
                effective_size: r.effective_size,
                genetic_diversity: r.genetic_diversity,
                inbreeding: r.inbreeding,
                bottleneck_severity: r.bottleneck_severity,
                active_mutations: self.active_mutations(r.marker),
                clonal_interference: self.clonal_interference(r.marker),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolab_core::{EvolabConfig, Position};
    use evolab_genome::{RandomBodyOptions, generate_random_genome};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    pub(super) fn agents(count: usize, marker: u32, seed: u64) -> Vec<Agent> {
        let config = EvolabConfig::default();
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let genome = generate_random_genome(
                    RandomBodyOptions {
                        node_count: None,
                        species_marker: Some(SpeciesMarker(marker)),
                    },
                    &config,
                    &mut rng,
                );
                let mut agent = Agent::new(genome, &config.simulation, Position::default());
                agent.age = agent.maturity_age;
                agent.energy = agent.max_energy;
                agent
            })
            .collect()
    }

    #[test]
    fn bottleneck_scenario() {
        let mut history = SizeHistory::new(100);
        for _ in 0..20 {
            history.push(100);
        }
        for _ in 0..15 {
            history.push(5);
        }
        let severity = history.bottleneck_severity(10);
        assert!(severity >= 0.9, "severity {severity}");
        assert!((severity - 0.95).abs() < 1e-6);
    }

    #[test]
    fn bottleneck_needs_a_full_window() {
        let mut history = SizeHistory::new(100);
        for size in [100, 50, 5] {
            history.push(size);
        }
        assert_eq!(history.bottleneck_severity(10), 0.0);
    }

    #[test]
    fn history_is_bounded() {
        let mut history = SizeHistory::new(3);
        for size in [9, 1, 2, 3] {
            history.push(size);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.max(), 3);
    }

    #[test]
    fn effective_size_stays_within_census() {
        let mut rng = SmallRng::seed_from_u64(2);
        for count in 1..40 {
            let mut group = agents(count, 1, count as u64);
            for agent in &mut group {
                agent.energy = agent.max_energy * rng.uniform();
                if rng.chance(0.3) {
                    agent.age = 0;
                }
            }
            let refs: Vec<&Agent> = group.iter().collect();
            let ne = effective_population_size(&refs);
            assert!(ne >= 1.0 && ne <= count as f32, "ne {ne} for n {count}");
        }
        assert_eq!(effective_population_size(&[]), 0.0);
    }

    #[test]
    fn kimura_limits() {
        assert!((fixation_probability(50.0, 0.0) - 0.01).abs() < 1e-6);
        assert!((fixation_probability(50.0, 0.0001) - 0.01).abs() < 1e-6);
        let beneficial = fixation_probability(50.0, 0.05);
        assert!(beneficial > 0.01 && beneficial < 1.0);
        let deleterious = fixation_probability(50.0, -0.05);
        assert!(deleterious < 0.01 && deleterious >= 0.0);
        assert_eq!(fixation_probability(0.0, 0.1), 0.0);
    }

    #[test]
    fn founding_event_sets_diversity_and_inbreeding() {
        let mut popgen = PopulationGenetics::new(PopGenSettings::default());
        popgen.record_founding_event(SpeciesMarker(4), 5, Tick(7));
        let record = popgen.record(SpeciesMarker(4)).expect("founded");
        assert!((record.genetic_diversity - 0.9).abs() < 1e-6);
        assert!((record.inbreeding - 0.1).abs() < 1e-6);
        assert_eq!(record.founding_tick, Tick(7));
    }

    #[test]
    fn drift_erodes_diversity_and_raises_inbreeding() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut popgen = PopulationGenetics::new(PopGenSettings::default());
        let group = agents(4, 2, 11);
        popgen.update_population_genetics(&group, 10.0, Tick(0), &mut rng);
        let first = popgen.record(SpeciesMarker(2)).cloned().expect("tracked");
        for step in 1..=20u64 {
            popgen.update_population_genetics(&group, 10.0, Tick(step * 10), &mut rng);
        }
        let later = popgen.record(SpeciesMarker(2)).expect("tracked");
        assert!(later.inbreeding > first.inbreeding);
        assert!(later.inbreeding <= 1.0);
        assert!((later.drift_rate - 1.0 / (4.0 * later.effective_size)).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&later.genetic_diversity));
    }

    #[test]
    fn records_are_pruned_after_grace_period() {
        let mut rng = SmallRng::seed_from_u64(4);
        let settings = PopGenSettings {
            grace_period: 20,
            ..PopGenSettings::default()
        };
        let mut popgen = PopulationGenetics::new(settings);
        let group = agents(3, 9, 12);
        popgen.update_population_genetics(&group, 1.0, Tick(0), &mut rng);
        popgen.update_population_genetics(&[], 1.0, Tick(10), &mut rng);
        assert!(popgen.record(SpeciesMarker(9)).is_some());
        popgen.update_population_genetics(&[], 1.0, Tick(21), &mut rng);
        assert!(popgen.record(SpeciesMarker(9)).is_none());
        assert!(popgen.history(SpeciesMarker(9)).is_none());
    }

    #[test]
    fn population_effects_are_floored() {
        let mut popgen = PopulationGenetics::new(PopGenSettings::default());
        popgen.record_founding_event(SpeciesMarker(1), 1, Tick(0));
        let mut group = agents(1, 1, 13);
        group[0].genetic_load = 50.0;
        let multiplier = popgen.apply_population_level_effects(&group[0]);
        assert!((multiplier - 0.1).abs() < 1e-6);

        group[0].genetic_load = 0.0;
        let untouched = popgen.apply_population_level_effects(&group[0]);
        assert!((untouched - 1.0).abs() < 1e-6);

        let stranger = agents(1, 77, 14);
        assert_eq!(popgen.apply_population_level_effects(&stranger[0]), 1.0);
    }
}
