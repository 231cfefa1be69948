//! Headless tick loop wiring the genetics core together.
//!
//! Each tick runs a fixed sequence of stages: aging, metabolism, fitness,
//! gene transfer, viral outbreaks, death cleanup, reproduction, and spawn
//! commit. Species tracking follows every tick; reclustering and population
//! genetics run on their configured intervals.

use evolab_core::{ConfigError, EvolabConfig, Position, RandomSource, SpeciesMarker, Tick};
use evolab_genome::{
    Plasmid, RandomBodyOptions, VirusGenome, conjugate, crispr_prevalence, epistatic_multiplier,
    generate_random_genome, genome_complexity, identify_fitness_peak,
};
use evolab_population::{
    Agent, AgentArena, Barrier, MarkerAllocator, MutationStatus, PopGenSummary, PopulationGenetics,
    SpeciationEvent, SpeciesTracker, calculate_fst, calculate_geographic_fst, reproduce_asexual,
    reproduce_sexual,
};
use rand::rngs::SmallRng;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

/// Relative fitness gain at which a mutation is tracked as beneficial.
const BENEFICIAL_GAIN: f32 = 0.05;
const SPAWN_JITTER: f32 = 2.0;
const LOAD_PER_MUTATION: f32 = 0.01;
const MAX_GENETIC_LOAD: f32 = 2.0;
const FOUNDER_PLASMID_CHANCE: f32 = 0.3;
const TRANSFER_MUTATION_CHANCE: f32 = 0.1;
/// Plasmids released by dead cells that stay available for uptake.
const RELEASE_POOL: usize = 64;
const HISTORY_CAPACITY: usize = 256;

/// Per-tick aggregate.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub agent_count: usize,
    pub species: usize,
    pub births: usize,
    pub deaths: usize,
    pub transfers: usize,
    pub infections: usize,
    pub average_energy: f32,
    pub average_fitness: f32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpeciesSnapshot {
    pub marker: SpeciesMarker,
    pub count: usize,
    pub avg_energy: f32,
    pub avg_fitness: f32,
    pub peak_population: usize,
    pub ancestor: Option<SpeciesMarker>,
    pub color: [f32; 3],
    pub intra_distance: f32,
}

/// End-of-run report printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub seed: Option<u64>,
    pub ticks: u64,
    pub population: usize,
    pub births: usize,
    pub deaths: usize,
    pub speciations: usize,
    pub transfers: usize,
    pub infections: usize,
    pub sweeps: usize,
    pub species_count: usize,
    pub endangered: Vec<SpeciesMarker>,
    pub phylogeny_depth: usize,
    pub dominant_peak: Option<&'static str>,
    /// Fst between the two most populous species.
    pub leading_pair_fst: Option<f32>,
    /// Fst across a vertical barrier through the middle of the world.
    pub geographic_fst: f32,
    pub species: Vec<SpeciesSnapshot>,
    pub population_genetics: Vec<PopGenSummary>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    births: usize,
    deaths: usize,
    speciations: usize,
    transfers: usize,
    infections: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct TickCounters {
    births: usize,
    deaths: usize,
    transfers: usize,
    infections: usize,
}

struct PendingMutation {
    marker: SpeciesMarker,
    lineage: u64,
    selection_coefficient: f32,
}

pub struct Simulation {
    config: EvolabConfig,
    rng: SmallRng,
    tick: Tick,
    agents: AgentArena,
    tracker: SpeciesTracker,
    popgen: PopulationGenetics,
    allocator: MarkerAllocator,
    virus: Option<VirusGenome>,
    released: VecDeque<(Plasmid, SpeciesMarker)>,
    pending_spawns: Vec<Agent>,
    pending_speciations: Vec<SpeciationEvent>,
    pending_mutations: Vec<PendingMutation>,
    last_popgen_update: Tick,
    counters: TickCounters,
    totals: Totals,
    extinct_reported: bool,
    history: VecDeque<TickSummary>,
}

impl Simulation {
    /// Validate `config` and seed the founder population.
    pub fn new(config: EvolabConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let mut sim = Self {
            tracker: SpeciesTracker::new(config.species.clone()),
            popgen: PopulationGenetics::new(config.popgen.clone()),
            agents: AgentArena::with_capacity(config.simulation.max_population),
            rng,
            tick: Tick::zero(),
            allocator: MarkerAllocator::new(),
            virus: None,
            released: VecDeque::with_capacity(RELEASE_POOL),
            pending_spawns: Vec::new(),
            pending_speciations: Vec::new(),
            pending_mutations: Vec::new(),
            last_popgen_update: Tick::zero(),
            counters: TickCounters::default(),
            totals: Totals::default(),
            extinct_reported: false,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            config,
        };
        sim.seed_founders();
        Ok(sim)
    }

    fn seed_founders(&mut self) {
        let world = self.config.simulation.world_size;
        let cap = self.config.hgt.max_plasmids;
        for _ in 0..self.config.simulation.founders {
            let mut genome =
                generate_random_genome(RandomBodyOptions::default(), &self.config, &mut self.rng);
            if self.rng.chance(FOUNDER_PLASMID_CHANCE) {
                let marker = genome.species_marker;
                genome
                    .hgt
                    .accept_plasmid(Plasmid::spontaneous(&mut self.rng), marker, cap);
            }
            let position = Position::new(
                self.rng.between(0.0, world),
                self.rng.between(0.0, world),
            );
            let mut agent = Agent::new(genome, &self.config.simulation, position);
            agent.fitness = epistatic_multiplier(&agent.genome);
            self.agents.insert(agent);
        }

        self.allocator = MarkerAllocator::above(self.agents.agents());
        let mut founders: BTreeMap<SpeciesMarker, usize> = BTreeMap::new();
        for agent in self.agents.agents() {
            *founders.entry(agent.species_marker()).or_default() += 1;
        }
        for (marker, count) in &founders {
            self.popgen.record_founding_event(*marker, *count, self.tick);
        }
        self.tracker.update_species_tracking(self.agents.agents(), self.tick);
        info!(
            founders = self.agents.len(),
            species = founders.len(),
            seed = ?self.config.rng_seed,
            "seeded founder population"
        );
    }

    #[must_use]
    pub fn config(&self) -> &EvolabConfig {
        &self.config
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        self.agents.agents()
    }

    #[must_use]
    pub fn species_tracker(&self) -> &SpeciesTracker {
        &self.tracker
    }

    #[must_use]
    pub fn population_genetics(&self) -> &PopulationGenetics {
        &self.popgen
    }

    pub fn history(&self) -> impl Iterator<Item = &TickSummary> + '_ {
        self.history.iter()
    }

    /// Advance one tick.
    pub fn step(&mut self) -> TickSummary {
        let next_tick = self.tick.next();
        self.counters = TickCounters::default();

        self.stage_aging();
        self.stage_metabolism();
        self.stage_fitness();
        self.stage_transfer();
        self.stage_infection(next_tick);
        self.stage_death_cleanup();
        self.stage_reproduction();
        self.stage_spawn_commit(next_tick);
        self.tracker
            .update_species_tracking(self.agents.agents(), next_tick);
        self.stage_recluster(next_tick);
        self.stage_population_genetics(next_tick);

        self.tick = next_tick;
        let summary = self.tick_summary();
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(summary.clone());
        summary
    }

    /// Run `ticks` steps, stopping early if the population dies out.
    pub fn run(&mut self, ticks: u64) -> RunSummary {
        for _ in 0..ticks {
            self.step();
            if self.agents.is_empty() {
                break;
            }
        }
        self.summary()
    }

    fn stage_aging(&mut self) {
        let max_age = self.config.simulation.max_age;
        for agent in self.agents.agents_mut() {
            agent.age = agent.age.saturating_add(1);
            agent.genome.hgt.age_plasmids();
            if agent.age > max_age {
                agent.alive = false;
            }
        }
    }

    fn stage_metabolism(&mut self) {
        let settings = &self.config.simulation;
        for agent in self.agents.agents_mut() {
            if !agent.alive {
                continue;
            }
            let plasmid_bonus = (1.0 + agent.genome.hgt.plasmid_fitness()).max(0.0);
            let intake = settings.food_intake
                * agent.genome.metabolism.efficiency
                * agent.fitness
                * plasmid_bonus;
            let upkeep = settings.complexity_cost * genome_complexity(&agent.genome) as f32;
            agent.energy = (agent.energy + intake - upkeep).min(agent.max_energy);
            if agent.energy <= 0.0 {
                agent.alive = false;
            }
        }
    }

    fn stage_fitness(&mut self) {
        let popgen = &self.popgen;
        for agent in self.agents.agents_mut() {
            if !agent.alive {
                continue;
            }
            let population = popgen.apply_population_level_effects(agent);
            agent.fitness = epistatic_multiplier(&agent.genome) * population;
        }
    }

    fn stage_transfer(&mut self) {
        let count = self.agents.len();
        if count < 2 {
            return;
        }
        let cap = self.config.hgt.max_plasmids;
        let strength = self.config.hgt.plasmid_mutation_strength;
        for _ in 0..self.config.simulation.transfer_attempts {
            let (Some(d), Some(r)) = (self.rng.pick_index(count), self.rng.pick_index(count))
            else {
                continue;
            };
            let Ok([donor, recipient]) = self.agents.agents_mut().get_disjoint_mut([d, r]) else {
                continue;
            };
            if !donor.alive || !recipient.alive {
                continue;
            }
            if let Some(id) =
                conjugate(&mut donor.genome, &mut recipient.genome, &self.config, &mut self.rng)
            {
                if self.rng.chance(TRANSFER_MUTATION_CHANCE)
                    && let Some(copy) = recipient.genome.hgt.plasmids.iter_mut().find(|p| p.id == id)
                {
                    copy.mutate(&mut self.rng, strength);
                }
                self.counters.transfers += 1;
            }
        }

        // Transformation: uptake of DNA released by dead cells.
        if self.released.is_empty() {
            return;
        }
        let Some(index) = self.rng.pick_index(count) else {
            return;
        };
        let agent = &mut self.agents.agents_mut()[index];
        if !agent.alive
            || !agent.genome.hgt.transfer_type.transforms()
            || !self.rng.chance(agent.genome.hgt.recipient_openness)
        {
            return;
        }
        let Some(slot) = self.rng.pick_index(self.released.len()) else {
            return;
        };
        if let Some((plasmid, donor)) = self.released.remove(slot) {
            let copy = plasmid.clone_for_transfer(&mut self.rng);
            if agent.genome.hgt.accept_plasmid(copy, donor, cap) {
                self.counters.transfers += 1;
            }
        }
    }

    fn stage_infection(&mut self, tick: Tick) {
        let interval = self.config.simulation.infection_interval;
        if interval == 0 || !tick.0.is_multiple_of(interval) || self.agents.is_empty() {
            return;
        }
        let pool = self.config.viral.receptor_pool;
        let virus = match self.virus.take() {
            Some(previous) => {
                let prevalence = crispr_prevalence(
                    self.agents.agents().iter().map(|a| &a.genome),
                    previous.primary_marker(),
                );
                previous.progeny(prevalence, pool, &mut self.rng)
            }
            None => VirusGenome::random(pool, &mut self.rng),
        };

        let slots = self.config.viral.crispr_memory_slots;
        let damage = self.config.simulation.infection_damage * virus.replication_rate;
        let mut exposed = 0usize;
        let mut infected = 0usize;
        for agent in self.agents.agents_mut() {
            if !agent.alive || !virus.binds(&agent.genome.viral) {
                continue;
            }
            exposed += 1;
            if !self.rng.chance(agent.genome.viral.susceptibility(&virus)) {
                continue;
            }
            infected += 1;
            agent.energy -= damage;
            if agent.energy <= 0.0 {
                agent.alive = false;
            } else {
                agent.genome.viral.remember(virus.primary_marker(), slots);
            }
        }
        info!(
            tick = tick.0,
            virus_generation = virus.generation,
            exposed,
            infected,
            "viral outbreak"
        );
        self.counters.infections += infected;
        self.virus = Some(virus);
    }

    fn stage_death_cleanup(&mut self) {
        let dead = self.agents.dead();
        if dead.is_empty() {
            return;
        }
        let releasing = self
            .agents
            .agents()
            .iter()
            .filter(|a| !a.alive && a.genome.hgt.release_on_death);
        for agent in releasing {
            for plasmid in &agent.genome.hgt.plasmids {
                if self.released.len() == RELEASE_POOL {
                    self.released.pop_front();
                }
                self.released
                    .push_back((plasmid.clone(), agent.species_marker()));
            }
        }
        self.counters.deaths = self.agents.remove_many(&dead);
        if self.agents.is_empty() && !self.extinct_reported {
            warn!(tick = self.tick.0, "population died out");
            self.extinct_reported = true;
        }
    }

    fn stage_reproduction(&mut self) {
        let settings = &self.config.simulation;
        let capacity = settings
            .max_population
            .saturating_sub(self.agents.len());
        if capacity == 0 {
            return;
        }
        let cost = settings.reproduction_cost;
        let threshold = settings.reproduction_threshold;
        let sexual_rate = settings.sexual_rate;
        let world = settings.world_size;

        let agents = self.agents.agents();
        let mut mates: BTreeMap<SpeciesMarker, Vec<usize>> = BTreeMap::new();
        for (index, agent) in agents.iter().enumerate() {
            if agent.alive && agent.is_mature() {
                mates.entry(agent.species_marker()).or_default().push(index);
            }
        }
        let parents: Vec<usize> = agents
            .iter()
            .enumerate()
            .filter(|(_, a)| {
                a.alive && a.is_mature() && a.energy_ratio() >= threshold && a.energy >= cost
            })
            .map(|(index, _)| index)
            .collect();

        let mut paid = Vec::with_capacity(parents.len());
        for index in parents {
            if self.pending_spawns.len() >= capacity {
                break;
            }
            let parent = &agents[index];
            let mate = if self.rng.chance(sexual_rate) {
                mates
                    .get(&parent.species_marker())
                    .and_then(|candidates| pick_mate(candidates, index, &mut self.rng))
            } else {
                None
            };

            let offspring = match mate {
                Some(other) => reproduce_sexual(
                    &parent.genome,
                    &agents[other].genome,
                    &self.config,
                    &mut self.allocator,
                    &mut self.rng,
                ),
                None => reproduce_asexual(
                    &parent.genome,
                    &self.config,
                    &mut self.allocator,
                    &mut self.rng,
                ),
            };

            let inherited = mate.map_or(parent.genetic_load, |other| {
                (parent.genetic_load + agents[other].genetic_load) * 0.5
            });
            let genetic_load = (inherited + LOAD_PER_MUTATION * offspring.mutations.len() as f32)
                .min(MAX_GENETIC_LOAD);

            if !offspring.mutations.is_empty() {
                let before = epistatic_multiplier(&parent.genome);
                let after = epistatic_multiplier(&offspring.genome);
                let gain = after / before - 1.0;
                if gain >= BENEFICIAL_GAIN {
                    self.pending_mutations.push(PendingMutation {
                        marker: offspring.genome.species_marker,
                        lineage: offspring.genome.lineage,
                        selection_coefficient: gain.min(1.0),
                    });
                }
            }
            if let Some(event) = offspring.speciation {
                self.pending_speciations.push(event);
            }

            let position = Position::new(
                (parent.position.x + self.rng.between(-SPAWN_JITTER, SPAWN_JITTER)).clamp(0.0, world),
                (parent.position.y + self.rng.between(-SPAWN_JITTER, SPAWN_JITTER)).clamp(0.0, world),
            );
            let mut child = Agent::new(offspring.genome, &self.config.simulation, position);
            child.genetic_load = genetic_load;
            self.pending_spawns.push(child);
            paid.push(index);
        }

        let agents = self.agents.agents_mut();
        for index in paid {
            agents[index].energy -= cost;
        }
    }

    fn stage_spawn_commit(&mut self, tick: Tick) {
        for child in self.pending_spawns.drain(..) {
            self.agents.insert(child);
            self.counters.births += 1;
        }
        for event in self.pending_speciations.drain(..) {
            self.tracker.register_speciation(&event, tick);
            self.popgen.record_founding_event(event.child, 1, tick);
            self.totals.speciations += 1;
        }
        for pending in self.pending_mutations.drain(..) {
            self.popgen.record_beneficial_mutation(
                pending.marker,
                pending.lineage,
                pending.selection_coefficient,
                tick,
            );
        }
    }

    fn stage_recluster(&mut self, tick: Tick) {
        let interval = self.config.simulation.recluster_interval;
        if interval == 0 || !tick.0.is_multiple_of(interval) {
            return;
        }
        let relabelled = self
            .tracker
            .recluster_species(self.agents.agents_mut(), tick);
        debug!(tick = tick.0, relabelled, "reclustered species");
    }

    fn stage_population_genetics(&mut self, tick: Tick) {
        let interval = self.config.simulation.popgen_interval;
        if interval == 0 || !tick.0.is_multiple_of(interval) {
            return;
        }
        let dt = tick.since(self.last_popgen_update) as f32;
        self.popgen
            .update_population_genetics(self.agents.agents(), dt, tick, &mut self.rng);
        self.popgen.update_beneficial_mutations(dt, tick, &mut self.rng);
        self.last_popgen_update = tick;
    }

    fn tick_summary(&mut self) -> TickSummary {
        let counters = self.counters;
        self.totals.births += counters.births;
        self.totals.deaths += counters.deaths;
        self.totals.transfers += counters.transfers;
        self.totals.infections += counters.infections;

        let agents = self.agents.agents();
        let count = agents.len();
        let (energy, fitness) = agents
            .iter()
            .fold((0.0, 0.0), |(e, f), a| (e + a.energy, f + a.fitness));
        let mean = |total: f32| if count == 0 { 0.0 } else { total / count as f32 };
        TickSummary {
            tick: self.tick,
            agent_count: count,
            species: self.tracker.species_count(),
            births: counters.births,
            deaths: counters.deaths,
            transfers: counters.transfers,
            infections: counters.infections,
            average_energy: mean(energy),
            average_fitness: mean(fitness),
        }
    }

    /// Report on the current state.
    pub fn summary(&mut self) -> RunSummary {
        let agents = self.agents.agents();
        let mut living: Vec<_> = self.tracker.records().filter(|r| r.count > 0).collect();
        living.sort_by(|a, b| b.count.cmp(&a.count).then(a.marker.cmp(&b.marker)));

        let species: Vec<SpeciesSnapshot> = living
            .iter()
            .map(|record| SpeciesSnapshot {
                marker: record.marker,
                count: record.count,
                avg_energy: record.avg_energy,
                avg_fitness: record.avg_fitness,
                peak_population: record.peak_population,
                ancestor: record.ancestor,
                color: record.color,
                intra_distance: self
                    .tracker
                    .intra_species_distance(record.marker, agents, &mut self.rng),
            })
            .collect();

        let leading_pair_fst = match living.as_slice() {
            [first, second, ..] => Some(calculate_fst(
                first.marker,
                second.marker,
                agents,
                &self.config.popgen,
            )),
            _ => None,
        };
        let barrier = Barrier::Vertical(self.config.simulation.world_size * 0.5);

        let mut peaks: BTreeMap<&'static str, usize> = BTreeMap::new();
        for agent in agents {
            *peaks
                .entry(identify_fitness_peak(&agent.genome).label())
                .or_default() += 1;
        }
        let dominant_peak = peaks
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
            .map(|(label, _)| label);

        let sweeps = self
            .tracker
            .records()
            .map(|r| {
                self.popgen
                    .beneficial_mutations(r.marker)
                    .iter()
                    .filter(|m| m.status == MutationStatus::Fixed)
                    .count()
            })
            .sum();

        RunSummary {
            seed: self.config.rng_seed,
            ticks: self.tick.0,
            population: agents.len(),
            births: self.totals.births,
            deaths: self.totals.deaths,
            speciations: self.totals.speciations,
            transfers: self.totals.transfers,
            infections: self.totals.infections,
            sweeps,
            species_count: self.tracker.species_count(),
            endangered: self.tracker.endangered_species(),
            phylogeny_depth: self
                .tracker
                .phylogeny()
                .iter()
                .map(|entry| entry.depth)
                .max()
                .unwrap_or(0),
            dominant_peak,
            leading_pair_fst,
            geographic_fst: calculate_geographic_fst(barrier, agents, &self.config.popgen),
            species,
            population_genetics: self.popgen.summary(),
        }
    }
}

/// Random mature partner from `candidates` other than `parent`.
fn pick_mate(candidates: &[usize], parent: usize, rng: &mut SmallRng) -> Option<usize> {
    if candidates.len() < 2 {
        return None;
    }
    let start = rng.pick_index(candidates.len())?;
    (0..candidates.len())
        .map(|offset| candidates[(start + offset) % candidates.len()])
        .find(|&candidate| candidate != parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(seed: u64) -> EvolabConfig {
        let mut config = EvolabConfig {
            rng_seed: Some(seed),
            ..EvolabConfig::default()
        };
        config.simulation.founders = 20;
        config.simulation.max_population = 60;
        config.simulation.maturity_age = 5;
        config.simulation.infection_interval = 20;
        config
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = small_config(1);
        config.simulation.world_size = 0.0;
        assert!(Simulation::new(config).is_err());
    }

    #[test]
    fn founders_are_tracked() {
        let sim = Simulation::new(small_config(2)).expect("valid config");
        assert_eq!(sim.agents().len(), 20);
        let tracked: usize = sim.species_tracker().records().map(|r| r.count).sum();
        assert_eq!(tracked, 20);
        for record in sim.species_tracker().records() {
            assert!(sim.population_genetics().record(record.marker).is_some());
        }
    }

    #[test]
    fn population_stays_within_cap() {
        let mut sim = Simulation::new(small_config(3)).expect("valid config");
        for _ in 0..200 {
            let summary = sim.step();
            assert!(summary.agent_count <= 60);
            assert!(summary.average_energy <= 100.0);
        }
        assert_eq!(sim.tick(), Tick(200));
        assert!(sim.history().count() <= HISTORY_CAPACITY);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mut a = Simulation::new(small_config(4)).expect("valid config");
        let mut b = Simulation::new(small_config(4)).expect("valid config");
        for _ in 0..80 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn mate_is_never_the_parent() {
        let mut rng = <SmallRng as rand::SeedableRng>::seed_from_u64(5);
        assert_eq!(pick_mate(&[3], 3, &mut rng), None);
        for _ in 0..20 {
            let mate = pick_mate(&[1, 2, 3], 2, &mut rng).expect("mate");
            assert_ne!(mate, 2);
        }
    }
}
