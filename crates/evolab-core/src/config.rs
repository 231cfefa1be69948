//! Injected configuration for the genetics core.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Bounds on the body graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenomeLimits {
    /// Fewest nodes a body may have; structural removal stops here.
    pub min_nodes: usize,
    /// Most nodes a body may grow to.
    pub max_nodes: usize,
    /// Upper bound on node count for randomly generated founders.
    pub initial_max_nodes: usize,
    /// Most links a body may carry.
    pub max_links: usize,
    /// Most motors a body may carry.
    pub max_motors: usize,
    /// Most sensors a body may carry (also the crossover sensor cap).
    pub max_sensors: usize,
    /// Most sensors placed on a randomly generated founder.
    pub initial_max_sensors: usize,
    /// Per-link chance of receiving a motor in a random founder.
    pub motor_chance: f32,
}

impl Default for GenomeLimits {
    fn default() -> Self {
        Self {
            min_nodes: 3,
            max_nodes: 16,
            initial_max_nodes: 8,
            max_links: 40,
            max_motors: 12,
            max_sensors: 5,
            initial_max_sensors: 3,
            motor_chance: 0.5,
        }
    }
}

/// Per-operator mutation probabilities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MutationSettings {
    /// Chance that a point-mutation pass runs.
    pub point_rate: f32,
    /// Half-width of the uniform point perturbation.
    pub strength: f32,
    pub add_node: f32,
    pub remove_node: f32,
    pub add_link: f32,
    pub remove_link: f32,
    pub add_motor: f32,
    pub remove_motor: f32,
    pub add_sensor: f32,
    pub remove_sensor: f32,
    /// Chance that social traits are perturbed.
    pub social: f32,
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            point_rate: 0.3,
            strength: 0.2,
            add_node: 0.05,
            remove_node: 0.03,
            add_link: 0.05,
            remove_link: 0.03,
            add_motor: 0.05,
            remove_motor: 0.03,
            add_sensor: 0.03,
            remove_sensor: 0.02,
            social: 0.2,
        }
    }
}

/// Species clustering knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeciesSettings {
    /// Genetic distance at or above which two genomes are different species.
    pub distance_threshold: f32,
    /// Living species at or below this head count are reported as endangered.
    pub endangered_threshold: usize,
    /// Number of species events retained in memory.
    pub history_capacity: usize,
    /// Cap on sampled pairs for intra-species distance queries.
    pub distance_sample_pairs: usize,
}

impl Default for SpeciesSettings {
    fn default() -> Self {
        Self {
            distance_threshold: 0.3,
            endangered_threshold: 5,
            history_capacity: 256,
            distance_sample_pairs: 100,
        }
    }
}

/// Viral receptor and CRISPR parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViralSettings {
    /// Capacity of a genome's CRISPR memory.
    pub crispr_memory_slots: usize,
    /// Per-entry loss probability when CRISPR memory is inherited.
    pub crispr_memory_decay: f32,
    /// Most receptors a genome can express.
    pub max_receptors: usize,
    /// Receptor and surface-marker ids are drawn from `0..receptor_pool`.
    pub receptor_pool: u32,
}

impl Default for ViralSettings {
    fn default() -> Self {
        Self {
            crispr_memory_slots: 8,
            crispr_memory_decay: 0.1,
            max_receptors: 5,
            receptor_pool: 12,
        }
    }
}

/// Horizontal gene transfer parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HgtSettings {
    /// Most plasmids a genome carries at once.
    pub max_plasmids: usize,
    /// Half-width of plasmid gene perturbations.
    pub plasmid_mutation_strength: f32,
}

impl Default for HgtSettings {
    fn default() -> Self {
        Self {
            max_plasmids: 3,
            plasmid_mutation_strength: 0.1,
        }
    }
}

/// Population-genetics bookkeeping parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PopGenSettings {
    /// Ticks that make up one generation for drift scaling.
    pub ticks_per_generation: f64,
    /// Ticks between diversity re-samples.
    pub diversity_interval: u64,
    /// Random pairs drawn per diversity sample.
    pub diversity_sample_pairs: usize,
    /// Census sizes kept per species for bottleneck detection.
    pub size_history_len: usize,
    /// Recent window whose minimum is compared against the historical max.
    pub bottleneck_window: usize,
    /// Ticks a record survives after its species has no living members.
    pub grace_period: u64,
    /// Ticks fixed or lost mutations stay visible before pruning.
    pub sweep_retention: u64,
    /// Minimum members per species for species Fst.
    pub fst_min_species: usize,
    /// Minimum members per side for barrier Fst.
    pub fst_min_barrier: usize,
    /// Cap on pairs evaluated per heterozygosity estimate.
    pub fst_pair_cap: usize,
}

impl Default for PopGenSettings {
    fn default() -> Self {
        Self {
            ticks_per_generation: 100.0,
            diversity_interval: 50,
            diversity_sample_pairs: 20,
            size_history_len: 100,
            bottleneck_window: 10,
            grace_period: 500,
            sweep_retention: 500,
            fst_min_species: 2,
            fst_min_barrier: 5,
            fst_pair_cap: 100,
        }
    }
}

/// Knobs for the headless driver that exercises the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    /// Founders spawned at start-up.
    pub founders: usize,
    /// Hard cap on live agents; reproduction pauses above it.
    pub max_population: usize,
    /// Energy capacity of every agent.
    pub max_energy: f32,
    /// Energy a founder or child starts with.
    pub initial_energy: f32,
    /// Energy gathered per tick at metabolic efficiency 1.0.
    pub food_intake: f32,
    /// Energy drained per tick per unit of genome complexity.
    pub complexity_cost: f32,
    /// Energy ratio required before reproducing.
    pub reproduction_threshold: f32,
    /// Energy paid by a parent per offspring.
    pub reproduction_cost: f32,
    /// Chance a reproduction event is sexual when a mate exists.
    pub sexual_rate: f32,
    /// Age at which agents become reproductively mature.
    pub maturity_age: u32,
    /// Age at which agents die of old age.
    pub max_age: u32,
    /// Ticks between single-linkage reclustering passes; 0 disables.
    pub recluster_interval: u64,
    /// Ticks between population-genetics updates; 0 disables.
    pub popgen_interval: u64,
    /// Side length of the square world agents are placed in.
    pub world_size: f32,
    /// Random donor/recipient pairings attempted per tick.
    pub transfer_attempts: usize,
    /// Ticks between viral outbreaks; 0 disables.
    pub infection_interval: u64,
    /// Energy an infection costs at full replication rate.
    pub infection_damage: f32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            founders: 40,
            max_population: 400,
            max_energy: 100.0,
            initial_energy: 50.0,
            food_intake: 1.2,
            complexity_cost: 0.02,
            reproduction_threshold: 0.8,
            reproduction_cost: 40.0,
            sexual_rate: 0.5,
            maturity_age: 50,
            max_age: 1_500,
            recluster_interval: 200,
            popgen_interval: 10,
            world_size: 100.0,
            transfer_attempts: 4,
            infection_interval: 250,
            infection_damage: 20.0,
        }
    }
}

/// Static configuration for the genetics core.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvolabConfig {
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    pub genome: GenomeLimits,
    pub mutation: MutationSettings,
    pub species: SpeciesSettings,
    pub viral: ViralSettings,
    pub hgt: HgtSettings,
    pub popgen: PopGenSettings,
    pub simulation: SimulationSettings,
}

fn is_probability(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

impl EvolabConfig {
    /// Validates cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let genome = &self.genome;
        if genome.min_nodes < 2 {
            return Err(ConfigError::InvalidConfig("genome.min_nodes must be at least 2"));
        }
        if genome.max_nodes < genome.min_nodes || genome.initial_max_nodes < genome.min_nodes {
            return Err(ConfigError::InvalidConfig(
                "genome node bounds must not fall below min_nodes",
            ));
        }
        if genome.initial_max_nodes > genome.max_nodes {
            return Err(ConfigError::InvalidConfig(
                "genome.initial_max_nodes cannot exceed max_nodes",
            ));
        }
        if genome.max_links < genome.max_nodes {
            return Err(ConfigError::InvalidConfig(
                "genome.max_links must allow a ring over max_nodes",
            ));
        }
        if genome.initial_max_sensors > genome.max_sensors {
            return Err(ConfigError::InvalidConfig(
                "genome.initial_max_sensors cannot exceed max_sensors",
            ));
        }
        if !is_probability(genome.motor_chance) {
            return Err(ConfigError::InvalidConfig("genome.motor_chance must be in [0, 1]"));
        }

        let m = &self.mutation;
        let rates = [
            m.point_rate,
            m.add_node,
            m.remove_node,
            m.add_link,
            m.remove_link,
            m.add_motor,
            m.remove_motor,
            m.add_sensor,
            m.remove_sensor,
            m.social,
        ];
        if !rates.into_iter().all(is_probability) {
            return Err(ConfigError::InvalidConfig(
                "mutation probabilities must be in [0, 1]",
            ));
        }
        if m.strength < 0.0 {
            return Err(ConfigError::InvalidConfig("mutation.strength must be non-negative"));
        }

        if self.species.distance_threshold <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "species.distance_threshold must be positive",
            ));
        }
        if self.species.history_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "species.history_capacity must be non-zero",
            ));
        }

        if self.viral.crispr_memory_slots == 0 || self.viral.max_receptors == 0 {
            return Err(ConfigError::InvalidConfig(
                "viral memory slots and receptor cap must be non-zero",
            ));
        }
        if !is_probability(self.viral.crispr_memory_decay) {
            return Err(ConfigError::InvalidConfig(
                "viral.crispr_memory_decay must be in [0, 1]",
            ));
        }
        if self.viral.receptor_pool == 0 {
            return Err(ConfigError::InvalidConfig("viral.receptor_pool must be non-zero"));
        }

        let p = &self.popgen;
        if p.ticks_per_generation <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "popgen.ticks_per_generation must be positive",
            ));
        }
        if p.size_history_len == 0
            || p.bottleneck_window == 0
            || p.bottleneck_window > p.size_history_len
        {
            return Err(ConfigError::InvalidConfig(
                "popgen.bottleneck_window must be in 1..=size_history_len",
            ));
        }
        if p.fst_min_species < 2 || p.fst_min_barrier < 2 || p.fst_pair_cap == 0 {
            return Err(ConfigError::InvalidConfig(
                "popgen Fst sample minimums must be at least 2 and the pair cap non-zero",
            ));
        }

        let s = &self.simulation;
        if s.max_energy <= 0.0 || s.initial_energy < 0.0 || s.initial_energy > s.max_energy {
            return Err(ConfigError::InvalidConfig(
                "simulation energy must satisfy 0 <= initial_energy <= max_energy, max positive",
            ));
        }
        if s.food_intake < 0.0 || s.complexity_cost < 0.0 || s.reproduction_cost < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "simulation intake and costs must be non-negative",
            ));
        }
        if !is_probability(s.reproduction_threshold) || !is_probability(s.sexual_rate) {
            return Err(ConfigError::InvalidConfig(
                "simulation reproduction_threshold and sexual_rate must be in [0, 1]",
            ));
        }
        if s.world_size <= 0.0 || s.infection_damage < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "simulation world_size must be positive and infection_damage non-negative",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
