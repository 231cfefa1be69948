//! Populations of evolab organisms: storage, reproduction, species
//! bookkeeping, and population genetics.

pub mod agent;
pub mod popgen;
pub mod reproduction;
pub mod species;

pub use agent::{Agent, AgentArena};
pub use popgen::{
    Barrier, BeneficialMutation, MutationStatus, PopGenRecord, PopGenSummary, PopulationGenetics,
    SizeHistory, calculate_fst, calculate_geographic_fst, effective_population_size,
    fixation_probability, heterozygosity,
};
pub use reproduction::{
    MarkerAllocator, Offspring, SpeciationEvent, reproduce_asexual, reproduce_sexual,
};
pub use species::{
    PhylogenyEntry, SpeciesDataError, SpeciesEvent, SpeciesRecord, SpeciesTracker, species_color,
};
