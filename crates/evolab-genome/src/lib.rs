//! Genome model and genetic operators for evolab organisms.

pub mod crossover;
pub mod distance;
pub mod epistasis;
pub mod factory;
pub mod model;
pub mod mutation;
pub mod plasmid;
pub mod traits;
pub mod validate;
pub mod virus;

pub use crossover::{crossover, inherit_crispr};
pub use distance::{genetic_distance, is_same_species, neutral_distance};
pub use epistasis::{
    EPISTATIC_RULES, EpistaticRule, FitnessPeak, InteractionKind, calculate_epistatic_fitness,
    epistatic_multiplier, fitness_landscape_curvature, has_sign_epistasis, identify_fitness_peak,
};
pub use factory::{GenomeOptions, RandomBodyOptions, clone_genome, create_genome, generate_random_genome};
pub use model::{
    BodyLink, BodyNode, CommunicationGenes, CompetitionGenes, CooperationGenes, FoodType, Genome,
    GenomeId, HgtGenes, Metabolism, Motor, ReceptorSet, Sensor, SensorKind, SensorTarget,
    SocialGenes, SymbiosisGenes, TransferType, ViralGenes, WasteType,
};
pub use mutation::{
    MutationKind, MutationLog, mutate_genome, remove_link, remove_motor, remove_node, remove_sensor,
};
pub use plasmid::{GeneValue, Plasmid, PlasmidGene, PlasmidId, PlasmidKind, PlasmidOrigin, conjugate};
pub use traits::{GeneticTrait, TraitProfile, trait_value};
pub use validate::{GenomeError, ValidationReport, genome_complexity, validate_genome};
pub use virus::{VirusGenome, VirusId, crispr_prevalence};
