//! Gene-gene interaction rules layered on top of additive fitness.

use serde::{Deserialize, Serialize};

use crate::model::Genome;
use crate::traits::{GeneticTrait, TraitProfile};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Both high is rewarded, both low mildly penalized.
    Synergistic,
    /// Having both is penalized; specializing in one is rewarded.
    Antagonistic,
    /// The two traits draw on a shared allocation budget.
    Diminishing,
    /// `trait_a` needs `trait_b` as a prerequisite.
    Threshold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpistaticRule {
    pub trait_a: GeneticTrait,
    pub trait_b: GeneticTrait,
    pub kind: InteractionKind,
    pub strength: f32,
}

const fn rule(
    trait_a: GeneticTrait,
    trait_b: GeneticTrait,
    kind: InteractionKind,
    strength: f32,
) -> EpistaticRule {
    EpistaticRule {
        trait_a,
        trait_b,
        kind,
        strength,
    }
}

pub const EPISTATIC_RULES: [EpistaticRule; 10] = [
    rule(GeneticTrait::Aggression, GeneticTrait::Carnivory, InteractionKind::Synergistic, 0.3),
    rule(GeneticTrait::Cooperation, GeneticTrait::ResourceSharing, InteractionKind::Synergistic, 0.25),
    rule(GeneticTrait::Speed, GeneticTrait::SensorAcuity, InteractionKind::Synergistic, 0.2),
    rule(GeneticTrait::Aggression, GeneticTrait::Cooperation, InteractionKind::Antagonistic, 0.3),
    rule(GeneticTrait::Carnivory, GeneticTrait::Decomposer, InteractionKind::Antagonistic, 0.2),
    rule(GeneticTrait::Resistance, GeneticTrait::RecipientOpenness, InteractionKind::Antagonistic, 0.15),
    rule(GeneticTrait::Speed, GeneticTrait::Efficiency, InteractionKind::Diminishing, 0.25),
    rule(GeneticTrait::StorageCapacity, GeneticTrait::MetabolicRate, InteractionKind::Diminishing, 0.2),
    rule(GeneticTrait::Territoriality, GeneticTrait::Aggression, InteractionKind::Threshold, 0.25),
    rule(GeneticTrait::SignalEmission, GeneticTrait::Cooperation, InteractionKind::Threshold, 0.2),
];

const HIGH: f32 = 0.6;
const LOW: f32 = 0.3;
const BUDGET: f32 = 1.2;
const PREREQUISITE: f32 = 0.3;
const ENABLED: f32 = 0.5;

/// Fitness contribution of one rule given the two resolved trait values.
#[must_use]
pub fn rule_contribution(kind: InteractionKind, strength: f32, a: f32, b: f32) -> f32 {
    match kind {
        InteractionKind::Synergistic => (a * b - 0.25) * strength,
        InteractionKind::Antagonistic => {
            let specialist = (a > HIGH && b < LOW) || (b > HIGH && a < LOW);
            let bonus = if specialist { 0.3 * strength } else { 0.0 };
            -(a * b) * strength + bonus
        }
        InteractionKind::Diminishing => {
            let total = a + b;
            if total > BUDGET {
                -(total - BUDGET) * strength
            } else {
                0.0
            }
        }
        InteractionKind::Threshold => {
            if a > PREREQUISITE && b < PREREQUISITE {
                -a * strength
            } else if a > PREREQUISITE && b > ENABLED {
                a * b * strength
            } else {
                0.0
            }
        }
    }
}

/// Sum of all rule contributions for a resolved profile. Rules whose traits
/// resolve to `None` are skipped.
#[must_use]
pub fn profile_fitness(profile: &TraitProfile) -> f32 {
    EPISTATIC_RULES
        .iter()
        .filter_map(|rule| {
            let a = profile.get(rule.trait_a)?;
            let b = profile.get(rule.trait_b)?;
            Some(rule_contribution(rule.kind, rule.strength, a, b))
        })
        .sum()
}

/// Additive epistatic fitness modifier for `genome`.
#[must_use]
pub fn calculate_epistatic_fitness(genome: &Genome) -> f32 {
    profile_fitness(&TraitProfile::from_genome(genome))
}

/// Multiplicative form of [`calculate_epistatic_fitness`], floored at 0.1.
#[must_use]
pub fn epistatic_multiplier(genome: &Genome) -> f32 {
    (1.0 + calculate_epistatic_fitness(genome)).max(0.1)
}

/// Whether the fitness effect of raising `trait_a` flips sign depending on
/// the background value of `trait_b`.
#[must_use]
pub fn has_sign_epistasis(genome: &Genome, trait_a: GeneticTrait, trait_b: GeneticTrait) -> bool {
    let base = TraitProfile::from_genome(genome);
    let effect = |background: f32| {
        let context = base.with(trait_b, background);
        profile_fitness(&context.with(trait_a, 0.8)) - profile_fitness(&context.with(trait_a, 0.2))
    };
    let low = effect(0.1);
    let high = effect(0.9);
    const EPS: f32 = 1e-6;
    (low > EPS && high < -EPS) || (low < -EPS && high > EPS)
}

/// Traits probed when estimating landscape curvature.
pub const CURVATURE_SAMPLE: [GeneticTrait; 6] = [
    GeneticTrait::Aggression,
    GeneticTrait::Cooperation,
    GeneticTrait::Efficiency,
    GeneticTrait::Carnivory,
    GeneticTrait::ResourceSharing,
    GeneticTrait::Territoriality,
];

const CURVATURE_STEP: f32 = 0.05;

/// Mean absolute second derivative of epistatic fitness along the sampled
/// traits. Zero means locally additive; larger values mean a more rugged
/// landscape around this genome.
#[must_use]
pub fn fitness_landscape_curvature(genome: &Genome) -> f32 {
    let base = TraitProfile::from_genome(genome);
    let h = CURVATURE_STEP;
    let mut total = 0.0;
    let mut probed = 0usize;
    for which in CURVATURE_SAMPLE {
        let Some(value) = base.get(which) else {
            continue;
        };
        let x = value.clamp(h, 1.0 - h);
        let centre = profile_fitness(&base.with(which, x));
        let up = profile_fitness(&base.with(which, x + h));
        let down = profile_fitness(&base.with(which, x - h));
        total += ((up - 2.0 * centre + down) / (h * h)).abs();
        probed += 1;
    }
    if probed == 0 {
        0.0
    } else {
        total / probed as f32
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FitnessPeak {
    ApexPredator,
    Cooperative,
    Decomposer,
    Herbivore,
    Generalist,
}

impl FitnessPeak {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            FitnessPeak::ApexPredator => "apex_predator",
            FitnessPeak::Cooperative => "cooperative",
            FitnessPeak::Decomposer => "decomposer",
            FitnessPeak::Herbivore => "herbivore",
            FitnessPeak::Generalist => "generalist",
        }
    }
}

/// Classify which adaptive peak `genome` sits closest to.
#[must_use]
pub fn identify_fitness_peak(genome: &Genome) -> FitnessPeak {
    let profile = TraitProfile::from_genome(genome);
    let get = |which| profile.get(which).unwrap_or(0.0);
    let carnivory = get(GeneticTrait::Carnivory);
    let aggression = get(GeneticTrait::Aggression);
    let cooperation = get(GeneticTrait::Cooperation);
    let sharing = get(GeneticTrait::ResourceSharing);
    let decomposer = get(GeneticTrait::Decomposer);

    if carnivory > 0.5 && aggression > 0.6 {
        FitnessPeak::ApexPredator
    } else if cooperation > 0.6 && sharing > 0.5 {
        FitnessPeak::Cooperative
    } else if decomposer > 0.5 {
        FitnessPeak::Decomposer
    } else if carnivory < 0.3 && aggression < 0.4 {
        FitnessPeak::Herbivore
    } else {
        FitnessPeak::Generalist
    }
}
