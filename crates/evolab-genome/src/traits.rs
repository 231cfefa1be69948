//! Normalized trait accessors used by fitness and epistasis.
//!
//! Every accessor maps a genome onto `[0, 1]`. Traits that depend on body
//! parts the genome lacks (e.g. speed without motors) resolve to `None`.

use serde::{Deserialize, Serialize};

use crate::model::{FoodType, Genome, ranges};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GeneticTrait {
    Aggression,
    Cooperation,
    ResourceSharing,
    Efficiency,
    Carnivory,
    Decomposer,
    Speed,
    SensorAcuity,
    Territoriality,
    StorageCapacity,
    MetabolicRate,
    Resistance,
    DonorWillingness,
    RecipientOpenness,
    SignalEmission,
    Fleeing,
}

impl GeneticTrait {
    pub const ALL: [GeneticTrait; 16] = [
        GeneticTrait::Aggression,
        GeneticTrait::Cooperation,
        GeneticTrait::ResourceSharing,
        GeneticTrait::Efficiency,
        GeneticTrait::Carnivory,
        GeneticTrait::Decomposer,
        GeneticTrait::Speed,
        GeneticTrait::SensorAcuity,
        GeneticTrait::Territoriality,
        GeneticTrait::StorageCapacity,
        GeneticTrait::MetabolicRate,
        GeneticTrait::Resistance,
        GeneticTrait::DonorWillingness,
        GeneticTrait::RecipientOpenness,
        GeneticTrait::SignalEmission,
        GeneticTrait::Fleeing,
    ];

    const fn slot(self) -> usize {
        self as usize
    }
}

fn normalize(value: f32, lo: f32, hi: f32) -> f32 {
    if hi <= lo {
        return 0.0;
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

fn diet_weight(genome: &Genome, food: FoodType) -> f32 {
    if genome.metabolism.primary_food == food {
        1.0
    } else if genome.metabolism.secondary_food == Some(food) {
        0.5
    } else {
        0.0
    }
}

/// Resolve a single trait for `genome`.
#[must_use]
pub fn trait_value(genome: &Genome, which: GeneticTrait) -> Option<f32> {
    let social = &genome.social;
    let value = match which {
        GeneticTrait::Aggression => social.competition.aggression,
        GeneticTrait::Cooperation => social.cooperation.link_willingness,
        GeneticTrait::ResourceSharing => social.cooperation.resource_sharing,
        GeneticTrait::Efficiency => genome.metabolism.efficiency,
        GeneticTrait::Carnivory => diet_weight(genome, FoodType::Meat),
        GeneticTrait::Decomposer => diet_weight(genome, FoodType::Detritus),
        GeneticTrait::Speed => {
            if genome.motors.is_empty() {
                return None;
            }
            let drive: f32 = genome
                .motors
                .iter()
                .map(|motor| motor.amplitude * motor.cycle_speed)
                .sum::<f32>()
                / genome.motors.len() as f32;
            let max_drive = ranges::AMPLITUDE.end() * ranges::CYCLE_SPEED.end();
            normalize(drive, 0.0, max_drive)
        }
        GeneticTrait::SensorAcuity => {
            if genome.sensors.is_empty() {
                return None;
            }
            genome
                .sensors
                .iter()
                .map(|sensor| sensor.sensitivity)
                .sum::<f32>()
                / genome.sensors.len() as f32
        }
        GeneticTrait::Territoriality => normalize(
            social.competition.territorial_radius,
            0.0,
            *ranges::TERRITORIAL_RADIUS.end(),
        ),
        GeneticTrait::StorageCapacity => normalize(
            genome.metabolism.storage_capacity,
            *ranges::STORAGE.start(),
            *ranges::STORAGE.end(),
        ),
        GeneticTrait::MetabolicRate => normalize(
            genome.metabolism.base_rate,
            *ranges::METABOLIC_RATE.start(),
            *ranges::METABOLIC_RATE.end(),
        ),
        GeneticTrait::Resistance => genome.viral.resistance,
        GeneticTrait::DonorWillingness => genome.hgt.donor_willingness,
        GeneticTrait::RecipientOpenness => genome.hgt.recipient_openness,
        GeneticTrait::SignalEmission => social.communication.signal_emission,
        GeneticTrait::Fleeing => social.competition.flee_threshold,
    };
    Some(value.clamp(0.0, 1.0))
}

/// Resolved trait vector with optional overrides for landscape probing.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitProfile {
    values: [Option<f32>; GeneticTrait::ALL.len()],
}

impl TraitProfile {
    #[must_use]
    pub fn from_genome(genome: &Genome) -> Self {
        let mut values = [None; GeneticTrait::ALL.len()];
        for which in GeneticTrait::ALL {
            values[which.slot()] = trait_value(genome, which);
        }
        Self { values }
    }

    #[must_use]
    pub fn get(&self, which: GeneticTrait) -> Option<f32> {
        self.values[which.slot()]
    }

    pub fn set(&mut self, which: GeneticTrait, value: f32) {
        self.values[which.slot()] = Some(value.clamp(0.0, 1.0));
    }

    /// Copy of the profile with one trait overridden.
    #[must_use]
    pub fn with(&self, which: GeneticTrait, value: f32) -> Self {
        let mut copy = self.clone();
        copy.set(which, value);
        copy
    }
}
