//! Beneficial mutations competing within a species.

use evolab_core::{RandomSource, SpeciesMarker, Tick};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PopGenRecord, PopulationGenetics};

const FIXED_AT: f32 = 0.99;
const LOST_AT: f32 = 0.01;
/// Active mutations at which interference saturates.
const INTERFERENCE_SATURATION: f32 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Active,
    Fixed,
    Lost,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeneficialMutation {
    /// Lineage of the genome the mutation arose in.
    pub lineage_id: u64,
    pub selection_coefficient: f32,
    pub frequency: f32,
    pub origin_tick: Tick,
    pub status: MutationStatus,
    pub resolved_tick: Option<Tick>,
}

impl BeneficialMutation {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == MutationStatus::Active
    }
}

fn interference_for(active: usize) -> f32 {
    (active as f32 / INTERFERENCE_SATURATION).min(1.0)
}

/// Diversity and Ne loss from a sweep of strength `min(1, 5s)`.
fn apply_sweep(record: &mut PopGenRecord, selection_coefficient: f32) {
    let strength = (selection_coefficient * 5.0).clamp(0.0, 1.0);
    record.genetic_diversity *= 1.0 - 0.5 * strength;
    record.effective_size = (record.effective_size * (1.0 - 0.3 * strength)).max(1.0);
}

impl PopulationGenetics {
    /// Start tracking a beneficial mutation in `marker`. It enters at a
    /// frequency of one carrier in the current census.
    pub fn record_beneficial_mutation(
        &mut self,
        marker: SpeciesMarker,
        lineage_id: u64,
        selection_coefficient: f32,
        tick: Tick,
    ) {
        let census = self
            .records
            .entry(marker)
            .or_insert_with(|| PopGenRecord::new(marker, tick))
            .census_size
            .max(1);
        let mutation = BeneficialMutation {
            lineage_id,
            selection_coefficient,
            frequency: (1.0 / census as f32).clamp(0.02, 0.5),
            origin_tick: tick,
            status: MutationStatus::Active,
            resolved_tick: None,
        };
        debug!(%marker, lineage_id, s = selection_coefficient, "beneficial mutation recorded");
        self.mutations.entry(marker).or_default().push(mutation);
    }

    /// Advance every active mutation by `dt` ticks of selection and drift,
    /// resolving those that fix or are lost.
    pub fn update_beneficial_mutations(&mut self, dt: f32, tick: Tick, rng: &mut dyn RngCore) {
        let generations = self.generations(dt);
        let retention = self.settings.sweep_retention;

        for (marker, mutations) in &mut self.mutations {
            let Some(record) = self.records.get_mut(marker) else {
                continue;
            };
            let interference =
                interference_for(mutations.iter().filter(|m| m.is_active()).count());

            for mutation in mutations.iter_mut().filter(|m| m.is_active()) {
                let p = mutation.frequency;
                let ne = record.effective_size.max(1.0);
                let s_eff = mutation.selection_coefficient * (1.0 - interference * 0.5);
                let selection = s_eff * p * (1.0 - p) * generations;
                let drift = rng.gaussian()
                    * (p * (1.0 - p) / (2.0 * ne)).sqrt()
                    * generations.sqrt();
                mutation.frequency = (p + selection + drift).clamp(0.0, 1.0);

                if mutation.frequency >= FIXED_AT {
                    mutation.status = MutationStatus::Fixed;
                    mutation.resolved_tick = Some(tick);
                    apply_sweep(record, mutation.selection_coefficient);
                    info!(
                        %marker,
                        lineage_id = mutation.lineage_id,
                        s = mutation.selection_coefficient,
                        diversity = record.genetic_diversity,
                        tick = tick.0,
                        "selective sweep"
                    );
                } else if mutation.frequency <= LOST_AT {
                    mutation.status = MutationStatus::Lost;
                    mutation.resolved_tick = Some(tick);
                    debug!(%marker, lineage_id = mutation.lineage_id, tick = tick.0, "beneficial mutation lost");
                }
            }

            mutations.retain(|m| {
                m.resolved_tick
                    .is_none_or(|resolved| tick.since(resolved) <= retention)
            });
        }
        self.mutations.retain(|_, mutations| !mutations.is_empty());
    }

    /// Tracked mutations for `marker`, resolved ones included until pruned.
    #[must_use]
    pub fn beneficial_mutations(&self, marker: SpeciesMarker) -> &[BeneficialMutation] {
        self.mutations.get(&marker).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn active_mutations(&self, marker: SpeciesMarker) -> usize {
        self.beneficial_mutations(marker)
            .iter()
            .filter(|m| m.is_active())
            .count()
    }

    /// `min(1, active / 5)` for `marker`.
    #[must_use]
    pub fn clonal_interference(&self, marker: SpeciesMarker) -> f32 {
        interference_for(self.active_mutations(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolab_core::PopGenSettings;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn interference_saturates_at_five() {
        let mut popgen = PopulationGenetics::new(PopGenSettings::default());
        let marker = SpeciesMarker(3);
        for lineage in 0..7 {
            popgen.record_beneficial_mutation(marker, lineage, 0.05, Tick(0));
            let expected = ((lineage + 1) as f32 / 5.0).min(1.0);
            assert!((popgen.clonal_interference(marker) - expected).abs() < 1e-6);
        }
        assert_eq!(popgen.clonal_interference(SpeciesMarker(4)), 0.0);
    }

    #[test]
    fn sweep_scales_diversity_and_ne_with_strength() {
        let mut record = PopGenRecord::new(SpeciesMarker(1), Tick(0));
        record.genetic_diversity = 0.8;
        record.effective_size = 100.0;
        apply_sweep(&mut record, 0.2);
        assert!((record.genetic_diversity - 0.4).abs() < 1e-6);
        assert!((record.effective_size - 70.0).abs() < 1e-4);

        record.genetic_diversity = 0.8;
        record.effective_size = 100.0;
        apply_sweep(&mut record, 0.02);
        let strength = (0.02_f32 * 5.0).min(1.0);
        assert!((record.genetic_diversity - 0.8 * (1.0 - 0.5 * strength)).abs() < 1e-6);
        assert!((record.effective_size - 100.0 * (1.0 - 0.3 * strength)).abs() < 1e-4);

        record.effective_size = 1.2;
        apply_sweep(&mut record, 1.0);
        assert_eq!(record.effective_size, 1.0);
    }

    #[test]
    fn resolved_mutations_are_pruned_after_retention() {
        let settings = PopGenSettings {
            sweep_retention: 50,
            ..PopGenSettings::default()
        };
        let mut popgen = PopulationGenetics::new(settings);
        let marker = SpeciesMarker(2);
        popgen.record_founding_event(marker, 200, Tick(0));
        popgen.record_beneficial_mutation(marker, 1, 0.1, Tick(0));
        popgen
            .mutations
            .get_mut(&marker)
            .expect("tracked")[0]
            .frequency = 0.001;
        let mut rng = SmallRng::seed_from_u64(8);
        popgen.update_beneficial_mutations(0.0, Tick(10), &mut rng);
        let lost = &popgen.beneficial_mutations(marker)[0];
        assert_eq!(lost.status, MutationStatus::Lost);
        assert_eq!(lost.resolved_tick, Some(Tick(10)));
        assert_eq!(popgen.active_mutations(marker), 0);

        popgen.update_beneficial_mutations(0.0, Tick(60), &mut rng);
        assert_eq!(popgen.beneficial_mutations(marker).len(), 1);
        popgen.update_beneficial_mutations(0.0, Tick(61), &mut rng);
        assert!(popgen.beneficial_mutations(marker).is_empty());
    }

    #[test]
    fn initial_frequency_follows_census() {
        let mut popgen = PopulationGenetics::new(PopGenSettings::default());
        popgen.record_founding_event(SpeciesMarker(1), 4, Tick(0));
        popgen.record_beneficial_mutation(SpeciesMarker(1), 9, 0.1, Tick(0));
        assert!((popgen.beneficial_mutations(SpeciesMarker(1))[0].frequency - 0.25).abs() < 1e-6);
        popgen.record_founding_event(SpeciesMarker(2), 1000, Tick(0));
        popgen.record_beneficial_mutation(SpeciesMarker(2), 9, 0.1, Tick(0));
        assert!((popgen.beneficial_mutations(SpeciesMarker(2))[0].frequency - 0.02).abs() < 1e-6);
    }
}
