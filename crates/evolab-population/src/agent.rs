//! Live organisms and their dense storage.

use evolab_core::{AgentId, Position, SimulationSettings, SpeciesMarker};
use evolab_genome::Genome;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::HashSet;

/// A living organism: its genome plus the per-individual state that
/// population genetics reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub genome: Genome,
    pub energy: f32,
    pub max_energy: f32,
    pub fitness: f32,
    pub age: u32,
    pub maturity_age: u32,
    /// Lethal equivalents carried by this individual.
    pub genetic_load: f32,
    pub position: Position,
    pub alive: bool,
}

impl Agent {
    /// Newborn agent with starting energy from `settings`.
    #[must_use]
    pub fn new(genome: Genome, settings: &SimulationSettings, position: Position) -> Self {
        Self {
            genome,
            energy: settings.initial_energy,
            max_energy: settings.max_energy,
            fitness: 1.0,
            age: 0,
            maturity_age: settings.maturity_age,
            genetic_load: 0.0,
            position,
            alive: true,
        }
    }

    #[must_use]
    pub fn species_marker(&self) -> SpeciesMarker {
        self.genome.species_marker
    }

    #[must_use]
    pub fn is_mature(&self) -> bool {
        self.age >= self.maturity_age
    }

    /// Energy as a fraction of capacity, in `[0, 1]`.
    #[must_use]
    pub fn energy_ratio(&self) -> f32 {
        if self.max_energy <= 0.0 {
            return 0.0;
        }
        (self.energy / self.max_energy).clamp(0.0, 1.0)
    }

    /// Expected offspring proxy used for effective population size:
    /// energy ratio, zero before maturity, scaled to a mean of two.
    #[must_use]
    pub fn reproductive_potential(&self) -> f32 {
        if self.is_mature() {
            self.energy_ratio() * 2.0
        } else {
            0.0
        }
    }
}

/// Dense agent storage with generational handles.
///
/// Agents live contiguously so every population pass can borrow them as a
/// plain slice; handles stay valid across removals of other agents.
#[derive(Debug, Default)]
pub struct AgentArena {
    slots: SlotMap<AgentId, usize>,
    handles: Vec<AgentId>,
    agents: Vec<Agent>,
}

impl AgentArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            handles: Vec::with_capacity(capacity),
            agents: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agents in dense order.
    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    /// Handles in the same order as [`Self::agents`].
    pub fn iter_handles(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.handles.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Agent)> + '_ {
        self.handles.iter().copied().zip(self.agents.iter())
    }

    #[must_use]
    pub fn index_of(&self, id: AgentId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.slots.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(self.index_of(id)?)
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        let index = self.index_of(id)?;
        self.agents.get_mut(index)
    }

    pub fn insert(&mut self, agent: Agent) -> AgentId {
        let index = self.agents.len();
        self.agents.push(agent);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    /// Remove `id`, moving the last agent into its slot.
    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        let index = self.slots.remove(id)?;
        let removed = self.agents.swap_remove(index);
        let removed_handle = self.handles.swap_remove(index);
        debug_assert_eq!(removed_handle, id);
        if index < self.handles.len() {
            let moved = self.handles[index];
            if let Some(slot) = self.slots.get_mut(moved) {
                *slot = index;
            }
        }
        Some(removed)
    }

    /// Remove every agent in `dead`, preserving the order of survivors.
    pub fn remove_many(&mut self, dead: &HashSet<AgentId>) -> usize {
        if dead.is_empty() {
            return 0;
        }
        let before = self.agents.len();
        let mut write = 0;
        for read in 0..self.handles.len() {
            let id = self.handles[read];
            if dead.contains(&id) {
                self.slots.remove(id);
                continue;
            }
            if write != read {
                self.handles.swap(write, read);
                self.agents.swap(write, read);
            }
            if let Some(slot) = self.slots.get_mut(id) {
                *slot = write;
            }
            write += 1;
        }
        self.handles.truncate(write);
        self.agents.truncate(write);
        before - write
    }

    /// Handles of agents flagged as no longer alive.
    #[must_use]
    pub fn dead(&self) -> HashSet<AgentId> {
        self.iter()
            .filter(|(_, agent)| !agent.alive)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.handles.clear();
        self.agents.clear();
    }
}
