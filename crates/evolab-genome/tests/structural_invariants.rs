use evolab_core::{EvolabConfig, SpeciesMarker};
use evolab_genome::{
    BodyLink, Genome, RandomBodyOptions, clone_genome, crossover, generate_random_genome,
    genetic_distance, inherit_crispr, mutate_genome, remove_node, validate_genome,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn assert_structure(genome: &Genome, step: usize) {
    for (index, node) in genome.nodes.iter().enumerate() {
        assert_eq!(node.id, index, "node id drifted at step {step}");
    }
    for (index, link) in genome.links.iter().enumerate() {
        assert_eq!(link.id, index, "link id drifted at step {step}");
        assert!(link.node_a < genome.nodes.len(), "dangling node_a at step {step}");
        assert!(link.node_b < genome.nodes.len(), "dangling node_b at step {step}");
    }
    for (index, motor) in genome.motors.iter().enumerate() {
        assert_eq!(motor.id, index, "motor id drifted at step {step}");
        assert!(motor.attached_to < genome.links.len(), "dangling motor at step {step}");
        if let Some(sensor) = motor.sensor_modulation {
            assert!(sensor < genome.sensors.len(), "dangling modulation at step {step}");
        }
    }
    for (index, sensor) in genome.sensors.iter().enumerate() {
        assert_eq!(sensor.id, index, "sensor id drifted at step {step}");
    }
}

fn aggressive_config() -> EvolabConfig {
    let mut config = EvolabConfig::default();
    config.mutation.point_rate = 1.0;
    config.mutation.add_node = 0.4;
    config.mutation.remove_node = 0.4;
    config.mutation.add_link = 0.4;
    config.mutation.remove_link = 0.4;
    config.mutation.add_motor = 0.4;
    config.mutation.remove_motor = 0.4;
    config.mutation.add_sensor = 0.4;
    config.mutation.remove_sensor = 0.4;
    config.mutation.social = 1.0;
    config
}

#[test]
fn repeated_mutation_preserves_index_invariants() {
    let config = aggressive_config();
    let mut rng = SmallRng::seed_from_u64(0xDEC0DE);
    let mut genome = generate_random_genome(RandomBodyOptions::default(), &config, &mut rng);
    assert_structure(&genome, 0);
    for step in 1..=2_000 {
        mutate_genome(&mut genome, &config, &mut rng);
        assert_structure(&genome, step);
        assert!(genome.nodes.len() >= config.genome.min_nodes);
        assert!(genome.nodes.len() <= config.genome.max_nodes);
        assert!(genome.links.len() <= config.genome.max_links);
        assert!(genome.motors.len() <= config.genome.max_motors);
        assert!(genome.sensors.len() <= config.genome.max_sensors);
        let report = validate_genome(&genome, &config.genome);
        assert!(report.valid, "step {step}: {:?}", report.errors);
    }
    assert_eq!(genome.generation, 2_000);
}

#[test]
fn mutation_and_crossover_interleaved() {
    let config = aggressive_config();
    let mut rng = SmallRng::seed_from_u64(77);
    let mut pool: Vec<Genome> = (0..8)
        .map(|_| generate_random_genome(RandomBodyOptions::default(), &config, &mut rng))
        .collect();
    for step in 0..1_000 {
        let a = step % pool.len();
        let b = (step * 3 + 1) % pool.len();
        let mut child = crossover(&pool[a], &pool[b], &config, &mut rng);
        assert_structure(&child, step);
        assert!(child.motors.len() <= pool[a].motors.len() + pool[b].motors.len());
        assert!(child.sensors.len() <= 5);
        mutate_genome(&mut child, &config, &mut rng);
        assert_structure(&child, step);
        pool[a] = child;
    }
}

#[test]
fn distance_is_symmetric_over_random_pairs() {
    let config = EvolabConfig::default();
    let mut rng = SmallRng::seed_from_u64(5);
    let genomes: Vec<Genome> = (0..20)
        .map(|_| generate_random_genome(RandomBodyOptions::default(), &config, &mut rng))
        .collect();
    for a in &genomes {
        assert_eq!(genetic_distance(a, a), 0.0);
        for b in &genomes {
            assert_eq!(genetic_distance(a, b), genetic_distance(b, a));
        }
    }
}

#[test]
fn mutating_a_clone_leaves_the_original_untouched() {
    let config = aggressive_config();
    let mut rng = SmallRng::seed_from_u64(12);
    let mut original = generate_random_genome(RandomBodyOptions::default(), &config, &mut rng);
    original.viral.crispr_memory = vec![1, 2, 3];
    original.hgt.restriction_markers = vec![9];
    original.social.symbiosis.accepted_markers = vec![SpeciesMarker(2)];
    let snapshot = serde_json::to_string(&original).expect("serialize");

    let mut copy = clone_genome(&original);
    for _ in 0..50 {
        mutate_genome(&mut copy, &config, &mut rng);
    }
    for node in &mut copy.nodes {
        node.mass += 1.0;
    }
    copy.viral.crispr_memory.clear();
    copy.viral.receptors.push(11);
    copy.hgt.restriction_markers.push(10);
    copy.social.symbiosis.accepted_markers.clear();
    copy.metabolism.efficiency = 0.0;

    assert_eq!(serde_json::to_string(&original).expect("serialize"), snapshot);
}

#[test]
fn crispr_inheritance_never_exceeds_slots() {
    let config = EvolabConfig::default();
    let mut rng = SmallRng::seed_from_u64(3);
    for size in 0..30u32 {
        let a: Vec<u32> = (0..size).collect();
        let b: Vec<u32> = (size / 2..size * 2).collect();
        let merged = inherit_crispr(&a, &b, &config.viral, &mut rng);
        assert!(merged.len() <= config.viral.crispr_memory_slots);
    }
}

#[test]
fn node_removal_scenario() {
    let config = EvolabConfig::default();
    let mut rng = SmallRng::seed_from_u64(1);
    let mut genome = generate_random_genome(
        RandomBodyOptions {
            node_count: Some(5),
            species_marker: None,
        },
        &config,
        &mut rng,
    );
    genome.motors.clear();
    genome.links = [(0, 1), (3, 4), (0, 4), (1, 3)]
        .iter()
        .enumerate()
        .map(|(id, (a, b))| BodyLink {
            id,
            node_a: *a,
            node_b: *b,
            rest_length: 5.0,
            stiffness: 0.5,
            damping: 0.1,
        })
        .collect();

    assert!(remove_node(&mut genome, 2));
    let ids: Vec<usize> = genome.nodes.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    let pairs: Vec<(usize, usize)> = genome.links.iter().map(|l| (l.node_a, l.node_b)).collect();
    assert_eq!(pairs, vec![(0, 1), (2, 3), (0, 3), (1, 2)]);
}
