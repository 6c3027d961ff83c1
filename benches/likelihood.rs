use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use phylodag::birthdeath::{BirthDeathProcess, Rate};
use phylodag::coalescent::{MultispeciesCoalescent, PopulationSize};
use phylodag::dag::affected_ln_probability_ratio;
use phylodag::distributions::Exponential;
use phylodag::rng::seeded_source;
use phylodag::{ConstantNode, DagNode, Distribution, StochasticNode, Taxon, Tree, TypedDagNode};

fn taxa(n: usize) -> Vec<Taxon> {
    (0..n).map(|i| Taxon::new(format!("t{i}"))).collect()
}

fn episodic_process(n: usize) -> BirthDeathProcess {
    BirthDeathProcess::builder()
        .speciation(Rate::episodic(
            ConstantNode::new("lambda", vec![1.0, 0.6, 1.4]),
            ConstantNode::new("lambda times", vec![2.0, 5.0]),
        ))
        .extinction(Rate::constant(ConstantNode::new("mu", 0.2)))
        .root_age(ConstantNode::new("root", 8.0))
        .taxa(taxa(n))
        .build()
        .unwrap()
}

fn bench_birth_death_density(c: &mut Criterion) {
    let mut group = c.benchmark_group("birth_death_density");
    for n in [16usize, 128] {
        let process = episodic_process(n);
        let tree = process.redraw_value(&mut seeded_source(1)).unwrap();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("episodic_{n}_taxa"), |b| {
            b.iter(|| process.compute_ln_probability(black_box(&tree)));
        });
    }
    group.finish();
}

fn bench_multispecies_density(c: &mut Criterion) {
    let species_process = episodic_process(8);
    let species: Tree = species_process.redraw_value(&mut seeded_source(2)).unwrap();
    let genes: Vec<Taxon> = (0..8)
        .flat_map(|s| (0..4).map(move |g| Taxon::new(format!("g{s}_{g}")).with_species(format!("t{s}"))))
        .collect();
    let species_node: TypedDagNode<Tree> = ConstantNode::new("species", species);
    let msc = MultispeciesCoalescent::new(
        species_node,
        PopulationSize::shared(ConstantNode::new("ne", 1.5)),
        genes,
    )
    .unwrap();
    let gene_tree = msc.redraw_value(&mut seeded_source(3)).unwrap();

    let mut group = c.benchmark_group("multispecies_density");
    group.throughput(Throughput::Elements(32));
    group.bench_function("8_species_32_genes", |b| {
        b.iter(|| msc.compute_ln_probability(black_box(&gene_tree)));
    });
    group.finish();
}

fn bench_proposal_round_trip(c: &mut Criterion) {
    let lambda = StochasticNode::<f64>::with_value(
        "lambda",
        Box::new(Exponential::new(ConstantNode::new("rate", 1.0))),
        1.0,
    );
    let process = BirthDeathProcess::builder()
        .speciation(Rate::constant(lambda.clone()))
        .extinction(Rate::constant(ConstantNode::new("mu", 0.2)))
        .root_age(ConstantNode::new("root", 8.0))
        .taxa(taxa(64))
        .build()
        .unwrap();
    let value = process.redraw_value(&mut seeded_source(4)).unwrap();
    let tree = StochasticNode::observed("tree", Box::new(process), value);
    let _ = tree.ln_probability();

    c.bench_function("proposal/touch_ratio_restore", |b| {
        b.iter(|| {
            lambda.set_value(1.1).unwrap();
            let ratio = affected_ln_probability_ratio(lambda.as_ref());
            lambda.restore().unwrap();
            black_box(ratio)
        });
    });
}

criterion_group!(
    benches,
    bench_birth_death_density,
    bench_multispecies_density,
    bench_proposal_round_trip
);
criterion_main!(benches);
