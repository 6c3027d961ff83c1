//! Birth-death processes on time trees.
//!
//! [`BirthDeathProcess`] covers constant-rate, episodic and mass-extinction
//! processes that sample extant taxa at the present; they differ only in the
//! [`Rate`]s and [`MassExtinctions`] they are built from. The serially
//! sampled variant lives in [`fossilized`].
//!
//! Densities are those of the reconstructed tree: with `T` the start age,
//! an origin start contributes `ln P1(T)`, a root start `2 ln P1(T)`, and each
//! other speciation at age `a` contributes `ln lambda(a) + ln P1(a)`.

pub mod fossilized;
mod numerics;
mod rates;
mod simulate;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clade::Clade;
use crate::config::TreeSimulationConfig;
use crate::dag::{ensure_swapped, erase, swap_slot, ConstantNode, DagNodeRef, NodeId, ParameterHandle, TypedDagNode, TypedNode};
use crate::distribution::Distribution;
use crate::error::{GraphError, ModelError};
use crate::math::ln_choose;
use crate::rng::RandomSource;
use crate::taxon::Taxon;
use crate::tree::simulate::merge_at_ages;
use crate::tree::Tree;

pub use numerics::{ProcessRates, Survival};
pub use rates::{MassExtinction, MassExtinctions, PiecewiseRate, Rate};

use simulate::NodeAgeSampler;

/// Relative tolerance when comparing a tree's root age with the root-age
/// parameter, and absolute tolerance for tips at the present.
pub(crate) const AGE_TOLERANCE: f64 = 1e-6;

/// What the tree density is conditioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Condition {
    /// The process runs for the start age; nothing else is assumed.
    #[serde(rename = "time")]
    Time,
    /// The starting lineage(s) leave at least one sampled descendant.
    #[default]
    #[serde(rename = "survival")]
    Survival,
    /// The process produces the observed number of sampled taxa.
    #[serde(rename = "nTaxa")]
    NumTaxa,
}

impl FromStr for Condition {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(Self::Time),
            "survival" => Ok(Self::Survival),
            "nTaxa" => Ok(Self::NumTaxa),
            other => Err(ModelError::UnknownOption {
                kind: "condition",
                value: other.to_string(),
                expected: "time, survival, nTaxa",
            }),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Time => "time",
            Self::Survival => "survival",
            Self::NumTaxa => "nTaxa",
        })
    }
}

/// How the extant taxa in the tree were chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    /// Each extant species is sampled independently with probability rho.
    #[default]
    Uniform,
    /// The sample maximises diversity: all lineages older than the youngest
    /// sampled speciation are represented.
    Diversified,
}

impl FromStr for SamplingStrategy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(Self::Uniform),
            "diversified" => Ok(Self::Diversified),
            other => Err(ModelError::UnknownOption {
                kind: "sampling strategy",
                value: other.to_string(),
                expected: "uniform, diversified",
            }),
        }
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uniform => "uniform",
            Self::Diversified => "diversified",
        })
    }
}

/// Where the process starts.
#[derive(Debug, Clone)]
pub enum ProcessStart {
    /// A single lineage at the origin, older than the root.
    Origin(TypedDagNode<f64>),
    /// Two lineages at the root.
    Root(TypedDagNode<f64>),
}

impl ProcessStart {
    /// Resolves the two optional start ages.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::StartAgeAmbiguous` unless exactly one is given.
    pub fn from_options(
        origin: Option<TypedDagNode<f64>>,
        root_age: Option<TypedDagNode<f64>>,
    ) -> Result<Self, ModelError> {
        match (origin, root_age) {
            (Some(origin), None) => Ok(Self::Origin(origin)),
            (None, Some(root)) => Ok(Self::Root(root)),
            _ => Err(ModelError::StartAgeAmbiguous),
        }
    }

    #[must_use]
    pub fn age(&self) -> f64 {
        match self {
            Self::Origin(node) | Self::Root(node) => *node.value(),
        }
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        matches!(self, Self::Root(_))
    }

    /// Number of lineages the process starts with.
    #[must_use]
    pub const fn lineages(&self) -> usize {
        match self {
            Self::Origin(_) => 1,
            Self::Root(_) => 2,
        }
    }

    fn node(&self) -> &TypedDagNode<f64> {
        match self {
            Self::Origin(node) | Self::Root(node) => node,
        }
    }

    fn node_mut(&mut self) -> &mut TypedDagNode<f64> {
        match self {
            Self::Origin(node) | Self::Root(node) => node,
        }
    }

    /// True when `tree` is compatible with the start age.
    fn admits(&self, tree: &Tree) -> bool {
        let start = self.age();
        if !(start.is_finite() && start > 0.0) {
            return false;
        }
        let root_age = tree.root_age();
        match self {
            Self::Origin(_) => root_age < start,
            Self::Root(_) => (root_age - start).abs() <= AGE_TOLERANCE * start.max(1.0),
        }
    }
}

/// Builder for [`BirthDeathProcess`].
///
/// # Example
/// ```rust,ignore
/// let process = BirthDeathBuilder::new()
///     .speciation(Rate::constant(lambda))
///     .extinction(Rate::constant(mu))
///     .sampling(rho)
///     .root_age(root)
///     .condition(Condition::Survival)
///     .taxa(taxa)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct BirthDeathBuilder {
    speciation: Option<Rate>,
    extinction: Option<Rate>,
    sampling: Option<TypedDagNode<f64>>,
    origin: Option<TypedDagNode<f64>>,
    root_age: Option<TypedDagNode<f64>>,
    mass_extinctions: Option<MassExtinctions>,
    condition: Condition,
    strategy: SamplingStrategy,
    taxa: Vec<Taxon>,
    constraints: Vec<Clade>,
    incomplete_clades: Vec<Clade>,
    simulation: TreeSimulationConfig,
}

impl BirthDeathBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Speciation rate (required).
    #[must_use]
    pub fn speciation(mut self, rate: Rate) -> Self {
        self.speciation = Some(rate);
        self
    }

    /// Extinction rate (required).
    #[must_use]
    pub fn extinction(mut self, rate: Rate) -> Self {
        self.extinction = Some(rate);
        self
    }

    /// Sampling fraction at the present (default: 1).
    #[must_use]
    pub fn sampling(mut self, rho: TypedDagNode<f64>) -> Self {
        self.sampling = Some(rho);
        self
    }

    /// Origin age; exclusive with [`root_age`](Self::root_age).
    #[must_use]
    pub fn origin(mut self, age: TypedDagNode<f64>) -> Self {
        self.origin = Some(age);
        self
    }

    /// Root age; exclusive with [`origin`](Self::origin).
    #[must_use]
    pub fn root_age(mut self, age: TypedDagNode<f64>) -> Self {
        self.root_age = Some(age);
        self
    }

    #[must_use]
    pub fn mass_extinctions(mut self, events: MassExtinctions) -> Self {
        self.mass_extinctions = Some(events);
        self
    }

    /// Conditioning (default: survival).
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Sampling strategy (default: uniform).
    #[must_use]
    pub fn sampling_strategy(mut self, strategy: SamplingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Extant taxa of simulated trees.
    #[must_use]
    pub fn taxa(mut self, taxa: Vec<Taxon>) -> Self {
        self.taxa = taxa;
        self
    }

    /// Clades that must be monophyletic.
    #[must_use]
    pub fn constraints(mut self, clades: Vec<Clade>) -> Self {
        self.constraints = clades;
        self
    }

    /// Clades with unsampled members, counted by [`Clade::num_missing`].
    #[must_use]
    pub fn incomplete_clades(mut self, clades: Vec<Clade>) -> Self {
        self.incomplete_clades = clades;
        self
    }

    #[must_use]
    pub fn simulation(mut self, config: TreeSimulationConfig) -> Self {
        self.simulation = config;
        self
    }

    /// Builds the process.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidParameter` for a missing rate or a fossil
    /// taxon, `ModelError::StartAgeAmbiguous` unless exactly one start age is
    /// given, the validation errors of the current rate and mass-extinction
    /// values, and `ModelError::InvalidConfig` for a bad simulation config.
    pub fn build(self) -> Result<BirthDeathProcess, ModelError> {
        let speciation = self.speciation.ok_or_else(|| missing("speciation"))?;
        let extinction = self.extinction.ok_or_else(|| missing("extinction"))?;
        let start = ProcessStart::from_options(self.origin, self.root_age)?;
        speciation.snapshot("speciation")?;
        extinction.snapshot("extinction")?;
        if let Some(events) = &self.mass_extinctions {
            events.snapshot()?;
        }
        if let Some(fossil) = self.taxa.iter().find(|t| !t.is_extant()) {
            return Err(ModelError::InvalidParameter {
                name: "taxa".to_string(),
                reason: format!(
                    "taxon '{}' has age {} but this process only samples extant taxa",
                    fossil.name(),
                    fossil.age()
                ),
            });
        }
        for clade in self.incomplete_clades.iter().filter(|c| c.num_missing() == 0) {
            log::warn!("incomplete clade {clade} lists no missing species and is ignored");
        }
        self.simulation.validate()?;
        let sampling: TypedDagNode<f64> = self.sampling.unwrap_or_else(|| ConstantNode::new("rho", 1.0));
        Ok(BirthDeathProcess {
            speciation,
            extinction,
            sampling,
            start,
            mass_extinctions: self.mass_extinctions,
            condition: self.condition,
            strategy: self.strategy,
            taxa: self.taxa,
            constraints: self.constraints,
            incomplete_clades: self.incomplete_clades,
            simulation: self.simulation,
        })
    }
}

fn missing(name: &str) -> ModelError {
    ModelError::InvalidParameter {
        name: name.to_string(),
        reason: "required".to_string(),
    }
}

/// A birth-death process sampling extant taxa.
#[derive(Debug, Clone)]
pub struct BirthDeathProcess {
    speciation: Rate,
    extinction: Rate,
    sampling: TypedDagNode<f64>,
    start: ProcessStart,
    mass_extinctions: Option<MassExtinctions>,
    condition: Condition,
    strategy: SamplingStrategy,
    taxa: Vec<Taxon>,
    constraints: Vec<Clade>,
    incomplete_clades: Vec<Clade>,
    simulation: TreeSimulationConfig,
}

impl BirthDeathProcess {
    #[must_use]
    pub fn builder() -> BirthDeathBuilder {
        BirthDeathBuilder::new()
    }

    #[must_use]
    pub const fn start(&self) -> &ProcessStart {
        &self.start
    }

    #[must_use]
    pub const fn condition(&self) -> Condition {
        self.condition
    }

    #[must_use]
    pub const fn sampling_strategy(&self) -> SamplingStrategy {
        self.strategy
    }

    #[must_use]
    pub fn taxa(&self) -> &[Taxon] {
        &self.taxa
    }

    /// Current numeric rates.
    ///
    /// # Errors
    ///
    /// Returns the validation error of the current parameter values.
    pub fn process_rates(&self) -> Result<ProcessRates, ModelError> {
        let mass_extinctions = match &self.mass_extinctions {
            Some(events) => events.snapshot()?,
            None => Vec::new(),
        };
        Ok(ProcessRates {
            speciation: self.speciation.snapshot("speciation")?,
            extinction: self.extinction.snapshot("extinction")?,
            mass_extinctions,
        })
    }

    fn rho(&self) -> Option<f64> {
        let rho = *self.sampling.value();
        (rho > 0.0 && rho <= 1.0).then_some(rho)
    }

    /// Sampling fraction entering `P1`: diversified sampling describes the
    /// complete process and accounts for the missing taxa separately.
    fn effective_rho(&self, rho: f64) -> f64 {
        match self.strategy {
            SamplingStrategy::Uniform => rho,
            SamplingStrategy::Diversified => 1.0,
        }
    }

    /// Number of species in the complete process under diversified sampling.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    fn complete_num_taxa(n: usize, rho: f64) -> usize {
        ((n as f64 / rho).round() as usize).max(n)
    }

    /// Log-probability of `n` sampled taxa given the start age.
    ///
    /// Returns negative infinity when the current parameters are invalid.
    #[must_use]
    pub fn ln_probability_num_taxa(&self, n: usize) -> f64 {
        let (Ok(rates), Some(rho)) = (self.process_rates(), self.rho()) else {
            return f64::NEG_INFINITY;
        };
        let (n, rho) = match self.strategy {
            SamplingStrategy::Uniform => (n, rho),
            SamplingStrategy::Diversified => (Self::complete_num_taxa(n, rho), 1.0),
        };
        rates.ln_probability_num_taxa(n, self.start.age(), rho, self.start.is_root())
    }

    fn ln_condition(&self, rates: &ProcessRates, rho: f64, num_taxa: usize) -> f64 {
        let start_age = self.start.age();
        #[allow(clippy::cast_precision_loss)]
        let lineages = self.start.lineages() as f64;
        match self.condition {
            Condition::Time => 0.0,
            Condition::Survival => lineages * rates.survival(start_age, self.effective_rho(rho)).ln_survival,
            Condition::NumTaxa => self.ln_probability_num_taxa(num_taxa),
        }
    }

    fn ln_diversified_correction(rates: &ProcessRates, youngest: f64, start_age: f64, n: usize, rho: f64) -> f64 {
        let m = Self::complete_num_taxa(n, rho);
        #[allow(clippy::cast_precision_loss)]
        let missing = (m - n) as f64;
        if missing == 0.0 {
            return 0.0;
        }
        missing * rates.ln_unsampled_fraction(youngest, start_age) + ln_choose(m, n)
    }

    fn ln_incomplete_clades(&self, rates: &ProcessRates, tree: &Tree, start_age: f64) -> f64 {
        let mut ln = 0.0;
        for clade in self.incomplete_clades.iter().filter(|c| c.num_missing() > 0) {
            let Some(age) = tree.tmrca(clade) else {
                return f64::NEG_INFINITY;
            };
            #[allow(clippy::cast_precision_loss)]
            let missing = clade.num_missing() as f64;
            ln += missing * rates.ln_unsampled_fraction(age, start_age);
        }
        ln
    }

    fn ln_density(&self, tree: &Tree) -> f64 {
        let (Ok(rates), Some(rho)) = (self.process_rates(), self.rho()) else {
            return f64::NEG_INFINITY;
        };
        let n = tree.num_tips();
        if n == 0 || !tree.has_consistent_ages() || !tree.is_ultrametric(AGE_TOLERANCE) {
            return f64::NEG_INFINITY;
        }
        if tree.nodes().iter().any(|node| node.is_sampled_ancestor()) {
            return f64::NEG_INFINITY;
        }
        if !self.start.admits(tree) || !tree.satisfies_constraints(&self.constraints) {
            return f64::NEG_INFINITY;
        }

        let start_age = self.start.age();
        let rho_eff = self.effective_rho(rho);
        let mut ages = tree.speciation_ages();
        if self.start.is_root() {
            // The root is the start of the process, not a speciation draw.
            if ages.pop().is_none() {
                return f64::NEG_INFINITY;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let mut ln = self.start.lineages() as f64 * rates.ln_p1(start_age, rho_eff);
        for &age in &ages {
            let term = rates.speciation.at(age).ln() + rates.ln_p1(age, rho_eff);
            if !term.is_finite() {
                return term;
            }
            ln += term;
        }

        if self.strategy == SamplingStrategy::Diversified {
            let youngest = tree.speciation_ages().first().copied().unwrap_or(start_age);
            ln += Self::ln_diversified_correction(&rates, youngest, start_age, n, rho);
        }
        ln += self.ln_incomplete_clades(&rates, tree, start_age);
        ln - self.ln_condition(&rates, rho, n)
    }

    fn simulate(&self, rng: &mut dyn RandomSource) -> Result<Tree, GraphError> {
        let rates = self.process_rates().map_err(|e| GraphError::SimulationFailed {
            reason: e.to_string(),
        })?;
        let rho = self.rho().ok_or_else(|| GraphError::SimulationFailed {
            reason: format!("sampling fraction {} is outside (0, 1]", *self.sampling.value()),
        })?;
        let n = self.taxa.len();
        let start_age = self.start.age();
        let lineages = self.start.lineages();
        if n < lineages {
            return Err(GraphError::SimulationFailed {
                reason: format!("{n} taxa cannot descend from {lineages} starting lineages"),
            });
        }
        let (total, sampler_rho) = match self.strategy {
            SamplingStrategy::Uniform => (n, rho),
            SamplingStrategy::Diversified => (Self::complete_num_taxa(n, rho), 1.0),
        };
        let sampler = NodeAgeSampler::new(&rates, sampler_rho, start_age, self.simulation.time_grid_points)?;
        let mut ages = sampler.sample_sorted(total - lineages, rng);
        ages.truncate(n - lineages);
        if self.start.is_root() {
            ages.push(start_age);
        }
        merge_at_ages(&self.taxa, &ages, &self.constraints, rng)
    }
}

impl Distribution<Tree> for BirthDeathProcess {
    fn compute_ln_probability(&self, value: &Tree) -> f64 {
        self.ln_density(value)
    }

    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<Tree, GraphError> {
        self.simulate(rng)
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        let mut parameters = self.speciation.parameters();
        parameters.extend(self.extinction.parameters());
        parameters.push(erase(&self.sampling));
        parameters.push(erase(self.start.node()));
        if let Some(events) = &self.mass_extinctions {
            parameters.extend(events.parameters());
        }
        parameters
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        const OWNER: &str = "birth-death process";
        let mut found = self.speciation.swap(OWNER, old, new)?;
        found |= self.extinction.swap(OWNER, old, new)?;
        found |= swap_slot(OWNER, &mut self.sampling, old, new)?;
        found |= swap_slot(OWNER, self.start.node_mut(), old, new)?;
        if let Some(events) = &mut self.mass_extinctions {
            found |= events.swap(OWNER, old, new)?;
        }
        ensure_swapped(OWNER, found, old)
    }

    fn clone_box(&self) -> Box<dyn Distribution<Tree>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DagNode;
    use crate::rng::seeded_source;
    use crate::tree::tests::three_taxon_tree;

    fn real(name: &str, value: f64) -> TypedDagNode<f64> {
        ConstantNode::new(name, value)
    }

    fn extant(names: &[&str]) -> Vec<Taxon> {
        names.iter().map(|n| Taxon::new(*n)).collect()
    }

    fn constant_process(lambda: f64, mu: f64, rho: f64) -> BirthDeathBuilder {
        BirthDeathBuilder::new()
            .speciation(Rate::constant(real("lambda", lambda)))
            .extinction(Rate::constant(real("mu", mu)))
            .sampling(real("rho", rho))
    }

    #[test]
    fn start_age_must_be_unambiguous() {
        let neither = constant_process(1.0, 0.0, 1.0).build();
        assert!(matches!(neither, Err(ModelError::StartAgeAmbiguous)));
        let both = constant_process(1.0, 0.0, 1.0)
            .origin(real("origin", 5.0))
            .root_age(real("root", 2.0))
            .build();
        assert!(matches!(both, Err(ModelError::StartAgeAmbiguous)));
    }

    #[test]
    fn rates_are_required() {
        let err = BirthDeathBuilder::new().origin(real("origin", 1.0)).build().unwrap_err();
        assert!(matches!(err, ModelError::InvalidParameter { ref name, .. } if name == "speciation"));
    }

    #[test]
    fn episodic_lengths_checked_at_construction() {
        let err = BirthDeathBuilder::new()
            .speciation(Rate::episodic(
                ConstantNode::new("lambda", vec![1.0, 2.0]),
                ConstantNode::new("times", vec![1.0, 2.0]),
            ))
            .extinction(Rate::constant(real("mu", 0.1)))
            .origin(real("origin", 3.0))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::LengthMismatch { .. }));
    }

    #[test]
    fn fossil_taxa_are_rejected() {
        let taxa = vec![Taxon::new("A"), Taxon::new("F").with_age(1.0).unwrap()];
        let err = constant_process(1.0, 0.0, 1.0)
            .origin(real("origin", 3.0))
            .taxa(taxa)
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidParameter { .. }));
    }

    #[test]
    fn options_parse_from_strings() {
        assert_eq!("nTaxa".parse::<Condition>().unwrap(), Condition::NumTaxa);
        assert_eq!("diversified".parse::<SamplingStrategy>().unwrap(), SamplingStrategy::Diversified);
        assert!(matches!(
            "sometimes".parse::<Condition>(),
            Err(ModelError::UnknownOption { kind: "condition", .. })
        ));
        assert_eq!(Condition::NumTaxa.to_string(), "nTaxa");
    }

    #[test]
    fn single_lineage_pure_birth() {
        let process = constant_process(1.0, 0.0, 1.0)
            .origin(real("origin", 10.0))
            .condition(Condition::Time)
            .build()
            .unwrap();
        let tree = Tree::single_tip(Taxon::new("A"));
        assert!((process.compute_ln_probability(&tree) + 10.0).abs() < 1e-12);
    }

    #[test]
    fn yule_root_density_matches_hand_computation() {
        // Pure birth, root at 2, one more speciation at 1:
        // 2 ln P1(2) + ln lambda + ln P1(1) with P1(a) = e^{-lambda a}.
        let lambda: f64 = 1.5;
        let process = constant_process(lambda, 0.0, 1.0)
            .root_age(real("root", 2.0))
            .condition(Condition::Time)
            .build()
            .unwrap();
        let expected = 2.0 * (-lambda * 2.0) + lambda.ln() - lambda;
        let ln = process.compute_ln_probability(&three_taxon_tree());
        assert!((ln - expected).abs() < 1e-10, "{ln} vs {expected}");
    }

    #[test]
    fn root_age_must_match_parameter() {
        let process = constant_process(1.0, 0.2, 1.0)
            .root_age(real("root", 3.0))
            .build()
            .unwrap();
        assert_eq!(process.compute_ln_probability(&three_taxon_tree()), f64::NEG_INFINITY);
    }

    #[test]
    fn origin_must_be_older_than_root() {
        let process = constant_process(1.0, 0.2, 1.0)
            .origin(real("origin", 1.5))
            .build()
            .unwrap();
        assert_eq!(process.compute_ln_probability(&three_taxon_tree()), f64::NEG_INFINITY);
    }

    #[test]
    fn violated_constraint_is_impossible() {
        let ac = Clade::new(["A", "C"]).unwrap();
        let process = constant_process(1.0, 0.2, 1.0)
            .origin(real("origin", 4.0))
            .constraints(vec![ac])
            .build()
            .unwrap();
        assert_eq!(process.compute_ln_probability(&three_taxon_tree()), f64::NEG_INFINITY);
    }

    #[test]
    fn survival_condition_divides_by_survival() {
        let time = constant_process(1.0, 0.5, 0.5)
            .origin(real("origin", 4.0))
            .condition(Condition::Time)
            .build()
            .unwrap();
        let survival = constant_process(1.0, 0.5, 0.5)
            .origin(real("origin", 4.0))
            .condition(Condition::Survival)
            .build()
            .unwrap();
        let tree = three_taxon_tree();
        let rates = ProcessRates::constant(1.0, 0.5);
        let ln_ps = rates.survival(4.0, 0.5).ln_survival;
        let difference = survival.compute_ln_probability(&tree) - time.compute_ln_probability(&tree);
        assert!((difference + ln_ps).abs() < 1e-10);
    }

    #[test]
    fn num_taxa_condition_uses_tip_count() {
        let process = constant_process(1.0, 0.5, 0.5)
            .root_age(real("root", 2.0))
            .condition(Condition::NumTaxa)
            .build()
            .unwrap();
        let rates = ProcessRates::constant(1.0, 0.5);
        let time = constant_process(1.0, 0.5, 0.5)
            .root_age(real("root", 2.0))
            .condition(Condition::Time)
            .build()
            .unwrap();
        let tree = three_taxon_tree();
        let expected = time.compute_ln_probability(&tree) - rates.ln_probability_num_taxa(3, 2.0, 0.5, true);
        assert!((process.compute_ln_probability(&tree) - expected).abs() < 1e-10);
        assert!((process.ln_probability_num_taxa(3) - rates.ln_probability_num_taxa(3, 2.0, 0.5, true)).abs() < 1e-12);
    }

    #[test]
    fn diversified_sampling_adds_missing_lineages() {
        let uniform_full = constant_process(1.0, 0.2, 1.0)
            .root_age(real("root", 2.0))
            .condition(Condition::Time)
            .build()
            .unwrap();
        let diversified = constant_process(1.0, 0.2, 0.5)
            .root_age(real("root", 2.0))
            .condition(Condition::Time)
            .sampling_strategy(SamplingStrategy::Diversified)
            .build()
            .unwrap();
        let tree = three_taxon_tree();
        let rates = ProcessRates::constant(1.0, 0.2);
        // m = 6 species, 3 sampled, youngest sampled speciation at age 1.
        let correction = 3.0 * rates.ln_unsampled_fraction(1.0, 2.0) + ln_choose(6, 3);
        let difference = diversified.compute_ln_probability(&tree) - uniform_full.compute_ln_probability(&tree);
        assert!((difference - correction).abs() < 1e-10);
    }

    #[test]
    fn incomplete_clades_add_missing_species() {
        let ab = Clade::new(["A", "B"]).unwrap().with_missing(2);
        let plain = constant_process(1.0, 0.2, 1.0)
            .origin(real("origin", 3.0))
            .build()
            .unwrap();
        let incomplete = constant_process(1.0, 0.2, 1.0)
            .origin(real("origin", 3.0))
            .incomplete_clades(vec![ab])
            .build()
            .unwrap();
        let tree = three_taxon_tree();
        let rates = ProcessRates::constant(1.0, 0.2);
        let expected = 2.0 * rates.ln_unsampled_fraction(1.0, 3.0);
        let difference = incomplete.compute_ln_probability(&tree) - plain.compute_ln_probability(&tree);
        assert!((difference - expected).abs() < 1e-10);
    }

    #[test]
    fn invalid_sampling_fraction_is_impossible() {
        let process = constant_process(1.0, 0.2, 1.5)
            .origin(real("origin", 3.0))
            .build()
            .unwrap();
        assert_eq!(process.compute_ln_probability(&three_taxon_tree()), f64::NEG_INFINITY);
    }

    #[test]
    fn simulated_trees_have_finite_density() {
        let constraint = Clade::new(["A", "B"]).unwrap();
        let variants = [
            constant_process(1.0, 0.3, 1.0).origin(real("origin", 4.0)),
            constant_process(1.0, 0.3, 0.6).root_age(real("root", 3.0)),
            constant_process(1.0, 0.3, 0.5)
                .root_age(real("root", 3.0))
                .sampling_strategy(SamplingStrategy::Diversified),
        ];
        let mut rng = seeded_source(21);
        for builder in variants {
            let process = builder
                .taxa(extant(&["A", "B", "C", "D", "E"]))
                .constraints(vec![constraint.clone()])
                .build()
                .unwrap();
            for _ in 0..5 {
                let tree = process.redraw_value(&mut rng).unwrap();
                tree.validate().unwrap();
                assert_eq!(tree.num_tips(), 5);
                assert!(tree.is_monophyletic(&constraint));
                assert!(process.compute_ln_probability(&tree).is_finite());
            }
        }
    }

    #[test]
    fn swap_parameter_reaches_rates_and_start() {
        let lambda = real("lambda", 1.0);
        let origin = real("origin", 4.0);
        let mut process = BirthDeathBuilder::new()
            .speciation(Rate::constant(lambda.clone()))
            .extinction(Rate::constant(real("mu", 0.1)))
            .origin(origin.clone())
            .build()
            .unwrap();
        assert_eq!(process.parameters().len(), 4);
        let older = real("older", 6.0);
        process.swap_parameter(origin.id(), &ParameterHandle::Real(older)).unwrap();
        assert_eq!(process.start().age(), 6.0);
        let faster = real("faster", 2.0);
        process.swap_parameter(lambda.id(), &ParameterHandle::Real(faster)).unwrap();
        assert_eq!(process.process_rates().unwrap().speciation.at(1.0), 2.0);
        let stranger = real("stranger", 1.0);
        assert!(process
            .swap_parameter(stranger.id(), &ParameterHandle::Real(real("x", 1.0)))
            .is_err());
    }
}
