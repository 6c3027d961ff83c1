//! Constant-rate fossilized birth-death process.
//!
//! Lineages speciate at rate `lambda`, go extinct at rate `mu` and leave
//! fossils at rate `psi`; extant species are sampled with probability `rho`.
//! Tips older than the present are fossils and a one-child node carrying a
//! taxon is a sampled ancestor.

use crate::clade::Clade;
use crate::dag::{ensure_swapped, erase, swap_slot, ConstantNode, DagNodeRef, NodeId, ParameterHandle, TypedDagNode, TypedNode};
use crate::distribution::Distribution;
use crate::error::{GraphError, ModelError};
use crate::rng::RandomSource;
use crate::taxon::Taxon;
use crate::tree::simulate::{heterochronous_merge, AgeBound};
use crate::tree::Tree;

use super::{Condition, ProcessStart, AGE_TOLERANCE};

/// Numeric parameters of the process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FossilizedRates {
    pub lambda: f64,
    pub mu: f64,
    pub psi: f64,
    pub rho: f64,
}

impl FossilizedRates {
    fn is_valid(&self) -> bool {
        self.lambda > 0.0
            && self.mu >= 0.0
            && self.psi >= 0.0
            && self.rho > 0.0
            && self.rho <= 1.0
            && [self.lambda, self.mu, self.psi].iter().all(|r| r.is_finite())
    }

    fn constants(&self) -> (f64, f64) {
        let a = self.lambda - self.mu - self.psi;
        let c1 = (a * a + 4.0 * self.lambda * self.psi).sqrt().abs();
        let c2 = -(a - 2.0 * self.lambda * self.rho) / c1;
        (c1, c2)
    }

    /// `ln q(t)`; `1 / q(t)` is, up to a constant, the probability density of
    /// a lineage at age `t` leaving exactly the observed descendants.
    #[must_use]
    pub fn ln_q(&self, t: f64) -> f64 {
        let (c1, c2) = self.constants();
        c1 * t + 2.0 * ((-c1 * t).exp() * (1.0 - c2) + (1.0 + c2)).ln()
    }

    /// Probability that a lineage at age `t` leaves no sampled descendant,
    /// fossil or extant.
    #[must_use]
    pub fn p0(&self, t: f64) -> f64 {
        let (c1, c2) = self.constants();
        let e = (-c1 * t).exp() * (1.0 - c2);
        let ratio = (e - (1.0 + c2)) / (e + (1.0 + c2));
        (self.lambda + self.mu + self.psi + c1 * ratio) / (2.0 * self.lambda)
    }

    /// Probability that a lineage at age `t` leaves at least one sampled
    /// extant descendant.
    #[must_use]
    pub fn extant_survival(&self, t: f64) -> f64 {
        let (lambda, mu, rho) = (self.lambda, self.mu, self.rho);
        let r = lambda - mu;
        if r.abs() < 1e-12 {
            return rho / (1.0 + rho * lambda * t);
        }
        rho * r / (lambda * rho + (lambda * (1.0 - rho) - mu) * (-r * t).exp())
    }
}

/// Builder for [`FossilizedBirthDeath`].
#[derive(Debug, Clone, Default)]
pub struct FossilizedBuilder {
    speciation: Option<TypedDagNode<f64>>,
    extinction: Option<TypedDagNode<f64>>,
    fossilization: Option<TypedDagNode<f64>>,
    sampling: Option<TypedDagNode<f64>>,
    origin: Option<TypedDagNode<f64>>,
    root_age: Option<TypedDagNode<f64>>,
    condition: Condition,
    taxa: Vec<Taxon>,
    constraints: Vec<Clade>,
}

impl FossilizedBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn speciation(mut self, lambda: TypedDagNode<f64>) -> Self {
        self.speciation = Some(lambda);
        self
    }

    #[must_use]
    pub fn extinction(mut self, mu: TypedDagNode<f64>) -> Self {
        self.extinction = Some(mu);
        self
    }

    /// Fossil sampling rate `psi`.
    #[must_use]
    pub fn fossilization(mut self, psi: TypedDagNode<f64>) -> Self {
        self.fossilization = Some(psi);
        self
    }

    /// Extant sampling fraction (default: 1).
    #[must_use]
    pub fn sampling(mut self, rho: TypedDagNode<f64>) -> Self {
        self.sampling = Some(rho);
        self
    }

    #[must_use]
    pub fn origin(mut self, age: TypedDagNode<f64>) -> Self {
        self.origin = Some(age);
        self
    }

    #[must_use]
    pub fn root_age(mut self, age: TypedDagNode<f64>) -> Self {
        self.root_age = Some(age);
        self
    }

    /// Conditioning: `time` or `survival` (default).
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// Extant and fossil taxa of simulated trees.
    #[must_use]
    pub fn taxa(mut self, taxa: Vec<Taxon>) -> Self {
        self.taxa = taxa;
        self
    }

    #[must_use]
    pub fn constraints(mut self, clades: Vec<Clade>) -> Self {
        self.constraints = clades;
        self
    }

    /// Builds the process.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidParameter` for a missing rate or the
    /// `nTaxa` condition, and `ModelError::StartAgeAmbiguous` unless exactly
    /// one start age is given.
    pub fn build(self) -> Result<FossilizedBirthDeath, ModelError> {
        let lambda = self.speciation.ok_or_else(|| required("speciation"))?;
        let mu = self.extinction.ok_or_else(|| required("extinction"))?;
        let psi = self.fossilization.ok_or_else(|| required("fossilization"))?;
        let start = ProcessStart::from_options(self.origin, self.root_age)?;
        if self.condition == Condition::NumTaxa {
            return Err(ModelError::InvalidParameter {
                name: "condition".to_string(),
                reason: "the fossilized process supports 'time' and 'survival' only".to_string(),
            });
        }
        let rho: TypedDagNode<f64> = self.sampling.unwrap_or_else(|| ConstantNode::new("rho", 1.0));
        Ok(FossilizedBirthDeath {
            lambda,
            mu,
            psi,
            rho,
            start,
            condition: self.condition,
            taxa: self.taxa,
            constraints: self.constraints,
        })
    }
}

fn required(name: &str) -> ModelError {
    ModelError::InvalidParameter {
        name: name.to_string(),
        reason: "required".to_string(),
    }
}

/// Serially sampled birth-death process with constant rates.
#[derive(Debug, Clone)]
pub struct FossilizedBirthDeath {
    lambda: TypedDagNode<f64>,
    mu: TypedDagNode<f64>,
    psi: TypedDagNode<f64>,
    rho: TypedDagNode<f64>,
    start: ProcessStart,
    condition: Condition,
    taxa: Vec<Taxon>,
    constraints: Vec<Clade>,
}

impl FossilizedBirthDeath {
    #[must_use]
    pub fn builder() -> FossilizedBuilder {
        FossilizedBuilder::new()
    }

    #[must_use]
    pub fn rates(&self) -> FossilizedRates {
        FossilizedRates {
            lambda: *self.lambda.value(),
            mu: *self.mu.value(),
            psi: *self.psi.value(),
            rho: *self.rho.value(),
        }
    }

    #[must_use]
    pub const fn start(&self) -> &ProcessStart {
        &self.start
    }

    #[allow(clippy::cast_precision_loss)]
    fn ln_density(&self, tree: &Tree) -> f64 {
        let rates = self.rates();
        if !rates.is_valid() || tree.num_tips() == 0 || !tree.has_consistent_ages() {
            return f64::NEG_INFINITY;
        }
        if !self.start.admits(tree) || !tree.satisfies_constraints(&self.constraints) {
            return f64::NEG_INFINITY;
        }
        let Some(root) = tree.root().and_then(|r| tree.node(r)) else {
            return f64::NEG_INFINITY;
        };
        if self.start.is_root() && !root.is_speciation() {
            return f64::NEG_INFINITY;
        }

        let fossil_tips: Vec<f64> = tree
            .tips()
            .filter(|t| t.age() > AGE_TOLERANCE)
            .map(|t| t.age())
            .collect();
        let num_extant = tree.num_tips() - fossil_tips.len();
        let num_sampled_ancestors = tree.nodes().iter().filter(|n| n.is_sampled_ancestor()).count();
        let num_fossils = fossil_tips.len() + num_sampled_ancestors;

        let mut ln = 0.0;
        if num_fossils > 0 {
            if rates.psi <= 0.0 {
                return f64::NEG_INFINITY;
            }
            ln += num_fossils as f64 * rates.psi.ln();
        }
        ln += num_extant as f64 * (4.0 * rates.rho).ln();

        let start_age = self.start.age();
        let lineages = self.start.lineages() as f64;
        ln -= lineages * rates.ln_q(start_age);

        let mut internal = tree.speciation_ages();
        if self.start.is_root() {
            internal.pop();
        }
        for age in internal {
            ln += rates.lambda.ln() - rates.ln_q(age);
        }
        for age in fossil_tips {
            ln += rates.p0(age).ln() + rates.ln_q(age);
        }

        if self.condition == Condition::Survival {
            ln -= lineages * rates.extant_survival(start_age).ln();
        }
        ln
    }

    fn simulate(&self, rng: &mut dyn RandomSource) -> Result<Tree, GraphError> {
        let rates = self.rates();
        if !rates.is_valid() {
            return Err(GraphError::SimulationFailed {
                reason: format!("invalid rates {rates:?}"),
            });
        }
        let bound = match self.start {
            ProcessStart::Origin(_) => AgeBound::Origin(self.start.age()),
            ProcessStart::Root(_) => AgeBound::Root(self.start.age()),
        };
        heterochronous_merge(&self.taxa, rates.lambda, bound, &self.constraints, rng)
    }
}

impl Distribution<Tree> for FossilizedBirthDeath {
    fn compute_ln_probability(&self, value: &Tree) -> f64 {
        self.ln_density(value)
    }

    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<Tree, GraphError> {
        self.simulate(rng)
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![
            erase(&self.lambda),
            erase(&self.mu),
            erase(&self.psi),
            erase(&self.rho),
            erase(self.start.node()),
        ]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        const OWNER: &str = "fossilized birth-death process";
        let mut found = swap_slot(OWNER, &mut self.lambda, old, new)?;
        found |= swap_slot(OWNER, &mut self.mu, old, new)?;
        found |= swap_slot(OWNER, &mut self.psi, old, new)?;
        found |= swap_slot(OWNER, &mut self.rho, old, new)?;
        found |= swap_slot(OWNER, self.start.node_mut(), old, new)?;
        ensure_swapped(OWNER, found, old)
    }

    fn clone_box(&self) -> Box<dyn Distribution<Tree>> {
        Box::new(self.clone())
    }
}
