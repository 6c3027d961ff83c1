//! Concrete distributions outside the birth-death and coalescent families.

mod simple;
mod topology_constrained;

pub use simple::{Exponential, LogNormal, Normal, UniformReal};
pub use topology_constrained::TopologyConstrained;
