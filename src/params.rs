/*!
# Parameters and Priors

Each sampled parameter carries a [`ParameterSpec`]: a name, a built-in
prior ([`Prior::Uniform`] or [`Prior::Gaussian`]), a starting value, a
proposal width, and a target accuracy for the stopping rule. Unset fields
derive from the prior:

- starting value: midpoint of the range / the prior mean,
- proposal width: 1/100 of the range / of sigma,
- accuracy: 1/10 of the proposal width.

The joint prior the engine evaluates is a [`PriorDensity`]; the built-in
variant ([`ProductPrior`]) multiplies the per-parameter densities, and a
user plug-in can replace it wholesale via
[`crate::metropolis_hastings::MetropolisHastings::use_external_prior`].

# Examples

```rust
use blocked_mh::params::{ParameterSpec, Prior, PriorDensity, ProductPrior};

let spec = ParameterSpec::new("omega_m", Prior::Uniform { min: 0.0, max: 1.0 }).unwrap();
assert_eq!(spec.start, 0.5);
assert_eq!(spec.width, 0.01);
assert_eq!(spec.accuracy, 0.001);

let prior = ProductPrior::new(vec![spec]);
assert_eq!(prior.density(&[0.25]), 1.0);
assert_eq!(prior.density(&[1.25]), 0.0);
```
*/

use std::f64::consts::PI;

use crate::error::McmcError;

/// A built-in per-parameter prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prior {
    /// Flat on `[min, max]`, zero outside.
    Uniform { min: f64, max: f64 },
    /// Normal with the given mean and standard deviation.
    Gaussian { mean: f64, sigma: f64 },
}

impl Prior {
    /// Checks that the prior describes a proper distribution.
    pub fn validate(&self) -> Result<(), McmcError> {
        match *self {
            Prior::Uniform { min, max } if !(max > min) => Err(McmcError::Config(format!(
                "uniform prior needs max > min, got min = {min}, max = {max}"
            ))),
            Prior::Gaussian { sigma, .. } if !(sigma > 0.0) => Err(McmcError::Config(format!(
                "gaussian prior needs sigma > 0, got sigma = {sigma}"
            ))),
            _ => Ok(()),
        }
    }

    /// Evaluates the prior density at `x`.
    pub fn density(&self, x: f64) -> f64 {
        match *self {
            Prior::Uniform { min, max } => {
                if x >= min && x <= max {
                    1.0 / (max - min)
                } else {
                    0.0
                }
            }
            Prior::Gaussian { mean, sigma } => {
                let norm = 1.0 / ((2.0 * PI).sqrt() * sigma);
                norm * (-(x - mean) * (x - mean) / (2.0 * sigma * sigma)).exp()
            }
        }
    }

    /// The default starting value: midpoint of the range / the mean.
    pub fn default_start(&self) -> f64 {
        match *self {
            Prior::Uniform { min, max } => (min + max) / 2.0,
            Prior::Gaussian { mean, .. } => mean,
        }
    }

    /// The default proposal width: 1/100 of the range / of sigma.
    pub fn default_width(&self) -> f64 {
        match *self {
            Prior::Uniform { min, max } => (max - min) / 100.0,
            Prior::Gaussian { sigma, .. } => sigma / 100.0,
        }
    }
}

/// Full per-parameter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// The parameter name, written to the paramnames sidecar.
    pub name: String,
    /// The built-in prior for this parameter.
    pub prior: Prior,
    /// The starting value of the chain for this parameter.
    pub start: f64,
    /// The standard deviation of the built-in Gaussian proposal.
    pub width: f64,
    /// The target accuracy of the posterior mean, used by the stop rule.
    pub accuracy: f64,
}

impl ParameterSpec {
    /// Creates a spec with all derived defaults.
    pub fn new(name: &str, prior: Prior) -> Result<Self, McmcError> {
        Self::with_options(name, prior, None, None, None)
    }

    /// Creates a spec, overriding any of the derived defaults.
    ///
    /// `width` and `accuracy`, when given, must be positive.
    pub fn with_options(
        name: &str,
        prior: Prior,
        start: Option<f64>,
        width: Option<f64>,
        accuracy: Option<f64>,
    ) -> Result<Self, McmcError> {
        prior.validate()?;

        if let Some(w) = width {
            if !(w > 0.0) {
                return Err(McmcError::Config(format!(
                    "parameter {name}: proposal width must be positive, got {w}"
                )));
            }
        }
        if let Some(a) = accuracy {
            if !(a > 0.0) {
                return Err(McmcError::Config(format!(
                    "parameter {name}: accuracy must be positive, got {a}"
                )));
            }
        }

        let width = width.unwrap_or_else(|| prior.default_width());
        Ok(Self {
            name: name.to_string(),
            prior,
            start: start.unwrap_or_else(|| prior.default_start()),
            width,
            accuracy: accuracy.unwrap_or(width / 10.0),
        })
    }
}

/// The joint prior density over a full parameter vector.
///
/// The engine only ever calls through this trait; whether the active
/// variant is the built-in product or an external plug-in is decided at
/// configuration time.
pub trait PriorDensity {
    /// Evaluates the joint prior density at `params`.
    fn density(&self, params: &[f64]) -> f64;
}

/// The built-in joint prior: the product of the per-parameter densities.
#[derive(Debug, Clone)]
pub struct ProductPrior {
    priors: Vec<Prior>,
}

impl ProductPrior {
    /// Builds the product prior from the configured specs.
    pub fn new(specs: Vec<ParameterSpec>) -> Self {
        Self {
            priors: specs.into_iter().map(|s| s.prior).collect(),
        }
    }
}

impl PriorDensity for ProductPrior {
    fn density(&self, params: &[f64]) -> f64 {
        self.priors
            .iter()
            .zip(params)
            .map(|(prior, &x)| prior.density(x))
            .product()
    }
}
