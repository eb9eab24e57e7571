//! Search space definitions and deterministic enumeration.

use serde::{Deserialize, Serialize};

use lt_types::{config_error, ConfigError, LatticeResult, ParamValue, ParameterAssignment};

/// A single named axis of variation in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDef {
    pub name: String,
    pub kind: DimensionKind,
}

/// How a dimension contributes values to each assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DimensionKind {
    /// Ordered candidate values, tried in declaration order.
    Categorical { choices: Vec<ParamValue> },
    /// A single fixed value, present in every assignment.
    Constant { value: ParamValue },
}

impl DimensionKind {
    pub fn categorical<I, V>(choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        Self::Categorical {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn constant<V: Into<ParamValue>>(value: V) -> Self {
        Self::Constant {
            value: value.into(),
        }
    }

    /// Number of candidate values this dimension contributes.
    pub fn cardinality(&self) -> usize {
        match self {
            Self::Categorical { choices } => choices.len(),
            Self::Constant { .. } => 1,
        }
    }

    /// True for axes that actually vary across the sweep.
    pub fn is_varying(&self) -> bool {
        self.cardinality() > 1
    }

    fn values(&self) -> Vec<ParamValue> {
        match self {
            Self::Categorical { choices } => choices.clone(),
            Self::Constant { value } => vec![value.clone()],
        }
    }
}

/// The full search space: an ordered list of dimension definitions.
/// Declaration order is the enumeration order, which is what lets a
/// restarted sweep re-derive the same assignment sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub dimensions: Vec<DimensionDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            dimensions: Vec::new(),
        }
    }

    pub fn add_categorical<N, I, V>(mut self, name: N, choices: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        self.dimensions.push(DimensionDef {
            name: name.into(),
            kind: DimensionKind::categorical(choices),
        });
        self
    }

    pub fn add_constant<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<ParamValue>,
    {
        self.dimensions.push(DimensionDef {
            name: name.into(),
            kind: DimensionKind::constant(value),
        });
        self
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionDef> {
        self.dimensions.iter().find(|dim| dim.name == name)
    }

    /// Override a declared dimension in place, leaving the others (and the
    /// enumeration position of this one) untouched. Used to narrow a sweep,
    /// e.g. pinning a categorical model axis to one fixed value.
    pub fn replace_dimension(&mut self, name: &str, kind: DimensionKind) -> LatticeResult<()> {
        match self.dimensions.iter_mut().find(|dim| dim.name == name) {
            Some(dim) => {
                dim.kind = kind;
                Ok(())
            }
            None => Err(ConfigError::UnknownDimension {
                name: name.to_string(),
            }
            .into()),
        }
    }

    pub fn validate(&self) -> LatticeResult<()> {
        for (i, dim) in self.dimensions.iter().enumerate() {
            if dim.kind.cardinality() == 0 {
                return Err(ConfigError::EmptyCategorical {
                    name: dim.name.clone(),
                }
                .into());
            }
            if self.dimensions[..i].iter().any(|d| d.name == dim.name) {
                return Err(config_error!("duplicate dimension: {}", dim.name));
            }
        }
        Ok(())
    }

    /// Total number of grid points, `None` on overflow.
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for dim in &self.dimensions {
            total = total.checked_mul(dim.kind.cardinality())?;
        }
        Some(total)
    }

    /// Every full combination across all dimensions, in a fixed order:
    /// dimensions iterate as declared, with the last-declared dimension
    /// varying fastest.
    pub fn enumerate(&self) -> LatticeResult<Vec<ParameterAssignment>> {
        self.validate()?;

        let mut result: Vec<ParameterAssignment> = vec![ParameterAssignment::new()];
        for dim in &self.dimensions {
            let values = dim.kind.values();
            let mut next = Vec::with_capacity(result.len() * values.len());
            for existing in &result {
                for value in &values {
                    next.push(existing.clone().with(dim.name.as_str(), value.clone()));
                }
            }
            result = next;
        }
        Ok(result)
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// An ordered sequence of search spaces swept together. Enumeration is the
/// concatenation of each sub-space's own enumeration, not a cross-product,
/// so unrelated experiments can share one sweep and one results directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSearchSpace {
    pub spaces: Vec<SearchSpace>,
}

impl CompositeSearchSpace {
    pub fn new() -> Self {
        Self { spaces: Vec::new() }
    }

    pub fn add_space(mut self, space: SearchSpace) -> Self {
        self.spaces.push(space);
        self
    }

    pub fn validate(&self) -> LatticeResult<()> {
        for space in &self.spaces {
            space.validate()?;
        }
        Ok(())
    }

    /// Sum of sub-space grid sizes, `None` on overflow.
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 0;
        for space in &self.spaces {
            total = total.checked_add(space.grid_size()?)?;
        }
        Some(total)
    }

    pub fn enumerate(&self) -> LatticeResult<Vec<ParameterAssignment>> {
        let mut result = Vec::new();
        for space in &self.spaces {
            result.extend(space.enumerate()?);
        }
        Ok(result)
    }

    /// The sub-space that declares every parameter of `assignment`, used
    /// when rendering display names for runs drawn from a composite sweep.
    pub fn space_for(&self, assignment: &ParameterAssignment) -> Option<&SearchSpace> {
        self.spaces.iter().find(|space| {
            space.dimensions.len() == assignment.len()
                && assignment.iter().all(|(name, _)| space.dimension(name).is_some())
        })
    }
}

impl Default for CompositeSearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl From<SearchSpace> for CompositeSearchSpace {
    fn from(space: SearchSpace) -> Self {
        Self {
            spaces: vec![space],
        }
    }
}
