//! Display names for completed runs.

use lt_optimizer::{CompositeSearchSpace, SearchSpace};
use lt_types::ParameterAssignment;

/// Render an assignment as `key=value` pairs for the dimensions that
/// actually vary, in space declaration order. Constants and single-choice
/// categoricals are omitted so names stay short. When nothing varies
/// (single-point space) every dimension is rendered instead, so names are
/// never empty.
pub fn parameters_to_name(assignment: &ParameterAssignment, space: &SearchSpace) -> String {
    let parts: Vec<String> = space
        .dimensions
        .iter()
        .filter(|dim| dim.kind.is_varying())
        .filter_map(|dim| {
            assignment
                .get(&dim.name)
                .map(|value| format!("{}={value}", dim.name))
        })
        .collect();
    if !parts.is_empty() {
        return parts.join(" ");
    }
    space
        .dimensions
        .iter()
        .filter_map(|dim| {
            assignment
                .get(&dim.name)
                .map(|value| format!("{}={value}", dim.name))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Composite-space variant: names are rendered against the sub-space the
/// assignment was drawn from. Assignments from outside the space (foreign
/// entries in a shared results directory) render every parameter in key
/// order.
pub fn composite_parameters_to_name(
    assignment: &ParameterAssignment,
    space: &CompositeSearchSpace,
) -> String {
    match space.space_for(assignment) {
        Some(sub_space) => parameters_to_name(assignment, sub_space),
        None => assignment
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
