use crate::trace::{StepKind, TraceStep};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Findings about a trace log. Advisory only: the timeline engine renders
/// invalid logs anyway.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TraceValidationError {
    #[error("step at index {index} has an empty id")]
    EmptyStepId { index: usize },
    #[error("step id {step_id} is reused with a different type at index {index}")]
    ConflictingDuplicate { step_id: String, index: usize },
    #[error("result step {step_id} refers to call id {call_id} which no action carries")]
    DanglingResult { step_id: String, call_id: String },
    #[error("steps not in chronological order at index {index}")]
    StepsOutOfOrder { index: usize },
}

/// Validate a step list by composing independent validators.
pub fn validate_steps(steps: &[TraceStep]) -> Result<(), Vec<TraceValidationError>> {
    let validators: &[fn(&[TraceStep]) -> Vec<TraceValidationError>] = &[
        validate_ids,
        validate_duplicates,
        validate_call_ids,
        validate_order,
    ];

    let errors: Vec<TraceValidationError> = validators.iter().flat_map(|v| v(steps)).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_ids(steps: &[TraceStep]) -> Vec<TraceValidationError> {
    steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.id.trim().is_empty())
        .map(|(index, _)| TraceValidationError::EmptyStepId { index })
        .collect()
}

/// Re-emitting a step id is how partial steps grow; changing its type is not.
fn validate_duplicates(steps: &[TraceStep]) -> Vec<TraceValidationError> {
    let mut first_kind: HashMap<&str, StepKind> = HashMap::new();
    let mut errors = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            continue;
        }
        match first_kind.get(step.id.as_str()) {
            Some(kind) if *kind != step.kind => {
                errors.push(TraceValidationError::ConflictingDuplicate {
                    step_id: step.id.clone(),
                    index,
                });
            }
            Some(_) => {}
            None => {
                first_kind.insert(step.id.as_str(), step.kind);
            }
        }
    }
    errors
}

fn validate_call_ids(steps: &[TraceStep]) -> Vec<TraceValidationError> {
    let action_ids: HashSet<&str> = steps
        .iter()
        .filter(|step| step.kind == StepKind::Action)
        .filter_map(TraceStep::call_id)
        .collect();

    steps
        .iter()
        .filter(|step| step.kind == StepKind::Result)
        .filter_map(|step| {
            let call_id = step.call_id()?;
            if action_ids.contains(call_id) {
                None
            } else {
                Some(TraceValidationError::DanglingResult {
                    step_id: step.id.clone(),
                    call_id: call_id.to_string(),
                })
            }
        })
        .collect()
}

fn validate_order(steps: &[TraceStep]) -> Vec<TraceValidationError> {
    let mut errors = Vec::new();
    let mut latest = None;
    for (index, step) in steps.iter().enumerate() {
        let Some(ts) = step.timestamp else {
            continue;
        };
        if latest.is_some_and(|prev| ts < prev) {
            errors.push(TraceValidationError::StepsOutOfOrder { index });
        } else {
            latest = Some(ts);
        }
    }
    errors
}
