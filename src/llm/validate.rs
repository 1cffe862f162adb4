use serde_json::Value;
use thiserror::Error;

/// Structural JSON validation run before attempting to deserialize into a
/// typed `Plan`/`ProgressLedger`/`ConditionCheck`, mirroring the teacher's
/// `agents/plan_agent/validation.rs` `validate_plan_json` — checking shape
/// first gives a much more actionable retry prompt than a raw serde error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolValidationError {
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' has the wrong type")]
    WrongType(&'static str),
    #[error("step {index} is missing required field '{field}'")]
    StepMissingField { index: usize, field: &'static str },
    #[error("sentinel step {index} is missing required field '{field}'")]
    SentinelStepMissingField { index: usize, field: &'static str },
    #[error("sentinel step {index} has a non-positive sleep_duration")]
    SentinelNonPositiveSleep { index: usize },
}

type VResult = Result<(), ProtocolValidationError>;

fn require_field<'a>(obj: &'a serde_json::Map<String, Value>, field: &'static str) -> Result<&'a Value, ProtocolValidationError> {
    obj.get(field).ok_or(ProtocolValidationError::MissingField(field))
}

pub fn validate_plan_json(value: &Value, sentinel_enabled: bool) -> VResult {
    let obj = value.as_object().ok_or(ProtocolValidationError::NotAnObject)?;

    for field in ["task", "steps", "needs_plan", "response", "plan_summary"] {
        require_field(obj, field)?;
    }
    if !obj["needs_plan"].is_boolean() {
        return Err(ProtocolValidationError::WrongType("needs_plan"));
    }
    let steps = obj["steps"].as_array().ok_or(ProtocolValidationError::WrongType("steps"))?;

    for (index, step) in steps.iter().enumerate() {
        validate_plan_step_json(step, index, sentinel_enabled)?;
    }
    Ok(())
}

fn validate_plan_step_json(step: &Value, index: usize, sentinel_enabled: bool) -> VResult {
    let obj = step.as_object().ok_or(ProtocolValidationError::NotAnObject)?;
    for field in ["title", "details", "agent_name"] {
        if !obj.get(field).is_some_and(Value::is_string) {
            return Err(ProtocolValidationError::StepMissingField { index, field });
        }
    }

    let is_sentinel = sentinel_enabled
        && obj.get("step_type").and_then(Value::as_str) == Some("SentinelPlanStep");
    if is_sentinel {
        if !obj.contains_key("condition") {
            return Err(ProtocolValidationError::SentinelStepMissingField { index, field: "condition" });
        }
        let sleep = obj.get("sleep_duration").ok_or(ProtocolValidationError::SentinelStepMissingField {
            index,
            field: "sleep_duration",
        })?;
        let positive = sleep.as_u64().map(|v| v > 0).unwrap_or(false);
        if !positive {
            return Err(ProtocolValidationError::SentinelNonPositiveSleep { index });
        }
    }
    Ok(())
}

pub fn validate_ledger_json(value: &Value) -> VResult {
    let obj = value.as_object().ok_or(ProtocolValidationError::NotAnObject)?;
    for field in ["is_current_step_complete", "need_to_replan", "instruction_or_question", "progress_summary"] {
        require_field(obj, field)?;
    }
    for field in ["is_current_step_complete", "need_to_replan"] {
        let inner = obj[field].as_object().ok_or(ProtocolValidationError::WrongType(field))?;
        if !inner.get("answer").is_some_and(Value::is_boolean) {
            return Err(ProtocolValidationError::WrongType(field));
        }
        if !inner.get("reason").is_some_and(Value::is_string) {
            return Err(ProtocolValidationError::WrongType(field));
        }
    }
    let instruction = obj["instruction_or_question"].as_object().ok_or(ProtocolValidationError::WrongType("instruction_or_question"))?;
    if !instruction.get("answer").is_some_and(Value::is_string) {
        return Err(ProtocolValidationError::WrongType("instruction_or_question.answer"));
    }
    if !instruction.get("agent_name").is_some_and(Value::is_string) {
        return Err(ProtocolValidationError::WrongType("instruction_or_question.agent_name"));
    }
    Ok(())
}

/// Per `_sentinel_prompts_zh.py`'s `validate_sentinel_condition_check_json`
/// (ported semantics): `condition_met: bool`, non-empty `reason`, a
/// positive `sleep_duration`, non-empty `sleep_duration_reason`.
pub fn validate_condition_check_json(value: &Value) -> VResult {
    let obj = value.as_object().ok_or(ProtocolValidationError::NotAnObject)?;
    if !obj.get("condition_met").is_some_and(Value::is_boolean) {
        return Err(ProtocolValidationError::MissingField("condition_met"));
    }
    if !obj.get("reason").and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty()) {
        return Err(ProtocolValidationError::MissingField("reason"));
    }
    let sleep = obj.get("sleep_duration").and_then(Value::as_u64);
    if !sleep.is_some_and(|v| v > 0) {
        return Err(ProtocolValidationError::MissingField("sleep_duration"));
    }
    if !obj.get("sleep_duration_reason").and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty()) {
        return Err(ProtocolValidationError::MissingField("sleep_duration_reason"));
    }
    Ok(())
}
