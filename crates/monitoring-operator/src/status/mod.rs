//! Operator health reporting.

pub mod condition;
pub mod reporter;

use serde_json::{json, Value};

use crate::platform::{DesiredObject, ObjectKind, ObjectRef};

pub use condition::{Condition, ConditionStatus, ConditionType};
pub use reporter::{IterationOutcome, StatusReporter};

/// Name of the singleton operator status object.
pub const CLUSTER_OPERATOR_NAME: &str = "monitoring";

pub fn cluster_operator_ref() -> ObjectRef {
    ObjectRef::cluster_scoped(ObjectKind::ClusterOperator, CLUSTER_OPERATOR_NAME)
}

/// Renders the condition set as the operator status object.
pub fn cluster_operator_object(conditions: &[Condition]) -> DesiredObject {
    let conditions: Vec<Value> = conditions
        .iter()
        .map(|c| {
            json!({
                "type": c.condition_type.to_string(),
                "status": c.status.to_string(),
                "reason": c.reason,
                "message": c.message,
                "lastTransitionTime": c.last_transition_time.to_rfc3339(),
            })
        })
        .collect();
    DesiredObject::new(cluster_operator_ref(), json!({ "conditions": conditions }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_operator_object() {
        let reporter = StatusReporter::new();
        reporter.report(&IterationOutcome::Succeeded);

        let object = cluster_operator_object(&reporter.snapshot());
        assert_eq!(object.object_ref.to_string(), "ClusterOperator/monitoring");

        let conditions = object.spec["conditions"].as_array().unwrap();
        assert_eq!(conditions.len(), 4);
        assert_eq!(conditions[0]["type"], "Available");
        assert_eq!(conditions[0]["status"], "True");
    }
}
