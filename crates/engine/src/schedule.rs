//! Daily trigger time for schedule nodes.

use chrono::{NaiveTime, Timelike};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::inputs::TRIGGER_TIME_FIELD;
use crate::models::TemplateGraph;
use crate::{EngineError, UserInputs};

pub const SCHEDULE_NODE_TYPE: &str = "n8n-nodes-base.scheduleTrigger";

/// A once-a-day trigger at a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    time: NaiveTime,
}

impl DailyTrigger {
    /// Parse an `HH:MM` time.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .map(|time| Self { time })
            .map_err(|_| {
                EngineError::validation(
                    format!("trigger time ('{raw}' is not HH:MM)"),
                    vec![TRIGGER_TIME_FIELD.to_owned()],
                )
            })
    }

    /// The trigger the user asked for, if any.
    pub fn from_inputs(inputs: &UserInputs) -> Result<Option<Self>, EngineError> {
        inputs.text(TRIGGER_TIME_FIELD).map(|raw| Self::parse(&raw)).transpose()
    }

    pub fn hour(&self) -> u32 {
        self.time.hour()
    }

    pub fn minute(&self) -> u32 {
        self.time.minute()
    }

    /// Schedule rule parameter understood by schedule trigger nodes.
    pub fn rule(&self) -> Value {
        json!({
            "interval": [{
                "field": "days",
                "triggerAtHour": self.hour(),
                "triggerAtMinute": self.minute(),
            }]
        })
    }

    /// Set the rule on every schedule trigger node. Returns how many changed.
    pub fn apply(&self, graph: &mut TemplateGraph) -> usize {
        let mut count = 0;
        for node in graph.nodes.iter_mut().filter(|n| n.node_type == SCHEDULE_NODE_TYPE) {
            if !node.parameters.is_object() {
                node.parameters = Value::Object(Map::new());
            }
            if let Some(params) = node.parameters.as_object_mut() {
                params.insert("rule".to_owned(), self.rule());
            }
            debug!("schedule node '{}' fires daily at {}", node.name, self.time.format("%H:%M"));
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hh_mm() {
        let t = DailyTrigger::parse("07:45").unwrap();
        assert_eq!((t.hour(), t.minute()), (7, 45));
    }

    #[test]
    fn rejects_garbage_naming_the_field() {
        for raw in ["25:00", "7pm", "12:61", ""] {
            let err = DailyTrigger::parse(raw).unwrap_err();
            assert!(matches!(err, EngineError::Validation { missing_fields, .. }
                if missing_fields == vec![TRIGGER_TIME_FIELD.to_string()]));
        }
    }

    #[test]
    fn absent_time_means_no_trigger() {
        assert_eq!(DailyTrigger::from_inputs(&UserInputs::new()).unwrap(), None);
        let inputs = UserInputs::new().with(TRIGGER_TIME_FIELD, "18:00");
        assert!(DailyTrigger::from_inputs(&inputs).unwrap().is_some());
    }

    #[test]
    fn rule_lands_on_schedule_nodes_only() {
        let mut graph: TemplateGraph = serde_json::from_value(json!({
            "nodes": [
                {"name": "Every day", "type": SCHEDULE_NODE_TYPE, "parameters": {"rule": {"interval": [{}]}}},
                {"name": "Hook", "type": "n8n-nodes-base.webhook"}
            ]
        }))
        .unwrap();

        let n = DailyTrigger::parse("09:30").unwrap().apply(&mut graph);

        assert_eq!(n, 1);
        assert_eq!(graph.nodes[0].parameters["rule"]["interval"][0]["triggerAtHour"], 9);
        assert_eq!(graph.nodes[0].parameters["rule"]["interval"][0]["triggerAtMinute"], 30);
        assert!(graph.nodes[1].parameters.get("rule").is_none());
    }
}
