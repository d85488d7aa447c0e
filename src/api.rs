//! Request/response data shapes for the engine's public contract (spec §6).
//!
//! The HTTP transport itself is out of scope; these are the `serde`-typed
//! shapes a hosting layer serializes/deserializes at its boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ToolValue {
    #[serde(rename = "toolNumber")]
    pub tool_number: i64,
    #[serde(rename = "qValue")]
    pub q_value: i64,
    #[serde(rename = "rValue")]
    pub r_value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomVariable {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineDataInput {
    pub program: String,
    #[serde(rename = "machineName")]
    pub machine_name: String,
    #[serde(rename = "canalNr")]
    pub canal_nr: String,
    #[serde(rename = "toolValues", default)]
    pub tool_values: Vec<ToolValue>,
    #[serde(rename = "customVariables", default)]
    pub custom_variables: Vec<CustomVariable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineDataRequest {
    pub machinedata: Vec<MachineDataInput>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentType {
    Rapid,
    Linear,
}

#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    #[serde(rename = "lineNumber")]
    pub line_number: u32,
    #[serde(rename = "toolNumber")]
    pub tool_number: i64,
    pub points: Vec<(f64, f64, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanalPlotOut {
    pub segments: Vec<Segment>,
    #[serde(rename = "executedLines")]
    pub executed_lines: Vec<u32>,
    pub variables: HashMap<String, f64>,
    pub timing: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionErrorOut {
    pub code: i32,
    pub line: u32,
    pub canal: u32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub canal: HashMap<String, CanalPlotOut>,
    pub message: Vec<String>,
    pub success: bool,
    #[serde(rename = "hasErrors")]
    pub has_errors: bool,
    pub errors: Vec<ExecutionErrorOut>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineDescriptor {
    #[serde(rename = "machineName")]
    pub machine_name: String,
    #[serde(rename = "controlType")]
    pub control_type: String,
    #[serde(rename = "variablePrefix")]
    pub variable_prefix: String,
    #[serde(rename = "regexPatterns")]
    pub regex_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListMachinesResponse {
    pub machines: Vec<MachineDescriptor>,
    pub success: bool,
}

/// Build the `list_machines` response from the static machine registry.
pub fn list_machines() -> ListMachinesResponse {
    use crate::machine::ControlFamily;

    let machines = crate::machine::available_machines()
        .into_iter()
        .filter_map(crate::machine::known)
        .map(|cfg| MachineDescriptor {
            machine_name: cfg.name.to_string(),
            control_type: match cfg.control_family {
                ControlFamily::Fanuc => "FANUC".to_string(),
                ControlFamily::Siemens => "SIEMENS".to_string(),
            },
            variable_prefix: cfg.variable_prefix.to_string(),
            regex_patterns: vec![format!("{}[0-9]+", cfg.variable_prefix)],
        })
        .collect();

    ListMachinesResponse { machines, success: true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_machines_includes_registered_names() {
        let resp = list_machines();
        assert!(resp.success);
        assert!(resp.machines.iter().any(|m| m.machine_name == "ISO_MILL"));
    }

    #[test]
    fn machine_data_request_deserializes_from_the_wire_shape() {
        let json = r#"{
            "machinedata": [
                {
                    "program": "G1 X10",
                    "machineName": "FANUC_T",
                    "canalNr": "1",
                    "toolValues": [{"toolNumber": 3, "qValue": 2, "rValue": 1.5}],
                    "customVariables": [{"name": "1", "value": 7.0}]
                }
            ]
        }"#;
        let request: MachineDataRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.machinedata.len(), 1);
        assert_eq!(request.machinedata[0].machine_name, "FANUC_T");
        assert_eq!(request.machinedata[0].tool_values[0].q_value, 2);
        assert_eq!(request.machinedata[0].custom_variables[0].name, "1");
    }

    #[test]
    fn run_response_serializes_with_the_documented_field_names() {
        let response = RunResponse {
            canal: HashMap::new(),
            message: vec!["ok".to_string()],
            success: true,
            has_errors: false,
            errors: vec![],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["hasErrors"], false);
    }
}
