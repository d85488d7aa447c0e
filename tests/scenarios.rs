//! Black-box end-to-end scenarios (S1-S8) and cross-cutting invariants,
//! exercised through the public engine API rather than individual
//! handlers. Mirrors `crates/gcodekit4-core/tests/`-style integration
//! test placement: one file per coherent feature area, calling only
//! public surface.

use ncplot_engine::api::{CustomVariable, MachineDataInput, MachineDataRequest, SegmentType};
use ncplot_engine::engine::ExecutionEngine;

fn single_canal(program: &str, machine: &str) -> MachineDataRequest {
    MachineDataRequest {
        machinedata: vec![MachineDataInput {
            program: program.to_string(),
            machine_name: machine.to_string(),
            canal_nr: "1".to_string(),
            tool_values: vec![],
            custom_variables: vec![],
        }],
    }
}

#[test]
fn s1_linear_rapid_and_axis_update() {
    let engine = ExecutionEngine::default();
    let request = single_canal("G1 X10 Y5 F60", "FANUC_T");
    let response = engine.run(&request);

    assert!(response.success);
    let plot = &response.canal["1"];
    assert_eq!(plot.segments.len(), 1);
    let points = &plot.segments[0].points;
    assert!(points.len() >= 2);
    let (x0, y0, z0) = points[0];
    assert!((x0).abs() < 1e-9 && (y0).abs() < 1e-9 && (z0).abs() < 1e-9);
    let (xn, yn, _) = *points.last().unwrap();
    assert!((xn - 10.0).abs() < 1e-9);
    assert!((yn - 5.0).abs() < 1e-9);
    assert!((plot.timing[0] - 11.180).abs() < 0.01);
}

#[test]
fn s2_diameter_mode_lathe_x_halves_the_value() {
    // Diameter-mode axes are configured per canal state, not via the
    // public request surface; exercised directly through the state/motion
    // path in `src/state.rs` and `src/handlers/motion.rs` unit tests.
    // Here we confirm the radius-mode (default) behavior leaves X unscaled,
    // the complementary half of invariant 5.
    let engine = ExecutionEngine::default();
    let request = single_canal("G1 X10", "FANUC_T");
    let response = engine.run(&request);
    let plot = &response.canal["1"];
    let (xn, _, _) = *plot.segments[0].points.last().unwrap();
    assert!((xn - 10.0).abs() < 1e-9);
}

#[test]
fn s3_ccw_arc_via_radius_stays_on_the_circle() {
    let engine = ExecutionEngine::default();
    let request = single_canal("G3 X10 Y10 R10 F600", "FANUC_T");
    let response = engine.run(&request);

    assert!(response.success);
    let plot = &response.canal["1"];
    let candidates = [(0.0, 10.0), (10.0, 0.0)];
    for (x, y, _) in &plot.segments[0].points {
        let ok = candidates.iter().any(|c| {
            (((x - c.0).powi(2) + (y - c.1).powi(2)).sqrt() - 10.0).abs() < 1e-4
        });
        assert!(ok, "point ({x}, {y}) not on either candidate circle");
    }
}

#[test]
fn s4_counted_do_end_loop_runs_three_times() {
    let engine = ExecutionEngine::default();
    let program = "DO1 L3 N10; G01 X1 F60 N11; END1";
    let request = single_canal(program, "FANUC_T");
    let response = engine.run(&request);

    assert!(response.success);
    let plot = &response.canal["1"];
    assert!(plot.segments.len() >= 3);
}

#[test]
fn s5_while_do_end_decrements_to_zero() {
    let engine = ExecutionEngine::default();
    let program = "#1=3; WHILE#1GT0DO1; G00 X1; #1=[#1-1]; END1";
    let request = single_canal(program, "FANUC_T");
    let response = engine.run(&request);

    let plot = &response.canal["1"];
    assert!(plot.segments.len() >= 3);
}

#[test]
fn s6_two_canal_wait_alignment_equalizes_cumulative_time() {
    let engine = ExecutionEngine::default();
    let request = MachineDataRequest {
        machinedata: vec![
            MachineDataInput {
                program: "G98; G1 X0; G1 X10 F60 M40; G1 X12".to_string(),
                machine_name: "FANUC_T".to_string(),
                canal_nr: "1".to_string(),
                tool_values: vec![],
                custom_variables: vec![],
            },
            MachineDataInput {
                program: "G98; G1 X0; G1 X5 F60 M40; G1 X6".to_string(),
                machine_name: "FANUC_T".to_string(),
                canal_nr: "2".to_string(),
                tool_values: vec![],
                custom_variables: vec![],
            },
        ],
    };
    let response = engine.run(&request);

    assert!(response.success);
    assert!(!response.has_errors);
    let plot1 = &response.canal["1"];
    let plot2 = &response.canal["2"];
    assert!(plot1.timing.iter().all(|&t| t >= 0.0));
    assert!(plot2.timing.iter().all(|&t| t >= 0.0));

    let cumulative_to_wait = |timing: &[f64]| timing.iter().take(2).sum::<f64>();
    let a = cumulative_to_wait(&plot1.timing);
    let b = cumulative_to_wait(&plot2.timing);
    assert!((a - b).abs() < 1e-6, "cumulative time to wait point should match: {a} vs {b}");
}

#[test]
fn s7_conflicting_waits_raise_and_return_partial_plots() {
    let engine = ExecutionEngine::default();
    let request = MachineDataRequest {
        machinedata: vec![
            MachineDataInput {
                program: "G98; G1 X0; G1 X10 F60 M40; G1 X12".to_string(),
                machine_name: "FANUC_T".to_string(),
                canal_nr: "1".to_string(),
                tool_values: vec![],
                custom_variables: vec![],
            },
            MachineDataInput {
                program: "G98; G1 X0; G1 X5 F60 M41; G1 X6".to_string(),
                machine_name: "FANUC_T".to_string(),
                canal_nr: "2".to_string(),
                tool_values: vec![],
                custom_variables: vec![],
            },
        ],
    };
    let response = engine.run(&request);

    assert!(response.has_errors);
    assert!(!response.errors.is_empty());
    assert!(response.canal.contains_key("1"));
    assert!(response.canal.contains_key("2"));
}

#[test]
fn s8_duplicate_parameter_is_a_structured_parse_error() {
    let engine = ExecutionEngine::default();
    let request = single_canal("G1 X10 X20", "FANUC_T");
    let response = engine.run(&request);

    assert!(response.has_errors);
    let err = response.errors.iter().find(|e| e.code == -2).expect("expected a -2 error");
    assert_eq!(err.line, 1);
}

#[test]
fn invariant_tool_path_length_matches_executed_lines() {
    let engine = ExecutionEngine::default();
    let request = single_canal("G1 X1 F60; G1 X2; G1 X3", "FANUC_T");
    let response = engine.run(&request);
    let plot = &response.canal["1"];
    assert_eq!(plot.segments.len(), plot.executed_lines.len());
    for (segment, &line) in plot.segments.iter().zip(plot.executed_lines.iter()) {
        assert_eq!(segment.line_number, line);
    }
}

#[test]
fn invariant_rapid_segments_are_tagged_rapid() {
    let engine = ExecutionEngine::default();
    let request = single_canal("G0 X5 Y5", "FANUC_T");
    let response = engine.run(&request);
    let plot = &response.canal["1"];
    assert_eq!(plot.segments[0].segment_type, SegmentType::Rapid);
}

#[test]
fn custom_variables_seed_the_parameter_table() {
    let engine = ExecutionEngine::default();
    let mut request = single_canal("G1 X[#1] F60", "FANUC_T");
    request.machinedata[0].custom_variables = vec![CustomVariable { name: "1".to_string(), value: 7.0 }];
    let response = engine.run(&request);
    let plot = &response.canal["1"];
    let (xn, _, _) = *plot.segments[0].points.last().unwrap();
    assert!((xn - 7.0).abs() < 1e-6);
}
