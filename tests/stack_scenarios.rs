use stack3d::io::StackConfig;
use stack3d::sim::Factorization;
use stack3d::{
    Analysis, Channel, ConventionalHeatSink, Coolant, Die, Dimensions, Floorplan, Layer,
    Material, SimResult, StackChanges, StackDescription, ThermalData,
};
use std::sync::Arc;

const AMBIENT: f64 = 300.0;

/// Three-layer die on a 2x2 grid, heated uniformly from the bottom layer.
///
/// Without a heat sink every face of the block is adiabatic.
fn block_stack(material: Material, powers: &[f64]) -> StackDescription {
    let dims = Dimensions::new(2e-3, 2e-3, 1e-3, 1e-3).unwrap();
    let mut stack = StackDescription::new(dims);
    let m = stack.add_material(material).unwrap();
    let layers = (0..3)
        .map(|i| Layer::new(&format!("l{i}"), 100e-6, Arc::clone(&m)).unwrap())
        .collect();
    let die = Die::new("BLOCK", layers, 0).unwrap();
    stack.add_die(die).unwrap();

    let mut fp = Floorplan::new();
    fp.add_element(stack.dimensions(), "all", 0.0, 0.0, 2e-3, 2e-3)
        .unwrap();
    stack.push_die("block", "BLOCK", fp).unwrap();
    for &p in powers {
        stack.push_power_values("block", &[p]).unwrap();
    }
    stack
}

fn rc_stack(material: Material, htc: f64, powers: &[f64]) -> StackDescription {
    let mut stack = block_stack(material, powers);
    stack.set_heat_sink(ConventionalHeatSink::new(htc, AMBIENT));
    stack
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[test]
fn test_rc_block_follows_lumped_backward_euler() {
    let (k, vhc, htc, power, dt) = (1e4, 1.6e6, 1e3, 0.01, 0.05);
    let mut stack = rc_stack(Material::new("CONDUCTOR", k, vhc), htc, &[power; 10]);

    // Four cells of 1 mm x 1 mm x 100 um per layer.
    let area = 1e-6;
    let capacity = vhc * 12.0 * area * 100e-6;
    let top_half = k * area / 50e-6;
    let g_cell = top_half * (htc * area) / (top_half + htc * area);
    let conductance = 4.0 * g_cell;

    let analysis = Analysis::transient(dt, dt, AMBIENT).unwrap();
    let mut td = ThermalData::new(&stack, analysis).unwrap();
    td.fill_thermal_data(&stack, StackChanges::all()).unwrap();

    let mut lumped = AMBIENT;
    for step in 0..10 {
        assert_eq!(td.emulate_step(&mut stack).unwrap(), SimResult::SlotDone);
        lumped = (capacity / dt * lumped + power + conductance * AMBIENT)
            / (capacity / dt + conductance);
        let rise = mean(td.temperatures()) - AMBIENT;
        let expected = lumped - AMBIENT;
        assert!(
            (rise - expected).abs() < 1e-3 * expected,
            "step {step}: rise {rise} K, lumped {expected} K"
        );
    }
    assert_eq!(
        td.emulate_step(&mut stack).unwrap(),
        SimResult::EndOfSimulation
    );
    assert!((td.analysis().simulated_time() - 0.5).abs() < 1e-12);
}

#[test]
fn test_uniform_field_is_a_fixed_point() {
    // Coolant, heat sink and initial state all at the same temperature.
    let dims = Dimensions::with_microchannels(1e-3, 2.5e-4, 2, 1e-4, 1e-4, 1e-4, 1e-4).unwrap();
    let mut stack = StackDescription::new(dims);
    let si = stack.add_material(Material::silicon()).unwrap();
    let active = Layer::new("active", 50e-6, Arc::clone(&si)).unwrap();
    let die = Die::new("D", vec![active], 0).unwrap();
    stack.add_die(die).unwrap();
    let channel =
        Channel::microchannel_4rm("ch", 1e-4, Coolant::water(AMBIENT), 1e-7, Arc::clone(&si))
            .unwrap();
    stack.set_channel(channel).unwrap();
    stack.set_heat_sink(ConventionalHeatSink::new(1e4, AMBIENT));

    let mut fp = Floorplan::new();
    fp.add_element(stack.dimensions(), "idle", 0.0, 0.0, 5e-4, 1e-3)
        .unwrap();
    stack.push_die("bottom", "D", fp).unwrap();
    stack.push_channel("cavity").unwrap();
    stack.push_die("top", "D", Floorplan::new()).unwrap();
    for _ in 0..2 {
        stack.push_power_values("bottom", &[0.0]).unwrap();
    }

    let analysis = Analysis::transient(1e-3, 2e-3, AMBIENT).unwrap();
    let mut td = ThermalData::new(&stack, analysis).unwrap();
    td.fill_thermal_data(&stack, StackChanges::all()).unwrap();
    while td.emulate_slot(&mut stack).unwrap() != SimResult::EndOfSimulation {}

    assert_eq!(td.analysis().current_time(), 4);
    for (i, t) in td.temperatures().iter().enumerate() {
        assert!((t - AMBIENT).abs() < 1e-9, "cell {i} drifted to {t} K");
    }
}

#[test]
fn test_constant_power_heats_monotonically() {
    let mut stack = rc_stack(Material::silicon(), 1e4, &[0.5; 4]);
    let analysis = Analysis::transient(1e-3, 2e-3, AMBIENT).unwrap();
    let mut td = ThermalData::new(&stack, analysis).unwrap();
    td.fill_thermal_data(&stack, StackChanges::all()).unwrap();

    let mut previous = td.temperatures().to_vec();
    while td.emulate_step(&mut stack).unwrap() != SimResult::EndOfSimulation {
        for (i, (now, before)) in td.temperatures().iter().zip(&previous).enumerate() {
            assert!(now >= before, "cell {i} cooled from {before} to {now}");
        }
        previous = td.temperatures().to_vec();
    }
    let hottest = td
        .max_temperature_of_floorplan_element(&stack, "block", "all")
        .unwrap();
    assert!(hottest > AMBIENT);
}

#[test]
fn test_adiabatic_block_heats_without_bound() {
    let (vhc, power, dt) = (1.6e6, 0.5, 1e-3);
    let mut stack = block_stack(Material::new("CONDUCTOR", 150.0, vhc), &[power; 6]);
    let capacity = vhc * 2e-3 * 2e-3 * 300e-6;

    let analysis = Analysis::transient(dt, dt, AMBIENT).unwrap();
    let mut td = ThermalData::new(&stack, analysis).unwrap();
    td.fill_thermal_data(&stack, StackChanges::all()).unwrap();

    let mut previous = td.temperatures().to_vec();
    let mut steps = 0;
    while td.emulate_step(&mut stack).unwrap() != SimResult::EndOfSimulation {
        steps += 1;
        for (i, (now, before)) in td.temperatures().iter().zip(&previous).enumerate() {
            assert!(now > before, "step {steps}: cell {i} stalled at {now} K");
        }
        // Nothing leaves the block, so the stored energy grows linearly.
        let rise = mean(td.temperatures()) - AMBIENT;
        let expected = power * dt * steps as f64 / capacity;
        assert!(
            (rise - expected).abs() < 1e-9 * expected,
            "step {steps}: rise {rise} K, stored {expected} K"
        );
        previous = td.temperatures().to_vec();
    }
    assert_eq!(steps, 6);
}

#[test]
fn test_isolated_block_keeps_initial_temperature() {
    let initial = 325.0;
    let mut stack = block_stack(Material::silicon(), &[0.0; 3]);
    let analysis = Analysis::transient(1e-3, 1e-3, initial).unwrap();
    let mut td = ThermalData::new(&stack, analysis).unwrap();
    td.fill_thermal_data(&stack, StackChanges::all()).unwrap();

    let mut steps = 0;
    while td.emulate_step(&mut stack).unwrap() != SimResult::EndOfSimulation {
        steps += 1;
        for (i, t) in td.temperatures().iter().enumerate() {
            assert!(
                (t - initial).abs() < 1e-9,
                "step {steps}: cell {i} at {t} K"
            );
        }
    }
    assert_eq!(steps, 3);
}

#[test]
fn test_steady_state_matches_conductance_chain() {
    let (k, htc, power) = (1e4, 1e3, 0.01);
    let mut stack = rc_stack(Material::new("CONDUCTOR", k, 1.6e6), htc, &[power]);
    let mut td = ThermalData::new(&stack, Analysis::steady(AMBIENT)).unwrap();
    td.fill_thermal_data(&stack, StackChanges::all()).unwrap();
    assert_eq!(td.emulate_steady(&mut stack).unwrap(), SimResult::SlotDone);
    assert_eq!(td.factorization(), Factorization::Factored);

    // Per cell: two full layers of k*A/h in series, then the top half layer
    // and the film.
    let area = 1e-6;
    let r_cell = 2.0 * 100e-6 / (k * area) + 50e-6 / (k * area) + 1.0 / (htc * area);
    let expected = AMBIENT + power / 4.0 * r_cell;
    let bottom = td
        .avg_temperature_of_floorplan_element(&stack, "block", "all")
        .unwrap();
    assert!(
        (bottom - expected).abs() < 1e-9 * expected,
        "bottom layer at {bottom} K, expected {expected} K"
    );
    assert_eq!(
        td.emulate_steady(&mut stack).unwrap(),
        SimResult::EndOfSimulation
    );
}

#[test]
fn test_config_round_trip_through_simulation() {
    let json = r#"{
        "materials": [{ "id": "SI", "thermal_conductivity": 130.0, "volumetric_heat_capacity": 1.628e6 }],
        "dimensions": { "type": "uniform", "chip_length": 3e-3, "chip_width": 2e-3,
                        "cell_length": 1e-3, "cell_width": 1e-3 },
        "heat_sink": { "ambient_htc": 1e4, "ambient_temperature": 300.0 },
        "dies": [{ "id": "D", "layers": [
                    { "id": "bulk", "height": 1e-4, "material": "SI" },
                    { "id": "active", "height": 2e-5, "material": "SI" }],
                   "source_layer": 1 }],
        "stack": [
            { "type": "layer", "id": "substrate", "height": 1e-4, "material": "SI" },
            { "type": "die", "id": "die", "die": "D", "floorplan": [
                { "id": "left", "sw_x": 0.0, "sw_y": 0.0, "length": 1e-3, "width": 2e-3, "powers": [1.0, 0.0] },
                { "id": "right", "sw_x": 2e-3, "sw_y": 0.0, "length": 1e-3, "width": 2e-3, "powers": [0.0, 1.0] }] }
        ],
        "analysis": { "kind": { "type": "transient", "step_time": 1e-3, "slot_time": 5e-3 },
                      "initial_temperature": 300.0 }
    }"#;
    let (mut stack, analysis) = StackConfig::from_json_str(json).unwrap().build().unwrap();
    let mut td = ThermalData::new(&stack, analysis).unwrap();
    td.fill_thermal_data(&stack, StackChanges::all()).unwrap();

    assert_eq!(td.emulate_slot(&mut stack).unwrap(), SimResult::SlotDone);
    let first = td.all_max_temperatures_of_floorplan(&stack, "die").unwrap();
    assert!(first[0] > first[1]);

    assert_eq!(td.emulate_slot(&mut stack).unwrap(), SimResult::SlotDone);
    let mut map = Vec::new();
    td.print_thermal_map(&stack, "die", &mut map).unwrap();
    let map = String::from_utf8(map).unwrap();
    let rows: Vec<Vec<f64>> = map
        .lines()
        .map(|line| line.split(' ').map(|v| v.parse().unwrap()).collect())
        .collect();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.len() == 3));
    // Power moved to the right element during the second slot.
    assert!(rows[0][2] > rows[0][0], "{map}");

    assert_eq!(
        td.emulate_slot(&mut stack).unwrap(),
        SimResult::EndOfSimulation
    );
    assert_eq!(td.analysis().current_time(), 10);
}
