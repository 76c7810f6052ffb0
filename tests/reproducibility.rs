// Determinism: two independent runs with the same seed must reproduce
// R(rho) exactly; a different seed must not.

use tissuemc::{
    DetectorInput, DoubleRange, MonteCarloSimulation, OpticalProperties, SimulationInput,
    SimulationOptions, SourceInput, TissueInput, TissueRegion, VirtualBoundaryGroup,
    VirtualBoundaryKind,
};

fn benchmark_input(seed: u64) -> SimulationInput {
    // directional point source on a single tissue slab between
    // semi-infinite ambient layers: mua = 0.01, mus' = 1.0 (g = 0.8,
    // so mus = 5.0), n = 1.4
    SimulationInput {
        n: 100,
        output_name: "benchmark".to_string(),
        options: SimulationOptions { seed, ..Default::default() },
        source: SourceInput::directional_point([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        tissue: TissueInput::multi_layer(vec![
            TissueRegion::Layer {
                z_start: f64::NEG_INFINITY,
                z_stop: 0.0,
                op: OpticalProperties::ambient(),
            },
            TissueRegion::Layer {
                z_start: 0.0,
                z_stop: 20.0,
                op: OpticalProperties::new(0.01, 5.0, 0.8, 1.4),
            },
            TissueRegion::Layer {
                z_start: 20.0,
                z_stop: f64::INFINITY,
                op: OpticalProperties::ambient(),
            },
        ]),
        boundary_groups: vec![VirtualBoundaryGroup::new(
            VirtualBoundaryKind::DiffuseReflectance,
            vec![DetectorInput::ROfRho {
                name: "R_r".to_string(),
                rho: DoubleRange::new(0.0, 10.0, 101),
            }],
            "DiffuseReflectance",
        )],
    }
}

fn r_of_rho(seed: u64) -> Vec<f64> {
    let mut sim = MonteCarloSimulation::new(benchmark_input(seed)).unwrap();
    let output = sim.run().unwrap();
    output.detector("R_r").unwrap().data.as_real().unwrap().to_vec()
}

#[test]
fn same_seed_reproduces_r_of_rho() {
    let first = r_of_rho(0);
    let second = r_of_rho(0);
    for (i, (a, b)) in first.iter().zip(&second).enumerate() {
        assert!(
            (a - b).abs() < 1e-11,
            "R(rho) bin {i} differs between same-seed runs: {a} vs {b}"
        );
    }
    // near-axis bins collect most of the reflectance for this geometry
    let near_axis: f64 = first[..10].iter().sum();
    assert!(near_axis > 0.0, "no near-axis reflectance; not a useful benchmark");
}

#[test]
fn different_seed_changes_r_of_rho() {
    let first = r_of_rho(0);
    let second = r_of_rho(123);
    assert_ne!(first, second, "different seeds produced identical R(rho)");
}

#[test]
fn rerun_of_same_simulation_object_is_not_needed_for_determinism() {
    // building a fresh simulation from an equal input is enough
    let input_a = benchmark_input(7);
    let input_b = benchmark_input(7);
    assert_eq!(input_a, input_b);
    let mut sim_a = MonteCarloSimulation::new(input_a).unwrap();
    let mut sim_b = MonteCarloSimulation::new(input_b).unwrap();
    let out_a = sim_a.run().unwrap();
    let out_b = sim_b.run().unwrap();
    assert_eq!(
        out_a.detector("R_r").unwrap().data,
        out_b.detector("R_r").unwrap().data
    );
}
