// Energy conservation: for an index-matched slab simulated with analog
// weighting, every photon ends in exactly one of {reflected, transmitted,
// absorbed}, so Rd + Atot + Td must equal 1 within statistical tolerance.

use tissuemc::detectors::standard_error;
use tissuemc::{
    AbsorptionWeighting, DetectorInput, MonteCarloSimulation, OpticalProperties, SimulationInput,
    SimulationOptions, SourceInput, TissueInput, TissueRegion, VirtualBoundaryGroup,
    VirtualBoundaryKind,
};

fn slab_layers(op: OpticalProperties, thickness: f64) -> Vec<TissueRegion> {
    vec![
        TissueRegion::Layer {
            z_start: f64::NEG_INFINITY,
            z_stop: 0.0,
            op: OpticalProperties::ambient(),
        },
        TissueRegion::Layer { z_start: 0.0, z_stop: thickness, op },
        TissueRegion::Layer {
            z_start: thickness,
            z_stop: f64::INFINITY,
            op: OpticalProperties::ambient(),
        },
    ]
}

fn conservation_input(tissue: TissueInput, n: u64) -> SimulationInput {
    SimulationInput {
        n,
        output_name: "conservation".to_string(),
        options: SimulationOptions {
            seed: 0,
            absorption_weighting: AbsorptionWeighting::Analog,
            track_statistics: true,
            ..Default::default()
        },
        source: SourceInput::directional_point([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        tissue,
        boundary_groups: vec![
            VirtualBoundaryGroup::new(
                VirtualBoundaryKind::DiffuseReflectance,
                vec![DetectorInput::RDiffuse { name: "Rd".to_string() }],
                "DiffuseReflectance",
            ),
            VirtualBoundaryGroup::new(
                VirtualBoundaryKind::DiffuseTransmittance,
                vec![DetectorInput::TDiffuse { name: "Td".to_string() }],
                "DiffuseTransmittance",
            ),
            VirtualBoundaryGroup::new(
                VirtualBoundaryKind::GenericVolume,
                vec![DetectorInput::ATotal { name: "Atot".to_string() }],
                "GenericVolume",
            ),
        ],
    }
}

#[test]
fn analog_index_matched_slab_conserves_energy() {
    let n = 5_000u64;
    // index matched (n = 1.0 everywhere), moderate absorber
    let op = OpticalProperties::new(0.01, 0.99, 0.8, 1.0);
    let input = conservation_input(TissueInput::multi_layer(slab_layers(op, 10.0)), n);
    let mut sim = MonteCarloSimulation::new(input).unwrap();
    let output = sim.run().unwrap();

    let rd = output.scalar("Rd").unwrap();
    let td = output.scalar("Td").unwrap();
    let atot = output.scalar("Atot").unwrap();
    let sum = rd + td + atot;

    // 3 sigma bound built from the tallied second moments
    let sd = standard_error(n, rd, output.scalar_second_moment("Rd").unwrap())
        + standard_error(n, td, output.scalar_second_moment("Td").unwrap())
        + standard_error(n, atot, output.scalar_second_moment("Atot").unwrap());
    assert!(
        (sum - 1.0).abs() <= 3.0 * sd + 1e-12,
        "Rd + Atot + Td = {sum}, outside 3 sigma = {sd}"
    );

    // analog: each photon carries weight 1 into exactly one tally
    assert!(rd > 0.0 && td > 0.0 && atot > 0.0);
    assert_eq!(
        output.statistics.exited_top + output.statistics.exited_bottom
            + output.statistics.absorbed
            + output.statistics.killed_path_length
            + output.statistics.killed_collisions,
        n
    );
}

#[test]
fn discrete_weighting_conserves_energy() {
    let n = 5_000u64;
    let op = OpticalProperties::new(0.05, 0.95, 0.8, 1.0);
    let mut input = conservation_input(TissueInput::multi_layer(slab_layers(op, 10.0)), n);
    input.options.absorption_weighting = AbsorptionWeighting::Discrete;
    let mut sim = MonteCarloSimulation::new(input).unwrap();
    let output = sim.run().unwrap();

    let sum = output.scalar("Rd").unwrap() + output.scalar("Td").unwrap()
        + output.scalar("Atot").unwrap();
    // weight bookkeeping is exact for DAW in an index-matched slab, up to
    // photons killed by the hard caps
    assert!((sum - 1.0).abs() < 5e-3, "Rd + Atot + Td = {sum}");
}

#[test]
fn inclusion_tissue_conserves_energy() {
    let n = 2_000u64;
    let op = OpticalProperties::new(0.01, 0.99, 0.8, 1.0);
    let mut inclusion_op = op;
    inclusion_op.mua = 0.5;
    let tissue = TissueInput::with_inclusion(
        slab_layers(op, 10.0),
        TissueRegion::Ellipsoid { center: [0.0, 0.0, 5.0], axes: [2.0, 2.0, 2.0], op: inclusion_op },
    );
    let input = conservation_input(tissue, n);
    let mut sim = MonteCarloSimulation::new(input).unwrap();
    let output = sim.run().unwrap();

    let rd = output.scalar("Rd").unwrap();
    let td = output.scalar("Td").unwrap();
    let atot = output.scalar("Atot").unwrap();
    let sum = rd + td + atot;
    let sd = standard_error(n, rd, output.scalar_second_moment("Rd").unwrap())
        + standard_error(n, td, output.scalar_second_moment("Td").unwrap())
        + standard_error(n, atot, output.scalar_second_moment("Atot").unwrap());
    assert!(
        (sum - 1.0).abs() <= 3.0 * sd + 1e-12,
        "Rd + Atot + Td = {sum}, outside 3 sigma = {sd}"
    );
    // the absorbing inclusion must show up in the absorption tally
    assert!(atot > 0.05, "inclusion absorption too small: {atot}");
}
