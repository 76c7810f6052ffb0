// Normalization contract: bins are divided by (photon count x bin
// measure), with radial bins measured as annulus areas. Shifting an axis
// start while holding the bin width fixed must rescale the mean by the
// analytic area ratio.

use tissuemc::detectors::{Detector, ROfRhoDetector, SurfaceDetector};
use tissuemc::photon::{BoundaryCrossing, PhotonDataPoint, PhotonState, PhotonStatus};
use tissuemc::DoubleRange;

fn exit_point(x: f64, weight: f64) -> PhotonDataPoint {
    PhotonDataPoint {
        position: [x, 0.0, 0.0],
        direction: [0.0, 0.0, -1.0],
        weight,
        status: PhotonStatus {
            state: PhotonState::ExitedTop,
            crossing: Some(BoundaryCrossing::TopSurface),
        },
        sub_region_info: Vec::new(),
    }
}

#[test]
fn axis_start_offset_rescales_mean_by_annulus_ratio() {
    // both axes have bin width 0.1; the offset detector's first bin is the
    // annulus centered at 5.05 instead of 0.05
    let at_origin = DoubleRange::new(0.0, 10.0, 101);
    let offset = DoubleRange::new(5.0, 15.0, 101);
    let mut near = ROfRhoDetector::new("near", at_origin, false);
    let mut far = ROfRhoDetector::new("far", offset, false);

    // same weight lands in bin 0 of each detector
    near.tally(&exit_point(0.05, 1.0), &[]);
    far.tally(&exit_point(5.05, 1.0), &[]);
    near.normalize(100);
    far.normalize(100);

    let near_mean = near.output().data.as_real().unwrap()[0];
    let far_mean = far.output().data.as_real().unwrap()[0];
    let ratio = near_mean / far_mean;
    let expected = 5.05 / 0.05;
    assert!(
        (ratio - expected).abs() / expected < 1e-12,
        "area ratio {ratio} != expected {expected}"
    );
}

#[test]
fn below_start_values_degrade_to_bin_zero() {
    let offset = DoubleRange::new(5.0, 15.0, 101);
    let mut detector = ROfRhoDetector::new("far", offset, false);
    // exit at rho = 1, well below the axis start
    detector.tally(&exit_point(1.0, 0.5), &[]);
    let out = detector.output();
    assert_eq!(out.tally_count, 1);
    assert_eq!(out.data.as_real().unwrap()[0], 0.5);
}

#[test]
fn second_moment_normalizes_by_squared_factor() {
    let rho = DoubleRange::new(0.0, 10.0, 101);
    let mut detector = ROfRhoDetector::new("R_r", rho, true);
    detector.tally(&exit_point(0.05, 1.0), &[]);
    detector.normalize(100);
    let out = detector.output();
    let mean = out.data.as_real().unwrap()[0];
    let sm = out.second_moment.as_ref().unwrap().as_real().unwrap()[0];
    let area = 2.0 * std::f64::consts::PI * 0.05 * 0.1;
    assert!((mean - 1.0 / (area * 100.0)).abs() < 1e-12);
    assert!((sm - 1.0 / (area * area * 100.0)).abs() < 1e-9);
}
