// Simulation driver: builds tissue, source, and detector controllers from
// a validated input bundle, launches N independent photons, and returns
// normalized detector outputs. Photons are fully self-contained, so the
// parallel path runs worker chunks with replica detector sets and reduces
// them elementwise afterwards.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::boundary::{VirtualBoundaryGroup, VirtualBoundaryKind};
use crate::controller::{DetectorController, HistoryDetectorController};
use crate::database::{CollisionInfoDatabaseWriter, PhotonDatabaseWriter, PhotonRecord};
use crate::detectors::{DetectorInstance, DetectorOutput};
use crate::error::{FactoryError, SimulationError};
use crate::input::SimulationInput;
use crate::optics::OpticalProperties;
use crate::output::{SimulationOutput, SimulationStatistics};
use crate::photon::{Photon, PhotonDataPoint, PhotonStatus, SubRegionInfo};
use crate::rng::PhotonRng;
use crate::source::Source;
use crate::tissue::Tissue;
use crate::transport::transport;

/// One virtual-boundary group with its live detectors.
struct RuntimeGroup {
    kind: VirtualBoundaryKind,
    name: String,
    write_to_database: bool,
    surface: DetectorController,
    history: HistoryDetectorController,
}

impl RuntimeGroup {
    fn outputs(&self) -> (Vec<DetectorOutput>, Vec<DetectorOutput>) {
        (self.surface.outputs(), self.history.outputs())
    }

    fn merge(&mut self, surface: &[DetectorOutput], history: &[DetectorOutput]) {
        self.surface.merge(surface);
        self.history.merge(history);
    }

    fn normalize(&mut self, num_photons: u64) {
        self.surface.normalize(num_photons);
        self.history.normalize(num_photons);
    }
}

fn build_groups(
    inputs: &[VirtualBoundaryGroup],
    tissue: &Tissue,
    input: &SimulationInput,
) -> Result<Vec<RuntimeGroup>, SimulationError> {
    let mut groups = Vec::with_capacity(inputs.len());
    for group in inputs {
        let mut surface = Vec::new();
        let mut history = Vec::new();
        for detector_input in &group.detectors {
            let instance = detector_input.build(
                tissue,
                input.options.absorption_weighting,
                input.options.tally_second_moment,
            )?;
            match instance {
                DetectorInstance::Surface(d) => surface.push(d),
                DetectorInstance::History(d) => history.push(d),
                DetectorInstance::Pmc(_) => {
                    return Err(FactoryError::MalformedInput {
                        tag: detector_input.name().to_string(),
                        reason: "pMC/dMC detectors run in post-processing, not live transport"
                            .to_string(),
                    }
                    .into())
                }
            }
        }
        groups.push(RuntimeGroup {
            kind: group.kind,
            name: group.name.clone(),
            write_to_database: group.write_to_database,
            surface: DetectorController::new(surface),
            history: HistoryDetectorController::new(history),
        });
    }
    Ok(groups)
}

/// The Monte Carlo simulation for one input bundle.
pub struct MonteCarloSimulation {
    input: SimulationInput,
    tissue: Tissue,
    ops: Vec<OpticalProperties>,
    source: Source,
    groups: Vec<RuntimeGroup>,
    database_dir: Option<PathBuf>,
}

impl MonteCarloSimulation {
    /// Validate the input and build all runtime pieces. Configuration
    /// errors surface here and block the run.
    pub fn new(input: SimulationInput) -> Result<Self, SimulationError> {
        input.validate()?;
        let tissue = input.tissue.build()?;
        let ops = tissue.optical_properties();
        let source = input.source.build()?;
        let groups = build_groups(&input.boundary_groups, &tissue, &input)?;
        Ok(Self { input, tissue, ops, source, groups, database_dir: None })
    }

    /// Enable database capture for groups flagged `write_to_database`,
    /// under the given directory.
    pub fn with_database_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.database_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Path of the photon database a group writes, if enabled.
    pub fn photon_database_path(dir: &Path, group_name: &str) -> PathBuf {
        dir.join(format!("{group_name}_photons.bin"))
    }

    /// Path of the collision-info database a group writes, if enabled.
    pub fn collision_database_path(dir: &Path, group_name: &str) -> PathBuf {
        dir.join(format!("{group_name}_collisions.bin"))
    }

    /// Run all photons sequentially and return the normalized outputs.
    pub fn run(&mut self) -> Result<SimulationOutput, SimulationError> {
        let n = self.input.n;
        info!(photons = n, name = %self.input.output_name, "monte carlo run");
        let mut statistics = SimulationStatistics::default();
        let mut writers = self.open_writers()?;

        for index in 0..n {
            let (photon, specular) = simulate_photon(
                &self.source,
                &self.tissue,
                &self.ops,
                &self.input,
                index,
            );
            statistics.record(photon.status.state);
            tally_photon(&mut self.groups, &photon, &specular, &self.ops, &self.tissue);
            for (group_index, photon_writer, collision_writer) in &mut writers {
                if self.groups[*group_index].kind.hit_by(&photon.terminal_point().status) {
                    photon_writer.append(&PhotonRecord::from_terminal_point(photon.terminal_point()))?;
                    collision_writer.append(&photon.sub_region_info)?;
                }
            }
        }

        self.close_writers(writers)?;
        Ok(self.finish(n, statistics))
    }

    /// Run all photons across rayon workers. Each worker chunk owns a
    /// replica detector set; replicas are reduced elementwise before
    /// normalization, so results are independent of the chunking.
    pub fn run_parallel(&mut self) -> Result<SimulationOutput, SimulationError> {
        let n = self.input.n;
        let workers = rayon::current_num_threads() as u64;
        let chunk = n.div_ceil(workers).max(1);
        info!(photons = n, workers, name = %self.input.output_name, "monte carlo run (parallel)");

        struct WorkerResult {
            outputs: Vec<(Vec<DetectorOutput>, Vec<DetectorOutput>)>,
            statistics: SimulationStatistics,
            records: Vec<(usize, PhotonRecord, Vec<SubRegionInfo>)>,
        }

        // the worker closure captures only Sync state; detector replicas
        // are built per chunk
        let input = &self.input;
        let tissue = &self.tissue;
        let ops = &self.ops;
        let source = &self.source;

        let results: Vec<Result<WorkerResult, SimulationError>> = (0..workers)
            .into_par_iter()
            .map(|worker| {
                let start = worker * chunk;
                let stop = ((worker + 1) * chunk).min(n);
                let mut groups = build_groups(&input.boundary_groups, tissue, input)?;
                let mut statistics = SimulationStatistics::default();
                let mut records = Vec::new();
                for index in start..stop {
                    let (photon, specular) = simulate_photon(source, tissue, ops, input, index);
                    statistics.record(photon.status.state);
                    tally_photon(&mut groups, &photon, &specular, ops, tissue);
                    for (group_index, group) in groups.iter().enumerate() {
                        if group.write_to_database
                            && group.kind.hit_by(&photon.terminal_point().status)
                        {
                            records.push((
                                group_index,
                                PhotonRecord::from_terminal_point(photon.terminal_point()),
                                photon.sub_region_info.clone(),
                            ));
                        }
                    }
                }
                Ok(WorkerResult {
                    outputs: groups.iter().map(|g| g.outputs()).collect(),
                    statistics,
                    records,
                })
            })
            .collect();

        let mut statistics = SimulationStatistics::default();
        let mut writers = self.open_writers()?;
        for result in results {
            let result = result?;
            statistics.merge(&result.statistics);
            for (group, (surface, history)) in self.groups.iter_mut().zip(&result.outputs) {
                group.merge(surface, history);
            }
            // single-writer funnel; record order across workers is
            // irrelevant to pMC, every record is self-contained
            for (group_index, record, info) in &result.records {
                for (writer_group, photon_writer, collision_writer) in &mut writers {
                    if writer_group == group_index {
                        photon_writer.append(record)?;
                        collision_writer.append(info)?;
                    }
                }
            }
        }

        self.close_writers(writers)?;
        Ok(self.finish(n, statistics))
    }

    fn open_writers(
        &self,
    ) -> Result<Vec<(usize, PhotonDatabaseWriter, CollisionInfoDatabaseWriter)>, SimulationError>
    {
        let Some(dir) = &self.database_dir else { return Ok(Vec::new()) };
        std::fs::create_dir_all(dir).map_err(crate::error::DatabaseError::Io)?;
        let mut writers = Vec::new();
        for (index, group) in self.groups.iter().enumerate() {
            if !group.write_to_database {
                continue;
            }
            let photon_writer =
                PhotonDatabaseWriter::create(Self::photon_database_path(dir, &group.name))?;
            let collision_writer = CollisionInfoDatabaseWriter::create(
                Self::collision_database_path(dir, &group.name),
                self.tissue.region_count(),
            )?;
            writers.push((index, photon_writer, collision_writer));
        }
        Ok(writers)
    }

    fn close_writers(
        &self,
        writers: Vec<(usize, PhotonDatabaseWriter, CollisionInfoDatabaseWriter)>,
    ) -> Result<(), SimulationError> {
        for (_, photon_writer, collision_writer) in writers {
            photon_writer.finish()?;
            collision_writer.finish()?;
        }
        Ok(())
    }

    fn finish(&mut self, num_photons: u64, statistics: SimulationStatistics) -> SimulationOutput {
        for group in &mut self.groups {
            group.normalize(num_photons);
        }
        let mut output = SimulationOutput::new(self.input.output_name.clone(), num_photons);
        if self.input.options.track_statistics {
            output.statistics = statistics;
        }
        for group in &self.groups {
            let (surface, history) = group.outputs();
            for detector in surface.into_iter().chain(history) {
                debug!(group = %group.name, detector = %detector.name, "collected");
                output.insert(detector);
            }
        }
        output
    }
}

/// Launch and transport photon `index`, returning it together with the
/// synthetic specular data point its launch produced.
fn simulate_photon(
    source: &Source,
    tissue: &Tissue,
    ops: &[OpticalProperties],
    input: &SimulationInput,
    index: u64,
) -> (Photon, PhotonDataPoint) {
    let rng = PhotonRng::stream_for_photon(input.options.seed, index);
    let mut photon = source.launch(tissue, rng);
    let launch = photon.history.points()[0].clone();
    let specular = PhotonDataPoint {
        weight: 1.0 - launch.weight,
        status: PhotonStatus::in_flight(),
        ..launch
    };
    transport(&mut photon, tissue, ops, &input.options);
    (photon, specular)
}

fn tally_photon(
    groups: &mut [RuntimeGroup],
    photon: &Photon,
    specular: &PhotonDataPoint,
    ops: &[OpticalProperties],
    tissue: &Tissue,
) {
    for group in groups.iter_mut() {
        match group.kind {
            VirtualBoundaryKind::SpecularReflectance => {
                group.surface.tally(specular, ops);
            }
            VirtualBoundaryKind::GenericVolume => {
                group.history.tally(&photon.history, tissue);
            }
            VirtualBoundaryKind::SurfaceRadiance => {
                for point in photon.history.points() {
                    if group.kind.hit_by(&point.status) {
                        group.surface.tally(point, ops);
                    }
                }
            }
            _ => {
                let dp = photon.terminal_point();
                if group.kind.hit_by(&dp.status) {
                    group.surface.tally(dp, ops);
                }
            }
        }
    }
}
