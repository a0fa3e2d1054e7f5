//! Headless golden-hash driver.
//!
//! A [`HeadlessRun`] names one stepper and how to seed it, runs it for a
//! fixed number of ticks with no host loop attached, and records one content
//! hash per tick. The same run file always yields the same hash sequence, so
//! recorded sequences serve as golden fixtures.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use substrate_automaton::{InitOptions, Initializer, Rule110Options, Rule110Stepper};
use substrate_core::config::SubstrateConfig;
use substrate_core::context::{AgentRecord, TickInput};
use substrate_core::hash::{hash_cells, hash_serialized};
use substrate_core::scheduler::{Scheduler, SchedulerConfig};
use substrate_core::snapshot::{Metadata, Provenance};
use substrate_core::stepper::Stepper;
use substrate_core::storage::ChunkStore;
use substrate_genome::{
    GenomeOptions, GenomeStepper, ProgramDescriptor, ProgramInitializer, ProgramLimits, RandomOptions, RawInstruction,
    preset,
};
use substrate_tape::{MachineDescription, MachineRegistry, RegisterOptions, TapeOptions, TapeStepper};
use tracing::{debug, info};

use crate::error::HostError;

/// Machine run when a tape run names none.
pub const DEFAULT_MACHINE: &str = "unary_incrementer";

/// Which stepper a run drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepperKind {
    /// Rule 110 automaton.
    #[default]
    Rule110,
    /// Genome VM.
    Genome,
    /// Tape machine.
    Tape,
}

impl StepperKind {
    /// Lowercase name, also used for the default output file.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rule110 => "rule110",
            Self::Genome => "genome",
            Self::Tape => "tape",
        }
    }
}

impl fmt::Display for StepperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule 110 section of a run file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Rule110Run {
    /// Number of cells.
    pub width: usize,
    /// Initializer name (`ether`, `glider`, `random`).
    pub initializer: String,
    /// Initializer parameters.
    pub options: InitOptions,
}

impl Default for Rule110Run {
    fn default() -> Self {
        Self {
            width: 128,
            initializer: "ether".to_owned(),
            options: InitOptions::default(),
        }
    }
}

/// Genome section of a run file. The program comes from `program` if set,
/// else from `preset`, else from `initializer`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenomeRun {
    /// Inline raw program.
    pub program: Option<Vec<RawInstruction>>,
    /// Preset key.
    pub preset: Option<String>,
    /// Program initializer name (`empty`, `random`).
    pub initializer: String,
    /// Random initializer parameters.
    pub random: RandomOptions,
    /// Starting chi, which fixes the chi threshold ceiling. Unset means
    /// `simulation.start_chi` of the substrate config.
    pub start_chi: Option<f64>,
    /// Agent record fed to every tick.
    pub agent: AgentRecord,
}

impl Default for GenomeRun {
    fn default() -> Self {
        Self {
            program: None,
            preset: None,
            initializer: "empty".to_owned(),
            random: RandomOptions::default(),
            start_chi: None,
            agent: AgentRecord::default(),
        }
    }
}

impl GenomeRun {
    fn descriptor(&self, random: &RandomOptions, limits: ProgramLimits) -> Result<ProgramDescriptor, HostError> {
        if let Some(program) = &self.program {
            return Ok(ProgramDescriptor {
                program: program.clone(),
                provenance: Provenance::with_origin("inline"),
            });
        }
        if let Some(name) = &self.preset {
            return preset(name).ok_or_else(|| HostError::UnknownPreset { name: name.clone() });
        }
        Ok(ProgramInitializer::resolve(&self.initializer).build(random, limits))
    }
}

/// Tape section of a run file. An inline `machine` or a `machine_file` is
/// registered over the bundled machines; `machine_id` picks what runs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TapeRun {
    /// JSON machine description file.
    pub machine_file: Option<PathBuf>,
    /// Inline machine description.
    pub machine: Option<MachineDescription>,
    /// Machine to run; defaults to the last one registered above, then to
    /// the unary incrementer.
    pub machine_id: Option<String>,
    /// Cells per chunk.
    pub chunk_size: usize,
    /// Chunks kept on each side of the head.
    pub window_radius: u32,
    /// Symbols written from position 0.
    pub initial_tape: Vec<u8>,
}

impl Default for TapeRun {
    fn default() -> Self {
        Self {
            machine_file: None,
            machine: None,
            machine_id: None,
            chunk_size: substrate_tape::stepper::DEFAULT_CHUNK_SIZE,
            window_radius: substrate_tape::stepper::DEFAULT_WINDOW_RADIUS,
            initial_tape: Vec::new(),
        }
    }
}

/// A headless run, usually loaded from `substrate-run.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeadlessRun {
    /// Stepper to drive.
    pub stepper: StepperKind,
    /// Number of ticks.
    pub steps: u64,
    /// Scheduler base seed.
    pub base_seed: u32,
    /// Replace random initializer seeds with seeds derived from
    /// `base_seed`.
    pub derive_seeds: bool,
    /// Output file; defaults to `tc/<stepper>.ndjson`.
    pub output: Option<PathBuf>,
    /// Rule 110 settings.
    pub rule110: Rule110Run,
    /// Genome settings.
    pub genome: GenomeRun,
    /// Tape settings.
    pub tape: TapeRun,
}

impl Default for HeadlessRun {
    fn default() -> Self {
        Self {
            stepper: StepperKind::default(),
            steps: 128,
            base_seed: 0,
            derive_seeds: false,
            output: None,
            rule110: Rule110Run::default(),
            genome: GenomeRun::default(),
            tape: TapeRun::default(),
        }
    }
}

/// Hash of one tick's committed state, with the provenance of the run that
/// produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashRecord {
    /// Tick index.
    pub tick: u64,
    /// Lowercase hex SHA-256.
    pub hash: String,
    /// Automaton width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<usize>,
    /// Automaton initializer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<String>,
    /// Automaton initializer parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    /// Origin tag of the stepper's state.
    #[serde(default)]
    pub origin: Option<String>,
    /// Stepper metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Preset manifest key (genome runs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_key: Option<String>,
    /// Machine that ran (tape runs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
}

impl HashRecord {
    fn at(&self, tick: u64, hash: String) -> Self {
        Self {
            tick,
            hash,
            ..self.clone()
        }
    }
}

impl HeadlessRun {
    /// Parse a run from YAML. Missing fields take their defaults and an
    /// empty document is the default run.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::RunFile`] if the YAML does not describe a run.
    pub fn parse(yaml: &str) -> Result<Self, HostError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Load a run file.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Io`] if the file cannot be read, or
    /// [`HostError::RunFile`] if it is not a valid run.
    pub fn from_file(path: &Path) -> Result<Self, HostError> {
        let text = std::fs::read_to_string(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Load `path` if it exists, otherwise the default run.
    pub fn load_or_default(path: &Path) -> Result<Self, HostError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            info!(path = %path.display(), "run file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Where records are written.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("tc/{}.ndjson", self.stepper)))
    }

    /// Run every tick against the default substrate config and return one
    /// record per tick.
    ///
    /// # Errors
    ///
    /// See [`HeadlessRun::run_with_config`].
    pub fn run(&self) -> Result<Vec<HashRecord>, HostError> {
        self.run_with_config(&SubstrateConfig::default())
    }

    /// Run every tick and return one record per tick. Settings the run file
    /// leaves open come from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownPreset`] or a tape error if the stepper
    /// cannot be set up, or [`HostError::Json`] if a snapshot does not
    /// serialize.
    pub fn run_with_config(&self, config: &SubstrateConfig) -> Result<Vec<HashRecord>, HostError> {
        let mut scheduler = Scheduler::with_config(SchedulerConfig {
            enabled: true,
            base_seed: self.base_seed,
        });
        let mut store = ChunkStore::new();
        info!(stepper = %self.stepper, steps = self.steps, base_seed = self.base_seed, "headless run starting");
        let records = match self.stepper {
            StepperKind::Rule110 => self.run_rule110(&mut scheduler, &mut store),
            StepperKind::Genome => self.run_genome(&mut scheduler, &mut store, config)?,
            StepperKind::Tape => self.run_tape(&mut scheduler, &mut store)?,
        };
        info!(stepper = %self.stepper, records = records.len(), "headless run finished");
        Ok(records)
    }

    fn capacity(&self) -> usize {
        usize::try_from(self.steps).unwrap_or_default()
    }

    fn run_rule110(&self, scheduler: &mut Scheduler, store: &mut ChunkStore) -> Vec<HashRecord> {
        let mut init = self.rule110.options;
        if self.derive_seeds {
            init.seed = scheduler.derive_seed("rule110.random");
        }
        let options = Rule110Options {
            initializer: Initializer::resolve(&self.rule110.initializer),
            init,
            ..Rule110Options::with_width(self.rule110.width)
        };
        let registration = Rule110Stepper::register(scheduler, store, options);
        let template = {
            let stepper = registration.stepper.borrow();
            HashRecord {
                width: Some(stepper.width()),
                initializer: Some(self.rule110.initializer.clone()),
                options: serde_json::to_value(init).ok(),
                origin: stepper.origin().map(str::to_owned),
                metadata: stepper.metadata(),
                ..HashRecord::default()
            }
        };

        let mut records = Vec::with_capacity(self.capacity());
        for tick in 0..self.steps {
            scheduler.run_tick(TickInput::new(tick), store);
            let cells = registration.stepper.borrow().state(store);
            records.push(template.at(tick, hash_cells(&cells)));
        }
        records
    }

    fn run_genome(
        &self,
        scheduler: &mut Scheduler,
        store: &mut ChunkStore,
        config: &SubstrateConfig,
    ) -> Result<Vec<HashRecord>, HostError> {
        let limits = self
            .genome
            .start_chi
            .map_or_else(|| ProgramLimits::from_config(config), ProgramLimits::from_start_chi);
        let mut random = self.genome.random;
        if self.derive_seeds {
            random.seed = scheduler.derive_seed("genome.random");
        }
        let options = GenomeOptions {
            limits,
            ..GenomeOptions::with_source(self.genome.descriptor(&random, limits)?)
        };
        let registration = GenomeStepper::register(scheduler, store, options);
        let template = {
            let stepper = registration.stepper.borrow();
            HashRecord {
                origin: stepper.origin().map(str::to_owned),
                metadata: stepper.metadata().clone(),
                manifest_key: stepper.manifest_key().map(str::to_owned),
                ..HashRecord::default()
            }
        };
        let mut agent = self.genome.agent.clone();

        let mut records = Vec::with_capacity(self.capacity());
        for tick in 0..self.steps {
            scheduler.run_tick(TickInput::new(tick).with_agent(&mut agent), store);
            let snapshot = registration.stepper.borrow().build_snapshot(store, tick);
            let hash = hash_serialized(&snapshot)?;
            debug!(tick, ip = snapshot.ip, halted = snapshot.halted, "genome tick hashed");
            records.push(template.at(tick, hash));
        }
        Ok(records)
    }

    fn run_tape(&self, scheduler: &mut Scheduler, store: &mut ChunkStore) -> Result<Vec<HashRecord>, HostError> {
        let mut registry = MachineRegistry::with_bundled()?;
        let mut registered = None;
        if let Some(path) = &self.tape.machine_file {
            let machine = registry.register_file(path, RegisterOptions::overwrite())?;
            registered = Some(machine.id().to_owned());
        }
        if let Some(description) = &self.tape.machine {
            let machine = registry.register(description.clone(), Some("inline"), RegisterOptions::overwrite())?;
            registered = Some(machine.id().to_owned());
        }
        let machine_id = self
            .tape
            .machine_id
            .clone()
            .or(registered)
            .unwrap_or_else(|| DEFAULT_MACHINE.to_owned());

        let options = TapeOptions {
            chunk_size: self.tape.chunk_size,
            window_radius: self.tape.window_radius,
            initial_tape: self.tape.initial_tape.clone(),
            ..TapeOptions::for_machine(machine_id)
        };
        let registration = TapeStepper::register(scheduler, store, &registry, options)?;
        let template = {
            let stepper = registration.stepper.borrow();
            HashRecord {
                origin: stepper.origin().map(str::to_owned),
                metadata: stepper.metadata().clone(),
                machine_id: Some(stepper.machine().id().to_owned()),
                ..HashRecord::default()
            }
        };

        let mut records = Vec::with_capacity(self.capacity());
        for tick in 0..self.steps {
            scheduler.run_tick(TickInput::new(tick), store);
            let snapshot = registration.stepper.borrow().build_snapshot(store, tick);
            records.push(template.at(tick, hash_serialized(&snapshot)?));
        }
        Ok(records)
    }
}

/// Write `records` as newline-delimited JSON, creating parent directories.
pub fn write_ndjson(path: &Path, records: &[HashRecord]) -> Result<(), HostError> {
    let io_error = |source| HostError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    std::fs::write(path, out).map_err(io_error)?;
    info!(path = %path.display(), records = records.len(), "hash records written");
    Ok(())
}
