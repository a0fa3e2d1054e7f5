//! Golden hash sequences for the automaton and tape steppers, checked
//! through the headless driver and the runtime manager.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use serde::Deserialize;
use substrate_core::config::{RuntimeMode, SubstrateConfig};
use substrate_core::context::TickInput;
use substrate_core::hash::hash_cells;
use substrate_host::headless::{Rule110Run, TapeRun};
use substrate_host::{HeadlessRun, RuntimeManager, StepperKind};

const RULE110: &str = include_str!("fixtures/rule110-hashes.json");
const TAPE: &str = include_str!("fixtures/tape-unary-incrementer-hashes.json");

#[derive(Deserialize)]
struct Rule110Fixture {
    cases: Vec<Rule110Case>,
}

#[derive(Deserialize)]
struct Rule110Case {
    name: String,
    steps: u64,
    #[serde(flatten)]
    run: Rule110Run,
    hashes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TapeFixture {
    machine_id: String,
    chunk_size: usize,
    window_radius: u32,
    initial_tape: Vec<u8>,
    steps: u64,
    hashes: Vec<String>,
}

fn hashes_of(run: &HeadlessRun) -> Vec<String> {
    run.run().unwrap().into_iter().map(|record| record.hash).collect()
}

#[test]
fn rule110_cases_match_golden_hashes() {
    let fixture: Rule110Fixture = serde_json::from_str(RULE110).unwrap();
    assert_eq!(fixture.cases.len(), 3);
    for case in fixture.cases {
        let run = HeadlessRun {
            stepper: StepperKind::Rule110,
            steps: case.steps,
            rule110: case.run,
            ..HeadlessRun::default()
        };
        assert_eq!(hashes_of(&run), case.hashes, "case {}", case.name);
    }
}

#[test]
fn runtime_frames_reproduce_the_ether_sequence() {
    let fixture: Rule110Fixture = serde_json::from_str(RULE110).unwrap();
    let ether = fixture.cases.iter().find(|case| case.name == "ether-128").unwrap();

    let mut config = SubstrateConfig::default();
    config.scheduler.enabled = true;
    config.runtime.mode = RuntimeMode::Rule110;
    config.rule110.width = 128;
    let mut manager = RuntimeManager::new();
    manager.apply(config);

    let stepper = manager.stepper().unwrap();
    for (tick, expected) in (0..16).zip(&ether.hashes) {
        manager.frame(TickInput::new(tick)).unwrap();
        let cells = stepper.borrow().state(manager.store());
        assert_eq!(&hash_cells(&cells), expected, "tick {tick}");
    }
}

#[test]
fn unary_incrementer_matches_golden_hashes() {
    let fixture: TapeFixture = serde_json::from_str(TAPE).unwrap();
    let run = HeadlessRun {
        stepper: StepperKind::Tape,
        steps: fixture.steps,
        tape: TapeRun {
            machine_id: Some(fixture.machine_id),
            chunk_size: fixture.chunk_size,
            window_radius: fixture.window_radius,
            initial_tape: fixture.initial_tape,
            ..TapeRun::default()
        },
        ..HeadlessRun::default()
    };
    assert_eq!(hashes_of(&run), fixture.hashes);
}

#[test]
fn run_files_drive_the_same_sequences() {
    let fixture: TapeFixture = serde_json::from_str(TAPE).unwrap();
    let run = HeadlessRun::parse(
        r"
stepper: tape
steps: 10
tape:
  chunk_size: 8
  window_radius: 1
  initial_tape: [1, 1, 1, 1, 1]
",
    )
    .unwrap();
    assert_eq!(hashes_of(&run), fixture.hashes);
}

#[test]
fn bundled_yaml_files_parse() {
    let config = SubstrateConfig::parse(include_str!("../../../substrate-config.yaml")).unwrap();
    assert_eq!(config.rule110.width, 256);
    let run = HeadlessRun::parse(include_str!("../../../substrate-run.yaml")).unwrap();
    assert_eq!(run.stepper, StepperKind::Rule110);
    assert_eq!(run.genome.preset.as_deref(), Some("hunger-loop"));
    assert_eq!(run.tape.initial_tape, vec![1, 1, 1]);
}
