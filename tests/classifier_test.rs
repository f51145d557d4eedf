//! Integration tests for task classification.

use rand::seq::IndexedRandom;
use unified_scheduler::core::{
    BackendSelection, Complexity, Durability, Frequency, Infrastructure, TaskCharacteristics,
    Visibility, classify,
};

const FREQUENCIES: [Frequency; 3] = [Frequency::High, Frequency::Low, Frequency::OneShot];
const VISIBILITIES: [Visibility; 2] = [Visibility::Internal, Visibility::UserFacing];
const COMPLEXITIES: [Complexity; 2] = [Complexity::Simple, Complexity::MultiStep];
const DURABILITIES: [Durability; 2] = [Durability::Ephemeral, Durability::MustSurviveRestart];
const INFRASTRUCTURES: [Infrastructure; 2] =
    [Infrastructure::Local, Infrastructure::RequiresExternalWorkers];

fn all_characteristics() -> Vec<TaskCharacteristics> {
    let mut out = Vec::new();
    for f in FREQUENCIES {
        for v in VISIBILITIES {
            for c in COMPLEXITIES {
                for d in DURABILITIES {
                    for i in INFRASTRUCTURES {
                        out.push(TaskCharacteristics::new(f, v, c, d, i));
                    }
                }
            }
        }
    }
    out
}

#[test]
fn test_every_combination_maps_to_one_backend() {
    let combos = all_characteristics();
    assert_eq!(combos.len(), 48);

    for c in combos {
        let backend = classify(&c);
        assert_eq!(backend, classify(&c), "classification is deterministic");

        let expected = if c.infrastructure == Infrastructure::RequiresExternalWorkers
            && c.complexity == Complexity::MultiStep
        {
            BackendSelection::DagOrchestrator
        } else if c.durability == Durability::MustSurviveRestart {
            BackendSelection::DurableQueue
        } else if c.frequency == Frequency::High && c.visibility == Visibility::Internal {
            BackendSelection::Timer
        } else {
            BackendSelection::DurableQueue
        };
        assert_eq!(backend, expected, "{c:?}");
    }
}

#[test]
fn test_high_frequency_internal_ephemeral_local_goes_to_timer() {
    let c = TaskCharacteristics::parse("high", "internal", "simple", "ephemeral", "local").unwrap();
    assert_eq!(classify(&c), BackendSelection::Timer);
}

#[test]
fn test_must_survive_restart_goes_to_durable_queue() {
    let mut rng = rand::rng();
    for _ in 0..100 {
        let c = TaskCharacteristics::new(
            *FREQUENCIES.choose(&mut rng).unwrap(),
            *VISIBILITIES.choose(&mut rng).unwrap(),
            Complexity::Simple,
            Durability::MustSurviveRestart,
            *INFRASTRUCTURES.choose(&mut rng).unwrap(),
        );
        assert_eq!(classify(&c), BackendSelection::DurableQueue);
    }
}

#[test]
fn test_external_multi_step_goes_to_orchestrator() {
    for f in FREQUENCIES {
        for d in DURABILITIES {
            let c = TaskCharacteristics::new(
                f,
                Visibility::UserFacing,
                Complexity::MultiStep,
                d,
                Infrastructure::RequiresExternalWorkers,
            );
            assert_eq!(classify(&c), BackendSelection::DagOrchestrator);
        }
    }
}

#[test]
fn test_characteristics_deserialize_from_wire_spelling() {
    let c: TaskCharacteristics = serde_json::from_str(
        r#"{"frequency":"one-shot","visibility":"user-facing","complexity":"multi-step",
            "durability":"must-survive-restart","infrastructure":"requires-external-workers"}"#,
    )
    .unwrap();
    assert_eq!(classify(&c), BackendSelection::DagOrchestrator);
    assert!(serde_json::from_str::<TaskCharacteristics>(r#"{"frequency":"sometimes"}"#).is_err());
}
