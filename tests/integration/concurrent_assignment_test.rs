//! Integration tests for assignment atomicity across connections.

use std::sync::{Arc, Barrier};
use std::thread;

use mobility_cds::protocols::{AssignmentState, ClinicalProtocol, ProtocolPhase};
use mobility_cds::storage::{Database, ProtocolStore};
use tempfile::TempDir;
use uuid::Uuid;

fn protocol(name: &str) -> ClinicalProtocol {
    ClinicalProtocol {
        id: Uuid::new_v4(),
        name: name.to_string(),
        indication: "General deconditioning".to_string(),
        contraindications: Vec::new(),
        diagnosis_codes: Vec::new(),
        phases: vec![ProtocolPhase {
            phase: 1,
            frequency: "daily".to_string(),
            target_duration_min: 10.0,
            resistance: 2.0,
            rpm: 40.0,
            goals: Vec::new(),
            progression_criteria: Vec::new(),
            monitoring_params: Vec::new(),
            stop_criteria: Vec::new(),
        }],
        is_active: true,
    }
}

/// Test a second assignment leaves exactly one active row.
#[test]
fn test_sequential_reassignment() {
    let db = Database::open_in_memory().unwrap();
    let store = ProtocolStore::new(db.connection());
    let first = protocol("First");
    let second = protocol("Second");
    store.insert_protocol(&first).unwrap();
    store.insert_protocol(&second).unwrap();
    let patient_id = Uuid::new_v4();

    store.assign(patient_id, first.id, 0, 1).unwrap();
    store.assign(patient_id, second.id, 0, 1).unwrap();

    let history = store.assignments_for(patient_id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|a| a.state.is_active()).count(), 1);

    let active = store.active_assignment(patient_id).unwrap().unwrap();
    assert_eq!(active.protocol_id, second.id);
    assert!(history
        .iter()
        .any(|a| a.protocol_id == first.id && a.state == AssignmentState::Discontinued));
}

/// Test concurrent assignments from separate connections.
#[test]
fn test_concurrent_assignments_keep_single_active() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cds.db");

    let protocols: Vec<ClinicalProtocol> = (0..4).map(|i| protocol(&format!("P{}", i))).collect();
    {
        let db = Database::open(&path).unwrap();
        let store = ProtocolStore::new(db.connection());
        for p in &protocols {
            store.insert_protocol(p).unwrap();
        }
    }

    let patient_id = Uuid::new_v4();
    let barrier = Arc::new(Barrier::new(protocols.len()));

    let handles: Vec<_> = protocols
        .iter()
        .map(|p| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            let protocol_id = p.id;
            thread::spawn(move || {
                let db = Database::open(&path).unwrap();
                barrier.wait();
                ProtocolStore::new(db.connection())
                    .assign(patient_id, protocol_id, 0, 1)
                    .is_ok()
            })
        })
        .collect();

    let succeeded = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(succeeded, protocols.len());

    let db = Database::open(&path).unwrap();
    let history = ProtocolStore::new(db.connection())
        .assignments_for(patient_id)
        .unwrap();
    assert_eq!(history.len(), protocols.len());
    assert_eq!(history.iter().filter(|a| a.state.is_active()).count(), 1);
}
