//! Ontology replace flows against a file-backed store

use clairvoyance_core::{Ontology, OntologyCounts, StorageError};
use clairvoyance_e2e_tests::harness::TestOntologyDb;
use clairvoyance_e2e_tests::mocks::{OntologyFactory, ShapeConfig};

fn counts(superclasses: i64, subclasses: i64, rules: i64) -> OntologyCounts {
    OntologyCounts {
        superclasses,
        subclasses,
        rules,
    }
}

#[test]
fn test_minimal_submission_replaces_any_prior_content() {
    let large = OntologyFactory::with_shape(&ShapeConfig {
        superclasses: 6,
        subclasses_per_superclass: 4,
        rules: 12,
        with_details: true,
    });
    let db = TestOntologyDb::seeded(&large);
    assert_eq!(db.counts(), counts(6, 24, 12));

    db.store.replace(&OntologyFactory::animals()).unwrap();

    assert_eq!(db.counts(), counts(1, 1, 1));
    let stored = db.store.load().unwrap();
    assert_eq!(stored.superclasses[0].name, "Animal");
    assert_eq!(stored.superclasses[0].subclasses[0].name, "Dog");
    assert_eq!(stored.rules, vec!["R1"]);
}

#[test]
fn test_load_returns_what_was_submitted() {
    let ontology = OntologyFactory::with_shape(&ShapeConfig {
        with_details: true,
        ..Default::default()
    });
    let db = TestOntologyDb::seeded(&ontology);

    let stored = db.store.load().unwrap();
    assert_eq!(OntologyFactory::strip_ids(&stored), ontology);
}

#[test]
fn test_ids_follow_positions() {
    let db = TestOntologyDb::seeded(&OntologyFactory::with_shape(&ShapeConfig::default()));
    let stored = db.store.load().unwrap();

    assert_eq!(stored.superclasses[0].id.as_deref(), Some("sc-0"));
    assert_eq!(stored.superclasses[2].id.as_deref(), Some("sc-2"));
    assert_eq!(stored.superclasses[1].subclasses[1].id.as_deref(), Some("sub-1-1"));
}

#[test]
fn test_ontology_survives_reopen() {
    let mut db = TestOntologyDb::seeded(&OntologyFactory::animals());
    assert!(db.path().exists());

    db.reopen();

    assert_eq!(db.counts(), counts(1, 1, 1));
    assert!(db.store.last_replaced().unwrap().is_some());
    assert_eq!(db.store.schema_version().unwrap(), 2);
}

#[test]
fn test_rejected_replace_keeps_previous_ontology() {
    let db = TestOntologyDb::seeded(&OntologyFactory::animals());

    let mut broken = OntologyFactory::with_shape(&ShapeConfig::default());
    broken.superclasses[1].subclasses[0].name = String::new();

    let err = db.store.replace(&broken).unwrap_err();
    assert!(matches!(err, StorageError::Invalid(_)));
    assert_eq!(db.counts(), counts(1, 1, 1));
}

#[test]
fn test_empty_submission_clears_everything() {
    let db = TestOntologyDb::seeded(&OntologyFactory::with_shape(&ShapeConfig::default()));
    assert!(!db.is_empty());

    db.store.replace(&Ontology::default()).unwrap();

    assert!(db.is_empty());
    assert_eq!(db.store.load().unwrap(), Ontology::default());
}

#[test]
fn test_snapshot_restore_round_trip() {
    let original = OntologyFactory::with_shape(&ShapeConfig::default());
    let mut db = TestOntologyDb::seeded(&original);

    db.take_snapshot();
    db.store.replace(&OntologyFactory::animals()).unwrap();
    assert_eq!(db.counts(), counts(1, 1, 1));

    assert!(db.restore_snapshot());
    assert_eq!(OntologyFactory::strip_ids(&db.store.load().unwrap()), original);
    assert!(!db.restore_snapshot());
}
