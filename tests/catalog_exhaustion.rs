//! Integration tests for running out of catalog blocks and slots

use costsheet::model::{Area, AreaOptions, Level, LineItem, Project};
use costsheet::{
    synthesize, synthesize_to_file, BlockKind, Catalog, EngineError, SynthesisConfig,
    SynthesisError,
};

const SMALL_CATALOG: &str = r#"
[metadata]
name = "two canopies"

[[block]]
kind = "CANOPY"
capacity = 2

[block.cells]
K9 = "=SUM(K12:K100)"
N9 = "=SUM(N12:N100)"

[block.slot_cells]
B12 = "ITEM"
D14 = "CANOPY TYPE"
K12 = "=F14*0.42"
N12 = "=K12*1.35"
"#;

fn item(reference: &str, model: &str) -> LineItem {
    LineItem {
        reference: reference.into(),
        model: model.into(),
        width: 1200,
        length: 2400,
        height: 555,
        sections: 1,
        ..Default::default()
    }
}

fn project(items: Vec<LineItem>, options: AreaOptions) -> Project {
    Project {
        number: "J900".into(),
        date: "10/10/2025".into(),
        levels: vec![Level {
            name: "L1".into(),
            areas: vec![Area {
                name: "Kitchen".into(),
                options,
                line_items: items,
                ..Default::default()
            }],
        }],
        ..Default::default()
    }
}

fn three_canopies() -> Project {
    project(
        vec![item("1.01", "KVF"), item("1.02", "KVF"), item("1.03", "KVF")],
        AreaOptions::default(),
    )
}

#[test]
fn test_capacity_exceeded_names_kind_and_branch() {
    let catalog = Catalog::from_str(SMALL_CATALOG).unwrap();
    let err = synthesize(&three_canopies(), &catalog, &SynthesisConfig::default()).unwrap_err();
    match err {
        SynthesisError::CatalogExhausted { kind, branch } => {
            assert_eq!(kind, BlockKind::Canopy);
            assert_eq!(branch, "L1 (1)");
        }
        other => panic!("Expected CatalogExhausted, got {:?}", other),
    }
}

#[test]
fn test_exhaustion_is_deterministic() {
    let catalog = Catalog::from_str(SMALL_CATALOG).unwrap();
    let first = synthesize(&three_canopies(), &catalog, &SynthesisConfig::default())
        .unwrap_err()
        .to_string();
    let second = synthesize(&three_canopies(), &catalog, &SynthesisConfig::default())
        .unwrap_err()
        .to_string();
    assert_eq!(first, second);
    assert!(first.contains("CANOPY"), "message was: {}", first);
}

#[test]
fn test_kind_missing_from_catalog_is_exhausted() {
    let catalog = Catalog::from_str(SMALL_CATALOG).unwrap();
    let options = AreaOptions {
        air_recovery: true,
        ..Default::default()
    };
    let project = project(vec![item("1.01", "KVF")], options);
    let err = synthesize(&project, &catalog, &SynthesisConfig::default()).unwrap_err();
    assert!(
        matches!(err, SynthesisError::CatalogExhausted { kind: BlockKind::AirRecovery, .. }),
        "got {:?}",
        err
    );
}

#[test]
fn test_failed_synthesis_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::from_str(SMALL_CATALOG).unwrap();
    let config = SynthesisConfig::default();
    let err = synthesize_to_file(&three_canopies(), &catalog, &config, dir.path()).unwrap_err();
    assert!(matches!(err, EngineError::Synthesis(_)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_uv_slots_exhausted() {
    let items = (1..=6).map(|i| item(&format!("1.0{}", i), "KVF")).collect();
    let options = AreaOptions {
        uv_comparison: true,
        ..Default::default()
    };
    let err = synthesize(&project(items, options), &Catalog::default(), &SynthesisConfig::default())
        .unwrap_err();
    match err {
        SynthesisError::SlotsExhausted { kind, slots, needed, .. } => {
            assert_eq!(kind, BlockKind::UvBaseline);
            assert_eq!(slots, 5);
            assert_eq!(needed, 6);
        }
        other => panic!("Expected SlotsExhausted, got {:?}", other),
    }
}

#[test]
fn test_five_uv_items_fit() {
    let items = (1..=5).map(|i| item(&format!("1.0{}", i), "KVF")).collect();
    let options = AreaOptions {
        uv_comparison: true,
        ..Default::default()
    };
    let out = synthesize(&project(items, options), &Catalog::default(), &SynthesisConfig::default())
        .unwrap();
    assert!(out
        .workbook
        .sheet("CANOPY (UV) - L1 (1)")
        .is_some_and(|s| !s.is_hidden()));
}
