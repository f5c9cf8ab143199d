//! Engine config on disk and its effect on evaluation.

mod common;

use common::builders::CircuitBuilder;
use wirecast::config::{DeliveryPolicy, EngineConfig};
use wirecast::{Evaluator, Operation};

#[test]
fn test_config_file_drives_evaluator() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wirecast.toml");
    std::fs::write(
        &path,
        r#"
[broker]
mailbox_capacity = 8
delivery = "reliable"

[evaluation]
timeout_ms = 2000
"#,
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.broker.delivery, DeliveryPolicy::Reliable);
    assert_eq!(config.evaluation.thread_stack_kib, 256);

    let evaluator = Evaluator::new(&config);
    assert_eq!(evaluator.broker_config().mailbox_capacity, 8);

    let circuit = CircuitBuilder::<u32>::new()
        .constant(0xF0F0_F0F0, "x")
        .not("x", "y")
        .gate("y", Operation::RShift, "4", "z")
        .build();
    let eval = evaluator.evaluate(circuit, ["z"]).unwrap();
    assert_eq!(eval.value("z"), Some(0x00F0_F0F0));
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[broker]\nmailbox_capacity = 0\n").unwrap();

    let err = EngineConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("mailbox_capacity"));
    assert_eq!(EngineConfig::load_or_default(&path), EngineConfig::default());
}

#[test]
fn test_default_config_survives_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wirecast").join("wirecast.toml");

    EngineConfig::default().save(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("best_effort"));
    assert_eq!(EngineConfig::load(&path).unwrap(), EngineConfig::default());
}
