use sarplan::config::Config;
use sarplan::error::PlanError;

#[test]
fn defaults_are_the_documented_tuning() {
    let config = Config::default();

    assert_eq!(config.search.solver_count, 2);
    assert_eq!(config.search.worker_threads, 0);
    assert!(config.search.hold_seeds_on_first_jump);

    assert_eq!(config.refine.overlap_threshold_nm, 5.0);
    assert_eq!(config.refine.fib_cap, 34);
    assert_eq!(config.refine.lookback_passes, 6);
    assert_eq!(config.refine.twist_step_deg, 30.0);

    assert_eq!(config.placer.headings, 6);
    assert_eq!(config.placer.split_rounds, 4);
    assert_eq!(config.placer.grid_cells, 8);

    assert_eq!(config.cache.min_slice, 64);
}

#[test]
fn json_round_trip_preserves_everything() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("sarplan.json");

    let mut config = Config::default();
    config.search.solver_count = 5;
    config.refine.fib_cap = 13;
    config.placer.headings = 9;
    config.cache.min_slice = 32;

    config.save_to_file(&path).expect("save works");
    let loaded = Config::load_from_file(&path).expect("load works");

    let a = serde_json::to_string(&config).expect("serializable");
    let b = serde_json::to_string(&loaded).expect("serializable");
    assert_eq!(a, b);
}

#[test]
fn partial_files_fall_back_to_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("partial.json");
    std::fs::write(&path, r#"{"refine": {"fib_cap": 8}}"#).expect("write works");

    let loaded = Config::load_from_file(&path).expect("partial load works");
    assert_eq!(loaded.refine.fib_cap, 8);
    assert_eq!(loaded.refine.overlap_threshold_nm, 5.0);
    assert_eq!(loaded.search.solver_count, 2);
}

#[test]
fn missing_files_surface_as_io_errors() {
    let result = Config::load_from_file("/definitely/not/here.json");
    assert!(matches!(result, Err(PlanError::Io(_))));
}
