use std::{fs, process::Command};

fn wave_warden() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_wave-warden"));
    let _ = command.env("RUST_LOG", "warn");
    command
}

#[test]
fn bundled_scenario_reports_json_summary() {
    let output = wave_warden()
        .args(["--seed", "7", "--skip-delays", "--json"])
        .output()
        .expect("failed to invoke wave-warden binary");

    assert!(output.status.success(), "wave-warden should finish the bundled scenario");
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary is valid json");
    assert_eq!(summary["waves"], summary["waves_completed"]);
    assert_eq!(summary["spawned"], summary["killed"]);
}

#[test]
fn step_budget_exhaustion_fails_the_run() {
    let status = wave_warden()
        .args(["--max-steps", "2"])
        .status()
        .expect("failed to invoke wave-warden binary");

    assert!(!status.success(), "an unfinished run must exit with an error");
}

#[test]
fn json_scenario_files_are_loaded() {
    let path = std::env::temp_dir().join(format!("wave-warden-{}.json", std::process::id()));
    fs::write(
        &path,
        r#"{
            "spawners": [{ "id": "gate", "position": [0.0, 0.0, 0.0] }],
            "prototypes": [{ "id": "grunt" }],
            "waves": [{ "aliveCap": 2, "items": [{ "spawnerId": "gate", "prototypeId": "grunt", "count": 3 }] }]
        }"#,
    )
    .expect("scenario written");

    let output = wave_warden()
        .arg("--scenario")
        .arg(&path)
        .arg("--json")
        .output()
        .expect("failed to invoke wave-warden binary");
    let _ = fs::remove_file(&path);

    assert!(output.status.success());
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary is valid json");
    assert_eq!(summary["spawned"], 3);
}

#[test]
fn unsupported_scenario_extension_is_rejected() {
    let path = std::env::temp_dir().join(format!("wave-warden-{}.yaml", std::process::id()));
    fs::write(&path, "waves: []").expect("scenario written");

    let output = wave_warden()
        .arg("--scenario")
        .arg(&path)
        .output()
        .expect("failed to invoke wave-warden binary");
    let _ = fs::remove_file(&path);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unsupported scenario extension"));
}
