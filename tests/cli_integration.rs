use anyhow::Context;
use std::fs;
use tempfile::TempDir;

const SCRIPT: &str = concat!(
    "import os\n",
    "import random\n",
    "\n",
    "def roll():\n",
    "    return random.randint(1, 6)\n",
);

#[test]
fn move_writes_suffixed_output() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("script.py");
    fs::write(&input, SCRIPT)?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move")
        .arg(&input)
        .output()
        .context("failed to execute localimp-cli move")?;
    anyhow::ensure!(
        output.status.success(),
        "move exited with {}. stderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let written = fs::read_to_string(temp.path().join("script_im.py"))?;
    assert!(written.contains("# import os\n"));
    assert!(written.contains("# import random\n"));
    assert!(written.contains("def roll():\n    import random\n"));
    Ok(())
}

#[test]
fn move_stdout_prints_transformed_source() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("script.py");
    fs::write(&input, SCRIPT)?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move")
        .arg(&input)
        .arg("--stdout")
        .arg("--quiet")
        .output()
        .context("failed to execute localimp-cli move --stdout")?;
    anyhow::ensure!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("    import random\n"));
    assert!(!temp.path().join("script_im.py").exists());
    Ok(())
}

#[test]
fn move_json_reports_relocations() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("script.py");
    fs::write(&input, SCRIPT)?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move")
        .arg(&input)
        .arg("--json")
        .arg("--dry-run")
        .output()
        .context("failed to execute localimp-cli move --json")?;
    anyhow::ensure!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["relocations"][0]["function"], "roll");
    assert_eq!(report["unused_imports"][0]["name"], "os");
    assert!(!temp.path().join("script_im.py").exists());
    Ok(())
}

#[test]
fn move_diff_shows_changed_lines() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("script.py");
    fs::write(&input, SCRIPT)?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move")
        .arg(&input)
        .arg("--diff")
        .arg("--dry-run")
        .output()
        .context("failed to execute localimp-cli move --diff")?;
    anyhow::ensure!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("-import random"));
    assert!(stdout.contains("+    import random"));
    Ok(())
}

#[test]
fn move_rejects_unparseable_input() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("broken.py");
    fs::write(&input, "def f(:\n")?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move")
        .arg(&input)
        .output()
        .context("failed to execute localimp-cli move")?;
    anyhow::ensure!(!output.status.success());
    assert!(!temp.path().join("broken_im.py").exists());
    Ok(())
}

#[test]
fn move_naive_claims_import_for_first_function() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("script.py");
    fs::write(
        &input,
        "import math\n\ndef a():\n    return math.pi\n\ndef b():\n    return math.e\n",
    )?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move")
        .arg(&input)
        .arg("--naive")
        .arg("--stdout")
        .arg("--quiet")
        .output()
        .context("failed to execute localimp-cli move --naive")?;
    anyhow::ensure!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("def a():\n    import math\n"));
    assert!(!stdout.contains("def b():\n    import math"));
    Ok(())
}

#[test]
fn move_dir_processes_tree_and_skips_init() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let pkg = temp.path().join("pkg");
    fs::create_dir_all(&pkg)?;
    fs::write(pkg.join("a.py"), SCRIPT)?;
    fs::write(pkg.join("b.py"), "x = 1\n")?;
    fs::write(pkg.join("__init__.py"), "import os\n")?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move-dir")
        .arg(temp.path())
        .arg("--jobs")
        .arg("1")
        .output()
        .context("failed to execute localimp-cli move-dir")?;
    anyhow::ensure!(
        output.status.success(),
        "move-dir exited with {}. stderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    assert!(pkg.join("a_im.py").exists());
    // Unchanged files and __init__.py produce no output.
    assert!(!pkg.join("b_im.py").exists());
    assert!(!pkg.join("__init___im.py").exists());

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("Processed 2 files"));
    Ok(())
}

#[test]
fn move_dir_respects_ignore_regex() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    fs::write(temp.path().join("keep.py"), SCRIPT)?;
    fs::write(temp.path().join("skip_me.py"), SCRIPT)?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move-dir")
        .arg(temp.path())
        .arg("--ignore-files")
        .arg("^skip_")
        .output()
        .context("failed to execute localimp-cli move-dir")?;
    anyhow::ensure!(output.status.success());

    assert!(temp.path().join("keep_im.py").exists());
    assert!(!temp.path().join("skip_me_im.py").exists());
    Ok(())
}

#[test]
fn config_file_controls_whitelist_and_suffix() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("script.py");
    fs::write(&input, SCRIPT)?;
    let config = temp.path().join("localimp.toml");
    fs::write(&config, "whitelist = [\"random\"]\noutput_suffix = \"_moved\"\n")?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .output()
        .context("failed to execute localimp-cli move --config")?;
    anyhow::ensure!(output.status.success());

    let written = fs::read_to_string(temp.path().join("script_moved.py"))?;
    assert!(written.contains("\nimport random\n"));
    assert!(!written.contains("    import random"));
    Ok(())
}

#[test]
fn move_log_writes_report_file() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let input = temp.path().join("script.py");
    fs::write(&input, SCRIPT)?;
    let log = temp.path().join("moves.log");

    let output = assert_cmd::cargo::cargo_bin_cmd!("localimp-cli")
        .arg("move")
        .arg(&input)
        .arg("--log")
        .arg(&log)
        .arg("--dry-run")
        .output()
        .context("failed to execute localimp-cli move --log")?;
    anyhow::ensure!(output.status.success());

    let contents = fs::read_to_string(&log)?;
    assert!(contents.contains("Unused import: os"));
    assert!(contents.contains("Imports moved to function roll:"));
    Ok(())
}
