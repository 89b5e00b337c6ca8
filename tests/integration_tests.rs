use assert_cmd::prelude::*;
use assert_cmd::Command;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn runs_without_arguments() {
    let mut cmd = Command::cargo_bin("maris").unwrap();
    cmd.assert().success();
}

#[test]
fn runs_program_to_completion() {
    let mut cmd = Command::cargo_bin("maris").unwrap();
    cmd.args(["run", &fixture("add.mas"), "--minimal", "--output", "dec"]);
    cmd.assert().success().stdout("12\n");
}

#[test]
fn renders_output_in_hex_by_default() {
    let mut cmd = Command::cargo_bin("maris").unwrap();
    cmd.args(["run", &fixture("add.mas"), "--minimal"]);
    cmd.assert().success().stdout("000C\n");
}

#[test]
fn feeds_piped_input_to_the_machine() {
    let mut cmd = Command::cargo_bin("maris").unwrap();
    cmd.args([
        "run",
        &fixture("echo.mas"),
        "--minimal",
        "--input",
        "dec",
        "--output",
        "dec",
    ]);
    cmd.write_stdin("42\n");
    cmd.assert().success().stdout("42\n");
}

#[test]
fn check_accepts_clean_source() {
    let mut cmd = Command::cargo_bin("maris").unwrap();
    cmd.args(["check", &fixture("add.mas")]);
    cmd.assert().success();
}

#[test]
fn check_rejects_undefined_symbols() {
    let mut cmd = Command::cargo_bin("maris").unwrap();
    cmd.args(["check", &fixture("broken.mas")]);
    cmd.assert().failure();
}
