use assert_cmd::prelude::*;
use camino::Utf8Path;
use std::fs::File;
use std::io::prelude::*;
use std::process::Command;
use tempfile::Builder;

fn rewind_cmd(home: &Utf8Path) -> Command {
    let mut cmd = Command::cargo_bin("rewind").unwrap();
    // keep the REPL history and config lookups out of the real home directory
    cmd.env("REWIND_CONFIG_FILE", home.join("rewind.toml"));
    cmd.env("REWIND_HISTORY", home.join("history"));
    cmd
}

fn write_file(dir: &Utf8Path, name: &str, contents: &str) -> camino::Utf8PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn test_help_flag_command() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();

    let mut cmd = rewind_cmd(tmp_dir);
    cmd.arg("--help");
    cmd.assert().success();
}

#[test]
fn test_repl_command() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();

    let mut cmd = rewind_cmd(tmp_dir);
    cmd.arg("repl");
    cmd.assert().success();
}

#[test]
fn test_bad_command() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let bad_file = tmp_dir.join("uiop");

    let mut cmd = rewind_cmd(tmp_dir);
    cmd.arg(bad_file.as_str());
    cmd.assert().failure();
}

#[test]
fn test_load_prints_results() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let file = write_file(
        tmp_dir,
        "arith.scm",
        "(define (sq x) (* x x))\n(sq 12)\n(call/cc (lambda (k) (+ 1 (k 7))))\n",
    );

    let mut cmd = rewind_cmd(tmp_dir);
    cmd.arg("load");
    cmd.arg(file.as_str());
    let output = cmd.output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("=> 144\n"), "{stdout}");
    assert!(stdout.contains("=> 7\n"), "{stdout}");
}

#[test]
fn test_elided_load() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let file = write_file(tmp_dir, "ok.scm", "!(assert-eq (+ 1 2) 3)\n");

    let mut cmd = rewind_cmd(tmp_dir);
    cmd.arg(file.as_str());
    cmd.assert().success();
}

#[test]
fn test_failed_assertion_exits_with_error() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let file = write_file(tmp_dir, "bad.scm", "!(assert-eq (+ 1 2) 4)\n");

    let mut cmd = rewind_cmd(tmp_dir);
    cmd.arg(file.as_str());
    cmd.assert().failure().code(1);
}

#[test]
fn test_uncaught_throw_fails_load() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let file = write_file(tmp_dir, "throw.scm", "(throw 'boom)\n(display \"after\")\n");

    let mut cmd = rewind_cmd(tmp_dir);
    cmd.arg(file.as_str());
    let output = cmd.output().unwrap();
    assert!(!output.status.success());
    assert!(!String::from_utf8(output.stdout).unwrap().contains("after"));
}

#[test]
fn test_iteration_limit_flag() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let file = write_file(tmp_dir, "loop.scm", "(let loop () (loop))\n");

    let mut cmd = rewind_cmd(tmp_dir);
    cmd.arg("load");
    cmd.arg(file.as_str());
    cmd.arg("--limit");
    cmd.arg("10000");
    cmd.assert().failure();
}

#[test]
fn test_nested_load_is_relative() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    write_file(tmp_dir, "lib.scm", "(define (twice f x) (f (f x)))\n");
    let main = write_file(
        tmp_dir,
        "main.scm",
        "!(load \"lib.scm\")\n!(assert-eq (twice (lambda (x) (* x 3)) 2) 18)\n",
    );

    let mut cmd = rewind_cmd(tmp_dir);
    cmd.current_dir("/");
    cmd.arg(main.as_str());
    cmd.assert().success();
}

#[test]
fn test_snapshot_across_processes() {
    let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
    let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();
    let save = write_file(
        tmp_dir,
        "save.scm",
        "(define base 100)\n(+ base (wait-signal 'tick))\n!(save tick \"tick.snap\")\n",
    );
    let restore = write_file(
        tmp_dir,
        "restore.scm",
        "!(restore tick \"tick.snap\")\n!(post tick 23)\n",
    );

    rewind_cmd(tmp_dir).arg(save.as_str()).assert().success();
    assert!(tmp_dir.join("tick.snap").exists());

    let output = rewind_cmd(tmp_dir).arg(restore.as_str()).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().contains("=> 123\n"));
}

#[test]
fn test_demo_files() {
    for demo in ["demo/wind.scm", "demo/shift.scm", "demo/errors.scm", "demo/signals.scm"] {
        let tmp_dir = Builder::new().prefix("tmp").tempdir().unwrap();
        let tmp_dir = Utf8Path::from_path(tmp_dir.path()).unwrap();

        let mut cmd = rewind_cmd(tmp_dir);
        cmd.arg(demo);
        cmd.assert().success();
    }
}
