use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;

#[test]
fn senatran_without_gov_password_is_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let sheet = tmp.path().join("frota.xlsx");
    fs::write(&sheet, b"PK")?;

    Command::cargo_bin("ksi-cli")?
        .env(ksi_config::ENV_UPLOAD_DIR, tmp.path().join("uploads"))
        .args(["submit", "--memory", "--service", "SENATRAN", "--actor", "ana"])
        .args(["--gov-login", "12345678909", "--sheet"])
        .arg(&sheet)
        .assert()
        .failure()
        .stdout(predicate::str::contains("status=REJECTED_VALIDATION"))
        .stderr(predicate::str::contains("gov login password"));
    Ok(())
}

#[test]
fn nfe_submission_is_ready_and_audit_verifies() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let keys = tmp.path().join("lote.txt");
    let cert = tmp.path().join("empresa.pfx");
    fs::write(&keys, "35190112345678000199550000000000000000000001\n")?;
    fs::write(&cert, b"pfx")?;

    let output = Command::cargo_bin("ksi-cli")?
        .env(ksi_config::ENV_UPLOAD_DIR, tmp.path().join("uploads"))
        .env("KSI_TEST_PFX_PASSWORD", "pfx-secret")
        .args(["submit", "--memory", "--service", "nfe", "--actor", "ana"])
        .args(["--cert-password-env", "KSI_TEST_PFX_PASSWORD", "--keys"])
        .arg(&keys)
        .arg("--cert")
        .arg(&cert)
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("status=READY"));
    assert!(!stdout.contains("pfx-secret"));
    let stored_at = stdout
        .lines()
        .find_map(|l| l.strip_prefix("stored_at="))
        .expect("stored_at line");

    Command::cargo_bin("ksi-cli")?
        .args(["audit", "verify", "--path"])
        .arg(std::path::Path::new(stored_at).join(ksi_audit::AUDIT_FILE_NAME))
        .assert()
        .success()
        .stdout(predicate::str::contains("audit_valid=true lines=6"));
    Ok(())
}
