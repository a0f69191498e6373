//! gummy 命令行测试

use std::fs;

use assert_cmd::Command;
use tempfile::TempDir;

const TRANSLATED_PAGE: &str = concat!(
    "<html><head></head><body>",
    "<nav><ul><li><a href=\"/\" class=\"translationgummy-inline-translated\" ",
    "data-translationgummy-inline-original=\"Home\">ja:Home</a></li></ul></nav>",
    "<p class=\"translationgummy-translated\" data-translationgummy-original=\"A paragraph worth translating.\">",
    "A paragraph worth translating.<br data-translationgummy-injected=\"break\">",
    "<span data-translationgummy-injected=\"wrapper\" class=\"translationgummy-translation\">ja:A paragraph worth translating.</span>",
    "</p>",
    "<div class=\"translationgummy-bilingual-container\"><h2 class=\"translationgummy-original\">Legacy</h2><div>旧版</div></div>",
    "</body></html>"
);

fn write_page(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("page.html");
    fs::write(&path, TRANSLATED_PAGE).unwrap();
    path
}

#[test]
fn test_status_prints_json() {
    let dir = TempDir::new().unwrap();
    let page = write_page(&dir);

    let output = Command::cargo_bin("gummy")
        .unwrap()
        .arg("status")
        .arg(&page)
        .output()
        .unwrap();
    assert!(output.status.success());

    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["isTranslated"], true);
    assert_eq!(status["translatedCount"], 2);
    assert_eq!(status["wrapperCount"], 1);
}

#[test]
fn test_revert_writes_restored_html() {
    let dir = TempDir::new().unwrap();
    let page = write_page(&dir);
    let out = dir.path().join("restored.html");

    Command::cargo_bin("gummy")
        .unwrap()
        .args(["revert"])
        .arg(&page)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let restored = fs::read_to_string(&out).unwrap();
    assert_eq!(
        restored,
        concat!(
            "<html><head></head><body>",
            "<nav><ul><li><a href=\"/\">Home</a></li></ul></nav>",
            "<p>A paragraph worth translating.</p>",
            "<h2>Legacy</h2>",
            "</body></html>"
        )
    );
}

#[test]
fn test_revert_to_stdout() {
    let dir = TempDir::new().unwrap();
    let page = write_page(&dir);

    let output = Command::cargo_bin("gummy")
        .unwrap()
        .arg("revert")
        .arg(&page)
        .output()
        .unwrap();
    assert!(output.status.success());
    let html = String::from_utf8(output.stdout).unwrap();
    assert!(!html.contains("translationgummy"));
}

#[test]
fn test_missing_file_fails() {
    Command::cargo_bin("gummy")
        .unwrap()
        .args(["status", "/nonexistent/page.html"])
        .assert()
        .failure();
}
