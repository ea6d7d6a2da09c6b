use std::process::{Command, Output, Stdio};
use std::time::Duration;

use serial_test::serial;
use testkit::{MockGlances, MockInflux};

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_glanceship")
}

/// A command with a clean environment so local config never leaks in.
fn command(args: &[&str], envs: &[(&str, &str)]) -> Command {
    let mut cmd = Command::new(bin());
    cmd.args(args)
        .env_clear()
        .env("GLANCESHIP_CONFIG", "/nonexistent/glanceship.toml")
        .env("RUST_LOG", "warn");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    cmd
}

fn influx_env(url: &str) -> Vec<(&'static str, String)> {
    vec![
        ("INFLUX_URL", url.to_string()),
        ("INFLUX_TOKEN", "secret".to_string()),
        ("INFLUX_ORG", "home".to_string()),
        ("INFLUX_BUCKET", "glances".to_string()),
    ]
}

async fn output(mut cmd: Command) -> Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn once_dry_run_prints_line_protocol() {
    let glances = MockGlances::start().await.unwrap();
    let out = output(command(
        &["once", "--dry-run", "--glances-url", &glances.base_url],
        &[],
    ))
    .await;

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();

    // cpu + mem + 2 sensors + 2 interfaces + 2 filesystems
    assert_eq!(lines.len(), 8);
    assert!(lines[0].starts_with("cpu,host=glances-host,"));
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("mem,") && l.contains(" available=400i,free=400i,percent=60,total=1000i,used=600i "))
    );
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("filesystem,") && l.contains(",key=/dev/sda1") && l.contains("free=500i,percent=50,used=500i"))
    );
    assert!(
        lines
            .iter()
            .any(|l| l.starts_with("sensor,") && l.contains("key=nvme0") && l.contains("value=42.5"))
    );
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn once_dry_run_json_lists_points() {
    let glances = MockGlances::start().await.unwrap();
    let out = output(command(
        &["--json", "once", "--dry-run", "--glances-url", &glances.base_url],
        &[],
    ))
    .await;

    assert!(out.status.success());
    let points: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let points = points.as_array().unwrap();
    assert_eq!(points.len(), 8);
    assert_eq!(points[1]["measurement"], "mem");
    assert_eq!(points[1]["fields"]["total"], 1000);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn once_writes_batch_to_influx() {
    let glances = MockGlances::start().await.unwrap();
    let influx = MockInflux::start().await.unwrap();
    let envs = influx_env(&influx.url);
    let envs: Vec<(&str, &str)> = envs.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let out = output(command(&["once", "--glances-url", &glances.base_url], &envs)).await;

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("wrote 8 points for host=glances-host"));

    let writes = influx.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].authorization.as_deref(), Some("Token secret"));
    let lines = writes[0].lines();
    assert_eq!(lines.len(), 8);
    let ts = lines[0].rsplit(' ').next().unwrap().to_string();
    assert!(lines.iter().all(|l| l.ends_with(&ts)));
    assert!(lines.iter().all(|l| l.contains("host=glances-host")));
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn once_fails_without_writing_when_a_category_is_down() {
    let glances = MockGlances::start().await.unwrap();
    glances.fail("fs", 500);
    let influx = MockInflux::start().await.unwrap();
    let envs = influx_env(&influx.url);
    let envs: Vec<(&str, &str)> = envs.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let out = output(command(&["once", "--glances-url", &glances.base_url], &envs)).await;

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("fs"), "stderr: {stderr}");
    assert!(influx.writes().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn run_without_required_config_exits() {
    let out = output(command(&["run"], &[])).await;

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("missing required configuration"), "stderr: {stderr}");
    assert!(stderr.contains("GLANCES_API_URL"));
    assert!(stderr.contains("INFLUX_BUCKET"));
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn run_keeps_writing_after_a_failed_cycle() {
    let glances = MockGlances::start().await.unwrap();
    glances.fail("sensors", 503);
    let influx = MockInflux::start().await.unwrap();
    let mut envs = influx_env(&influx.url);
    envs.push(("GLANCES_API_URL", glances.base_url.clone()));
    envs.push(("INTERVAL_S", "1".to_string()));
    let envs: Vec<(&str, &str)> = envs.iter().map(|(k, v)| (*k, v.as_str())).collect();

    let mut child = command(&["run"], &envs)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(influx.writes().is_empty());
    glances.heal("sensors");

    tokio::time::sleep(Duration::from_millis(2200)).await;
    let _ = child.kill();
    let _ = child.wait();

    let writes = influx.writes();
    assert!(!writes.is_empty());
    assert!(writes.iter().all(|w| w.lines().len() == 8));
}
