use std::collections::BTreeMap;

use chrono::SecondsFormat;
use glanceship_core::model::point::Point;
use glanceship_ship::scheduler::CycleReport;
use glanceship_ship::sink::encode_batch;

pub fn print_points_line_protocol(
    points: &[Point],
    default_tags: &BTreeMap<String, String>,
) -> anyhow::Result<()> {
    print!("{}", encode_batch(points, default_tags)?);
    Ok(())
}

pub fn print_points_json(points: &[Point]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(points)?);
    Ok(())
}

pub fn print_report_human(report: &CycleReport) {
    println!(
        "wrote {} points for host={} at {}",
        report.points,
        report.host,
        report.ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    );
}

pub fn print_report_json(report: &CycleReport) -> anyhow::Result<()> {
    let value = serde_json::json!({
        "host": report.host,
        "points": report.points,
        "ts": report.ts.to_rfc3339_opts(SecondsFormat::Nanos, true),
    });
    println!("{value}");
    Ok(())
}
