use chrono::{DateTime, Utc};

use crate::graph::NodeStatus;

pub fn human_bytes(b: i64) -> String {
    if b == 0 {
        return "0 B".to_string();
    }
    const UNIT: i64 = 1024;
    if b < UNIT {
        return format!("{} B", b);
    }
    let suffixes = ["KB", "MB", "GB", "TB"];
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = b / UNIT;
    while n >= UNIT && exp < suffixes.len() - 1 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}", b as f64 / div as f64, suffixes[exp])
}

pub fn human_duration_secs(total_secs: i64) -> String {
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        format!("{}m{}s", total_secs / 60, total_secs % 60)
    } else if total_secs < 86400 {
        format!("{}h{}m", total_secs / 3600, (total_secs % 3600) / 60)
    } else {
        let days = total_secs / 86400;
        let hours = (total_secs % 86400) / 3600;
        format!("{}d{}h", days, hours)
    }
}

pub fn parse_age(start_time: &Option<String>) -> String {
    let ts = match start_time {
        Some(s) if !s.is_empty() => s,
        _ => return String::new(),
    };

    // K8s timestamps are RFC 3339
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        let d = Utc::now() - dt.to_utc();
        return human_duration_secs(d.num_seconds());
    }

    String::new()
}

pub fn pod_phase_status(phase: &str) -> NodeStatus {
    match phase {
        "Running" | "Succeeded" => NodeStatus::Healthy,
        "Pending" => NodeStatus::Warning,
        "Failed" | "Error" | "CrashLoopBackOff" => NodeStatus::Error,
        _ => NodeStatus::Unknown,
    }
}

pub fn container_status(ready: bool, restart_count: i32) -> NodeStatus {
    if ready {
        NodeStatus::Healthy
    } else if restart_count > 0 {
        NodeStatus::Error
    } else {
        NodeStatus::Warning
    }
}
