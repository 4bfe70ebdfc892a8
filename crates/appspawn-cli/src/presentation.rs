//! Terminal output for reports and handles.

use std::fmt::Write as _;

use appspawn_core::{Endpoint, ProcessHandle, StatusReport};

/// Render a status report as aligned `key: value` lines.
pub fn format_status(report: &StatusReport, endpoint: &Endpoint) -> String {
    let mut out = String::new();
    let mut line = |key: &str, value: &dyn std::fmt::Display| {
        let _ = writeln!(out, "{key:<18}{value}");
    };
    line("pid:", &report.pid);
    line("role:", &report.role);
    line("endpoint:", endpoint);
    line("app root:", &report.app_root.display());
    line("environment:", &report.environment);
    let loaded_at = report.loaded_at.with_timezone(&chrono::Local);
    line("loaded at:", &loaded_at.format("%Y-%m-%d %H:%M:%S %:z"));
    line("uptime:", &format_uptime(report.uptime_secs));
    if let Some(spawned) = report.workers_spawned {
        line("workers spawned:", &spawned);
    }
    out
}

/// Render a handle as pretty JSON.
pub fn format_handle(handle: &ProcessHandle) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(handle)
}

fn format_uptime(secs: u64) -> String {
    let (hours, rest) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appspawn_core::{AgentRole, BootKind, SpawnMethod};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn uptime_formats() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(65), "1m 5s");
        assert_eq!(format_uptime(3_725), "1h 2m 5s");
    }

    #[test]
    fn status_lists_worker_count_for_preloader() {
        let report = StatusReport {
            pid: 4242,
            role: AgentRole::Preloader,
            boot: BootKind::Cold,
            app_root: PathBuf::from("/srv/app"),
            environment: "production".to_string(),
            loaded_at: chrono::Utc::now(),
            uptime_secs: 61,
            workers_spawned: Some(3),
            app_env: BTreeMap::new(),
        };
        let endpoint: Endpoint = "unix:/run/appspawn/backend.sock".parse().unwrap();
        let text = format_status(&report, &endpoint);
        let value = |key: &str| {
            text.lines()
                .find_map(|l| l.strip_prefix(key))
                .map(str::trim)
                .map(str::to_string)
        };
        assert_eq!(value("pid:").as_deref(), Some("4242"));
        assert_eq!(value("role:").as_deref(), Some("preloader"));
        assert_eq!(value("workers spawned:").as_deref(), Some("3"));
        assert_eq!(value("uptime:").as_deref(), Some("1m 1s"));
        assert_eq!(
            value("endpoint:").as_deref(),
            Some("unix:/run/appspawn/backend.sock")
        );
    }

    #[test]
    fn handle_json_has_endpoint_text() {
        let handle = ProcessHandle::new(
            7,
            "tcp://127.0.0.1:4100".parse().unwrap(),
            SpawnMethod::Smart,
        );
        let json = format_handle(&handle).unwrap();
        assert!(json.contains("\"endpoint\": \"tcp://127.0.0.1:4100\""));
    }
}
