//! Startup banner.
//!
//! Prints the application name, version, and a snapshot of the host. Purely
//! informational: every probe is best effort and the proxy behaves the same
//! whether or not the banner runs.

use std::fmt::Write as _;

const BANNER: &str = r#"
  ___ _                _                    ___
 / __(_)__ _ _ _  __ _| |_ _  _ _ _ ___    | _ \_ _ _____ ___  _
 \__ \ / _` | ' \/ _` |  _| || | '_/ -_)   |  _/ '_/ _ \ \ / || |
 |___/_\__, |_||_\__,_|\__|\_,_|_| \___|   |_| |_| \___/_\_\\_, |
       |___/                                                |__/
"#;

/// Memory figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total: u64,
    pub free: u64,
    pub available: u64,
}

impl MemoryInfo {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }
}

/// Host snapshot shown in the banner.
#[derive(Debug, Clone, Default)]
pub struct HostInfo {
    pub hostname: Option<String>,
    pub os: String,
    pub uptime_secs: Option<u64>,
    pub memory: Option<MemoryInfo>,
}

impl HostInfo {
    pub fn collect() -> Self {
        let hostname = std::fs::read_to_string("/proc/sys/kernel/hostname")
            .or_else(|_| std::fs::read_to_string("/etc/hostname"))
            .ok()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());

        Self {
            hostname,
            os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            uptime_secs: std::fs::read_to_string("/proc/uptime")
                .ok()
                .and_then(|s| parse_uptime(&s)),
            memory: std::fs::read_to_string("/proc/meminfo")
                .ok()
                .and_then(|s| parse_meminfo(&s)),
        }
    }
}

/// Render the banner text.
pub fn render_banner(version: &str, host: &HostInfo) -> String {
    let mut out = String::from(BANNER);
    let _ = writeln!(out, "Application Version: {}", version);

    let _ = writeln!(out, "\nServer Information:");
    let _ = writeln!(out, "  Hostname: {}", host.hostname.as_deref().unwrap_or("unknown"));
    let _ = writeln!(out, "  OS: {}", host.os);
    if let Some(uptime) = host.uptime_secs {
        let _ = writeln!(out, "  Uptime: {} seconds", uptime);
    }

    if let Some(mem) = host.memory {
        let gb = |bytes: u64| bytes as f64 / 1e9;
        let _ = writeln!(out, "\nMemory Information:");
        let _ = writeln!(out, "  Total: {:.2} GB", gb(mem.total));
        let _ = writeln!(out, "  Used: {:.2} GB", gb(mem.used()));
        let _ = writeln!(out, "  Free: {:.2} GB", gb(mem.free));
    }

    let _ = writeln!(out, "\nServer Status: Started");
    out
}

/// Print the banner for this build and host to stdout.
pub fn print_banner() {
    println!("{}", render_banner(env!("CARGO_PKG_VERSION"), &HostInfo::collect()));
}

fn parse_uptime(text: &str) -> Option<u64> {
    let secs: f64 = text.split_whitespace().next()?.parse().ok()?;
    Some(secs as u64)
}

fn parse_meminfo(text: &str) -> Option<MemoryInfo> {
    let field = |name: &str| -> Option<u64> {
        let line = text.lines().find(|l| l.starts_with(name))?;
        let kb: u64 = line[name.len()..].trim_start_matches(':').split_whitespace().next()?.parse().ok()?;
        Some(kb * 1024)
    };

    let total = field("MemTotal")?;
    let free = field("MemFree")?;
    let available = field("MemAvailable").unwrap_or(free);
    Some(MemoryInfo { total, free, available })
}
