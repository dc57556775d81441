//! Human readable output shared by commands and notifications.

use crate::monitor::record::{ContainerRecord, LifecycleStatus};
use crate::monitor::store::FleetState;
use crate::runtime::UsageSample;

/// Chat platforms reject messages over 2000 characters. Leave some room.
pub const MESSAGE_LIMIT: usize = 1900;

/// Splits `text` on line boundaries into chunks of at most `limit`
/// characters. A single line longer than `limit` is cut.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let mut line = line;
        while line.chars().count() > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let cut = line
                .char_indices()
                .nth(limit)
                .map(|(i, _)| i)
                .unwrap_or(line.len());
            chunks.push(line[..cut].to_string());
            line = &line[cut..];
        }

        let needed = if current.is_empty() {
            line.chars().count()
        } else {
            current.chars().count() + 1 + line.chars().count()
        };
        if needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FleetCounts {
    pub running: usize,
    pub stopped: usize,
    pub other: usize,
}

impl FleetCounts {
    pub fn of<'a>(records: impl IntoIterator<Item = &'a ContainerRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.lifecycle_status {
                LifecycleStatus::Running => counts.running += 1,
                status if status.is_stopped() => counts.stopped += 1,
                _ => counts.other += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.running + self.stopped + self.other
    }
}

/// Which part of the fleet a listing shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Running,
    Stopped,
}

/// Listing grouped into running, stopped and other sections, with a summary
/// line for the unfiltered view.
pub fn render_fleet(state: &FleetState, filter: StatusFilter) -> String {
    let records: Vec<&ContainerRecord> = state.containers.values().collect();
    if records.is_empty() {
        return "🔭 No containers found".to_string();
    }

    let running: Vec<&ContainerRecord> = records
        .iter()
        .copied()
        .filter(|r| r.lifecycle_status == LifecycleStatus::Running)
        .collect();
    let stopped: Vec<&ContainerRecord> = records
        .iter()
        .copied()
        .filter(|r| r.lifecycle_status.is_stopped())
        .collect();
    let other: Vec<&ContainerRecord> = records
        .iter()
        .copied()
        .filter(|r| r.lifecycle_status != LifecycleStatus::Running && !r.lifecycle_status.is_stopped())
        .collect();

    let mut lines = Vec::new();
    match filter {
        StatusFilter::All => {
            let counts = FleetCounts::of(records.iter().copied());
            lines.push(format!(
                "📊 **SUMMARY:** {} running, {} stopped, {} total",
                counts.running,
                counts.stopped,
                counts.total()
            ));
        }
        StatusFilter::Running if running.is_empty() => {
            return "🔭 No running containers found".to_string();
        }
        StatusFilter::Stopped if stopped.is_empty() => {
            return "🟢 No stopped containers found!".to_string();
        }
        _ => {}
    }

    if filter != StatusFilter::Stopped && !running.is_empty() {
        lines.push("🟢 **RUNNING CONTAINERS:**".to_string());
        lines.extend(
            running
                .iter()
                .map(|r| format!("  • `{}` - {}", r.display_name, r.image_reference)),
        );
    }
    if filter != StatusFilter::Running && !stopped.is_empty() {
        lines.push("🔴 **STOPPED CONTAINERS:**".to_string());
        lines.extend(
            stopped
                .iter()
                .map(|r| format!("  • `{}` - {}", r.display_name, r.image_reference)),
        );
    }
    if filter == StatusFilter::All && !other.is_empty() {
        lines.push("🟡 **OTHER STATUS:**".to_string());
        lines.extend(
            other
                .iter()
                .map(|r| format!("  • `{}` - {}", r.display_name, r.lifecycle_status)),
        );
    }

    if let Some(last_update) = state.last_update {
        lines.push(format!(
            "_Last update: {}_",
            last_update.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }

    lines.join("\n")
}

pub fn render_counts(state: &FleetState) -> String {
    let counts = FleetCounts::of(state.containers.values());
    let mut out = format!(
        "📊 **Container summary**\n🟢 Running: {}\n🔴 Stopped: {}",
        counts.running, counts.stopped
    );
    if counts.other > 0 {
        out.push_str(&format!("\n🟡 Other: {}", counts.other));
    }
    out.push_str(&format!("\n📦 Total: {}", counts.total()));
    out
}

pub fn render_usage(name: &str, sample: &UsageSample) -> String {
    format!(
        "📈 **Resource usage for `{name}`**\nCPU: {:.1}%\nMemory: {} / {} ({:.1}%)\nNetwork: {} received, {} sent",
        sample.cpu_percent,
        format_bytes(sample.memory_usage_bytes),
        format_bytes(sample.memory_limit_bytes),
        sample.memory_percent(),
        format_bytes(sample.network_rx_bytes),
        format_bytes(sample.network_tx_bytes),
    )
}

/// Plain-text fleet description handed to the language model.
pub fn render_fleet_context(state: &FleetState) -> String {
    let mut out = String::from("Current containers (name | image | status | ports):\n");
    for record in state.containers.values() {
        let ports: Vec<String> = record
            .port_bindings
            .iter()
            .flat_map(|(port, bindings)| {
                bindings.iter().map(move |b| {
                    format!("{}->{}", b.host_port.as_deref().unwrap_or("?"), port)
                })
            })
            .collect();
        out.push_str(&format!(
            "{} | {} | {} | {}\n",
            record.display_name,
            record.image_reference,
            record.lifecycle_status,
            if ports.is_empty() { "-".to_string() } else { ports.join(", ") }
        ));
    }
    out
}
