use std::{cell::RefCell, collections::HashMap, time::Duration};

use colored::Colorize;

/// Timing statistics for a single kind of command.
#[derive(Debug, Default, Clone)]
pub struct CommandStats {
    pub count: u64,
    /// Runs that exited unsuccessfully.
    pub failures: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl CommandStats {
    pub fn record(&mut self, duration: Duration, succeeded: bool) {
        self.count += 1;
        if !succeeded {
            self.failures += 1;
        }
        self.total_duration += duration;
        if duration > self.max_duration {
            self.max_duration = duration;
        }
    }

    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

/// Aggregated statistics for every external command of a run.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    /// Keyed by program plus subcommand, e.g. "git push".
    pub by_command: HashMap<String, CommandStats>,
    pub total: CommandStats,
}

impl RunStats {
    pub fn record(&mut self, command: &str, duration: Duration, succeeded: bool) {
        self.total.record(duration, succeeded);
        self.by_command
            .entry(command.to_string())
            .or_default()
            .record(duration, succeeded);
    }
}

thread_local! {
    static RUN_STATS: RefCell<RunStats> = RefCell::new(RunStats::default());
}

/// Record one command execution that ran to completion.
pub fn record_command(program: &str, args: &[&str], duration: Duration, succeeded: bool) {
    let key = match args.first() {
        Some(subcommand) => format!("{program} {subcommand}"),
        None => program.to_string(),
    };
    RUN_STATS.with(|stats| stats.borrow_mut().record(&key, duration, succeeded));
}

pub fn get_stats() -> RunStats {
    RUN_STATS.with(|stats| stats.borrow().clone())
}

/// Print a timing summary to stderr.
pub fn print_summary() {
    let stats = get_stats();

    if stats.total.count == 0 {
        return;
    }

    eprintln!();
    eprintln!("{}", "=== External commands ===".yellow().bold());

    // Most expensive first; ties keep a stable alphabetical order.
    let mut commands: Vec<_> = stats.by_command.iter().collect();
    commands.sort_by(|a, b| {
        b.1.total_duration
            .cmp(&a.1.total_duration)
            .then_with(|| a.0.cmp(b.0))
    });

    eprintln!(
        "{:<18} {:>6} {:>6} {:>11} {:>11} {:>11}",
        "command", "runs", "failed", "total", "avg", "max"
    );
    for (name, entry) in commands {
        eprintln!("{}", summary_row(name, entry));
    }
    eprintln!("{}", summary_row("all", &stats.total).as_str().bold());
}

fn summary_row(name: &str, entry: &CommandStats) -> String {
    format!(
        "{:<18} {:>6} {:>6} {:>11.2?} {:>11.2?} {:>11.2?}",
        name,
        entry.count,
        entry.failures,
        entry.total_duration,
        entry.avg_duration(),
        entry.max_duration
    )
}
