use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};
use pipewalk::pipe::TraversalProfileSnapshot;

use crate::report::{PathsReport, StatsReport, VertexEntry};

const BAR_WIDTH: usize = 24;

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Text renderings of the command reports. JSON output never goes through here.
pub struct Ui {
    styles: Styles,
    paint: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let paint = theme != Theme::Plain && !quiet && std::io::stdout().is_terminal();

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        let styles = match theme {
            Theme::Light => Styles::light(),
            Theme::Plain => Styles::plain(),
            Theme::Dark | Theme::Auto => Styles::dark(),
        };
        Self {
            styles,
            paint,
            quiet,
        }
    }

    fn paint(&self, style: Style, text: impl AsRef<str>) -> String {
        if self.paint {
            style.paint(text.as_ref()).to_string()
        } else {
            text.as_ref().to_owned()
        }
    }

    fn title(&self, text: &str) {
        if self.quiet {
            return;
        }
        println!("{}", self.paint(self.styles.title, text));
    }

    /// Totals, then one bar per edge label scaled to the busiest label.
    pub fn stats(&self, report: &StatsReport) {
        self.title("graph");
        println!(
            "  {} vertices, {} edges",
            self.paint(self.styles.count, report.vertices.to_string()),
            self.paint(self.styles.count, report.edges.to_string()),
        );
        if report.labels.is_empty() {
            return;
        }
        self.title("edges by label");
        let widest = report.labels.keys().map(String::len).max().unwrap_or(0);
        let busiest = report.labels.values().copied().max().unwrap_or(0).max(1);
        for (label, count) in &report.labels {
            let filled = (*count as usize * BAR_WIDTH).div_ceil(busiest as usize);
            println!(
                "  {:<widest$} {} {}",
                label,
                self.paint(self.styles.bar, "█".repeat(filled)),
                self.paint(self.styles.count, count.to_string()),
            );
        }
    }

    /// Id, name and (when ranked) degree columns.
    pub fn vertices(&self, heading: &str, entries: &[VertexEntry]) {
        self.title(heading);
        if entries.is_empty() {
            println!("  {}", self.paint(self.styles.muted, "no vertices"));
            return;
        }
        let id_width = entries
            .iter()
            .map(|entry| entry.id.to_string().len())
            .max()
            .unwrap_or(1);
        let name_width = entries
            .iter()
            .map(|entry| entry.name.as_deref().map_or(1, str::len))
            .max()
            .unwrap_or(1);
        for entry in entries {
            let id = format!("{:>id_width$}", entry.id);
            let name = format!("{:<name_width$}", entry.name.as_deref().unwrap_or("-"));
            let mut line = format!(
                "  {} {}",
                self.paint(self.styles.id, id),
                self.paint(self.styles.name, name)
            );
            if let Some(degree) = entry.degree {
                line.push_str(&format!(
                    "  {}",
                    self.paint(self.styles.count, format!("degree {degree}"))
                ));
            }
            println!("{}", line.trim_end());
        }
    }

    /// One numbered line per path with its hop count.
    pub fn paths(&self, report: &PathsReport) {
        self.title(&format!("paths {} → {}", report.from, report.to));
        if report.paths.is_empty() {
            println!("  {}", self.paint(self.styles.muted, "no path within the depth limit"));
            return;
        }
        let arrow = self.paint(self.styles.muted, " → ");
        for (n, path) in report.paths.iter().enumerate() {
            let hops = path.len().saturating_sub(1);
            let walk = path
                .iter()
                .map(|id| self.paint(self.styles.id, id.to_string()))
                .collect::<Vec<_>>()
                .join(&arrow);
            println!(
                "  {:>2}. {walk}  {}",
                n + 1,
                self.paint(self.styles.muted, format!("({hops} hop{})", if hops == 1 { "" } else { "s" }))
            );
        }
    }

    /// Per-category counts and time spent, on stderr.
    pub fn profile(&self, snapshot: &TraversalProfileSnapshot) {
        let rows = [
            ("pull", snapshot.pull_count, snapshot.pull_ns),
            ("expand", snapshot.expand_count, snapshot.expand_ns),
            ("filter", snapshot.filter_count, snapshot.filter_ns),
            ("loop", snapshot.loop_count, snapshot.loop_ns),
            ("barrier", snapshot.barrier_count, snapshot.barrier_ns),
            ("cap", snapshot.cap_count, snapshot.cap_ns),
        ];
        eprintln!("{}", self.paint(self.styles.title, "profile"));
        for (kind, count, ns) in rows {
            eprintln!(
                "  {kind:<8} {:>8}  {}",
                count,
                format_duration(Duration::from_nanos(ns))
            );
        }
    }

    pub fn success(&self, message: &str) {
        println!("{} {message}", self.paint(self.styles.ok, "ok"));
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{} {message}", self.paint(self.styles.warn, "warning:"));
    }

    /// Spinner on stderr while a graph document loads; silent when quiet or
    /// when stderr is not a terminal.
    pub fn loading(&self, path: &Path) -> LoadGuard<'_> {
        let label = format!("loading {}", path.display());
        let spinner = (!self.quiet && std::io::stderr().is_terminal()).then(|| {
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let spinner = ProgressBar::new_spinner().with_style(style);
            spinner.set_message(label.clone());
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });
        LoadGuard {
            ui: self,
            label,
            start: Instant::now(),
            spinner,
            done: false,
        }
    }
}

pub struct LoadGuard<'a> {
    ui: &'a Ui,
    label: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    done: bool,
}

impl LoadGuard<'_> {
    pub fn finish(mut self) -> Duration {
        self.done = true;
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        self.start.elapsed()
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let message = format!(
            "{} failed after {}",
            self.label,
            format_duration(self.start.elapsed())
        );
        match self.spinner.take() {
            Some(spinner) => spinner.abandon_with_message(message),
            None => self.ui.warn(&message),
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();
    if micros >= 1_000_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if micros >= 1_000 {
        format!("{:.1}ms", micros as f64 / 1_000.0)
    } else {
        format!("{micros}µs")
    }
}

#[derive(Clone, Copy)]
struct Styles {
    title: Style,
    id: Style,
    name: Style,
    count: Style,
    bar: Style,
    muted: Style,
    ok: Style,
    warn: Style,
}

impl Styles {
    fn dark() -> Self {
        Self {
            title: Style::new().fg(Color::Purple).bold(),
            id: Style::new().fg(Color::LightCyan).bold(),
            name: Style::new().fg(Color::White),
            count: Style::new().fg(Color::LightGreen),
            bar: Style::new().fg(Color::LightBlue),
            muted: Style::new().fg(Color::DarkGray),
            ok: Style::new().fg(Color::LightGreen).bold(),
            warn: Style::new().fg(Color::Yellow).bold(),
        }
    }

    fn light() -> Self {
        Self {
            title: Style::new().fg(Color::Blue).bold(),
            id: Style::new().fg(Color::Purple).bold(),
            name: Style::new().fg(Color::Black),
            count: Style::new().fg(Color::Green),
            bar: Style::new().fg(Color::Blue),
            muted: Style::new().fg(Color::DarkGray),
            ok: Style::new().fg(Color::Green).bold(),
            warn: Style::new().fg(Color::Red).bold(),
        }
    }

    fn plain() -> Self {
        let plain = Style::new();
        Self {
            title: plain,
            id: plain,
            name: plain,
            count: plain,
            bar: plain,
            muted: plain,
            ok: plain,
            warn: plain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_pick_a_readable_unit() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250µs");
        assert_eq!(format_duration(Duration::from_micros(1_500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_millis(2_340)), "2.34s");
    }
}
