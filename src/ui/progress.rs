use crate::engine::{LoopOutcome, RoundReport, Termination};
use crate::ui::icons::{CHECK, CROSS, NOTE, ROUND, STOP};
use crate::util::truncate_chars;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

const REASONING_SNIPPET_CHARS: usize = 160;

/// Terminal UI for a research run, rendered via `indicatif`.
///
/// Two bars are stacked vertically:
/// - Round bar: rounds completed out of the round cap
/// - Activity spinner: what the engine is doing right now
pub struct ResearchUI {
    multi: MultiProgress,
    round_bar: ProgressBar,
    activity: ProgressBar,
    verbose: bool,
}

impl ResearchUI {
    pub fn new(max_rounds: u32, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let round_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");
        let round_bar = multi.add(ProgressBar::new(u64::from(max_rounds)));
        round_bar.set_style(round_style);
        round_bar.set_prefix("Rounds");

        let activity_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");
        let activity = multi.add(ProgressBar::new_spinner());
        activity.set_style(activity_style);
        activity.set_prefix("   Now");

        Self {
            multi,
            round_bar,
            activity,
            verbose,
        }
    }

    /// Print a line above the bars, falling back to stderr.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn start(&self, session_id: i64, goal: &str) {
        self.round_bar
            .set_message(format!("session {} {}", style(session_id).yellow(), goal));
        self.activity.set_message(format!(
            "{} {}",
            style("Analyst thinking").cyan(),
            style("(round 1)").dim()
        ));
        self.activity.enable_steady_tick(Duration::from_millis(100));
    }

    /// Report a finished round and move the spinner on to the next one.
    pub fn round_complete(&self, report: &RoundReport) {
        self.round_bar.inc(1);
        for line in round_lines(report, self.verbose) {
            self.print_line(line);
        }
        self.activity.set_message(format!(
            "{} {}",
            style("Analyst thinking").cyan(),
            style(format!("(round {})", report.round + 1)).dim()
        ));
    }

    pub fn finish(&self, outcome: &LoopOutcome) {
        self.activity.finish_and_clear();
        self.round_bar.finish_with_message(termination_line(outcome));
    }

    pub fn abandon(&self, msg: &str) {
        self.activity.finish_and_clear();
        self.round_bar
            .abandon_with_message(format!("{}{}", CROSS, style(msg).red()));
    }
}

/// Spinner for one-shot commands.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .expect("progress bar template is a valid static string"),
    );
    bar.set_message(msg.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Human-readable summary of one round.
pub fn round_lines(report: &RoundReport, verbose: bool) -> Vec<String> {
    let mut lines = vec![format!(
        "{}Round {}  confidence {}  tasks {}",
        ROUND,
        style(report.round).cyan().bold(),
        style(format!("{:.0}", report.record.confidence_score)).cyan(),
        report.outcomes.len()
    )];

    let reasoning = report.reasoning.trim();
    if !reasoning.is_empty() {
        let shown = if verbose {
            reasoning
        } else {
            truncate_chars(reasoning, REASONING_SNIPPET_CHARS)
        };
        lines.push(format!("    {}{}", NOTE, style(shown).dim()));
    }

    for outcome in &report.outcomes {
        let (icon, detail) = match &outcome.response.error {
            None => (CHECK, style(outcome.response.backend.clone()).green()),
            Some(err) => (CROSS, style(format!("{}: {}", outcome.response.backend, err)).red()),
        };
        lines.push(format!(
            "    {}{} {}",
            icon,
            style(outcome.task.action()).yellow(),
            detail
        ));
    }

    if report.should_stop {
        lines.push(format!("    {}{}", STOP, style("analyst requested stop").bold()));
    }
    lines
}

pub fn termination_line(outcome: &LoopOutcome) -> String {
    match &outcome.termination {
        Termination::Analyst => format!(
            "{}stopped by analyst after {} round(s): {}",
            CHECK,
            outcome.rounds,
            outcome.record.stop_reason.as_deref().unwrap_or("")
        ),
        Termination::RoundCap => format!(
            "{}round cap reached after {} round(s)",
            STOP, outcome.rounds
        ),
        Termination::Intervention { reason } => {
            format!("{}session already stopped: {}", STOP, reason)
        }
    }
}
