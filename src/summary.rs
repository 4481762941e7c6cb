use std::io::{self, Write};
use std::time::Duration;

use crate::results::TargetResult;
use crate::Display;

/// Round-trip time statistics of a target with at least one reply
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub min: Duration,
    pub avg: Duration,
    pub max: Duration,
    pub stddev: Duration,
}

impl Statistics {
    /// Compute statistics over a series of round-trip times
    ///
    /// Returns `None` for an empty series. The standard deviation is the Bessel-corrected sample
    /// standard deviation, which is zero for a single sample.
    pub fn from_rtts(rtts: &[Duration]) -> Option<Self> {
        let min = *rtts.iter().min()?;
        let max = *rtts.iter().max()?;

        let count = rtts.len() as f64;
        let total: f64 = rtts.iter().map(Duration::as_secs_f64).sum();
        let avg = total / count;

        // Sum of squared errors
        let sse: f64 = rtts.iter().map(|x| (x.as_secs_f64() - avg).powi(2)).sum();
        let stddev = if rtts.len() > 1 {
            (sse / (count - 1f64)).sqrt()
        } else {
            0f64
        };

        Some(Self {
            min,
            avg: Duration::from_secs_f64(avg),
            max,
            stddev: Duration::from_secs_f64(stddev),
        })
    }
}

impl TargetResult {
    /// Loss in percent, `None` if nothing was sent
    pub fn loss_percent(&self) -> Option<f64> {
        if self.sent == 0 {
            return None;
        }
        Some((self.sent - self.received) as f64 * 100f64 / self.sent as f64)
    }

    pub fn statistics(&self) -> Option<Statistics> {
        Statistics::from_rtts(&self.rtts)
    }
}

/// Aggregate over all targets of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub targets: usize,
    pub sent: usize,
    pub received: usize,
    pub loss_percent: f64,
}

/// Summarising information about the outcome of a run
///
/// The summary is a snapshot taken after every probe has concluded. All figures are computed from
/// it and do not change anymore.
#[derive(Debug, Clone)]
pub struct Summary {
    targets: Vec<(String, TargetResult)>,
    display: Display,
}

impl Summary {
    pub fn new(names: Vec<String>, results: Vec<TargetResult>, display: Display) -> Self {
        Self {
            targets: names.into_iter().zip(results).collect(),
            display,
        }
    }

    /// Results per target in input order
    pub fn targets(&self) -> &[(String, TargetResult)] {
        &self.targets
    }

    /// Result of the first target with the given name
    pub fn get(&self, name: &str) -> Option<&TargetResult> {
        self.targets
            .iter()
            .find(|(target, _)| target == name)
            .map(|(_, result)| result)
    }

    pub fn totals(&self) -> Totals {
        let sent: usize = self.targets.iter().map(|(_, r)| r.sent).sum();
        let received: usize = self.targets.iter().map(|(_, r)| r.received).sum();
        let loss_percent = if sent == 0 {
            0f64
        } else {
            (sent - received) as f64 * 100f64 / sent as f64
        };

        Totals {
            targets: self.targets.len(),
            sent,
            received,
            loss_percent,
        }
    }

    /// Print summary statistics for this run to standard output
    pub fn tally(&self) {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        if let Err(e) = self.write_to(&mut handle) {
            error!("Could not print summary: {}", e);
        }
    }

    /// Write summary statistics for this run
    ///
    /// Times are reported in milliseconds with 3 decimals, loss in percent with 1 decimal. Targets
    /// hidden by the display filter still count towards the totals.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "--- fanping summary statistics ---")?;

        let mut shown = 0;
        for (name, result) in &self.targets {
            if !self.display.shows(result.received) {
                continue;
            }
            shown += 1;

            match (result.loss_percent(), result.statistics()) {
                (None, _) if result.unresolved => writeln!(out, "{} : unresolved", name)?,
                (None, _) => writeln!(out, "{} : 0/0 packets, not probed", name)?,
                (Some(loss), Some(stats)) => writeln!(
                    out,
                    "{} : {}/{} packets, {:.1}% loss, min/avg/max/stddev = {:.3}/{:.3}/{:.3}/{:.3} ms",
                    name,
                    result.received,
                    result.sent,
                    loss,
                    millis(stats.min),
                    millis(stats.avg),
                    millis(stats.max),
                    millis(stats.stddev)
                )?,
                (Some(_), None) => writeln!(out, "{} : 0/{} packets, 100% loss", name, result.sent)?,
            }
        }

        if shown == 0 {
            match self.display {
                Display::AliveOnly => writeln!(out, "\nNo hosts responded.")?,
                Display::UnreachableOnly => writeln!(out, "\nAll hosts are reachable.")?,
                Display::All => writeln!(out, "\nNo targets to ping.")?,
            }
            return Ok(());
        }

        let totals = self.totals();
        writeln!(
            out,
            "\nTotal: {} targets, {}/{} packets, {:.1}% loss",
            totals.targets, totals.received, totals.sent, totals.loss_percent
        )
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(sent: usize, rtts_ms: &[u64]) -> TargetResult {
        TargetResult {
            sent,
            received: rtts_ms.len(),
            rtts: rtts_ms.iter().map(|&ms| Duration::from_millis(ms)).collect(),
            unresolved: false,
        }
    }

    fn unresolved() -> TargetResult {
        TargetResult {
            unresolved: true,
            ..TargetResult::default()
        }
    }

    fn render(summary: &Summary) -> String {
        let mut out = Vec::new();
        summary.write_to(&mut out).expect("Failed writing summary");
        String::from_utf8(out).expect("Summary is not UTF-8")
    }

    #[test]
    fn statistics_over_rtts() {
        let stats = Statistics::from_rtts(&[
            Duration::from_millis(2),
            Duration::from_millis(4),
            Duration::from_millis(6),
        ])
        .unwrap();

        assert_eq!(stats.min, Duration::from_millis(2));
        assert_eq!(stats.max, Duration::from_millis(6));
        assert!((millis(stats.avg) - 4.0).abs() < 1e-6);

        // Sample standard deviation of 2, 4, 6 is 2
        assert!((millis(stats.stddev) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn single_reply_has_zero_stddev() {
        let stats = Statistics::from_rtts(&[Duration::from_millis(7)]).unwrap();
        assert_eq!(stats.min, stats.max);
        assert_eq!(stats.stddev, Duration::from_secs(0));
    }

    #[test]
    fn no_replies_no_statistics() {
        assert!(Statistics::from_rtts(&[]).is_none());
        assert!(result(3, &[]).statistics().is_none());
    }

    #[test]
    fn loss_percent() {
        assert_eq!(result(1, &[]).loss_percent(), Some(100.0));
        assert_eq!(result(4, &[1, 1, 1]).loss_percent(), Some(25.0));
        assert_eq!(result(2, &[1, 1]).loss_percent(), Some(0.0));
        assert_eq!(result(0, &[]).loss_percent(), None);
    }

    #[test]
    fn totals_over_all_targets() {
        let summary = Summary::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![result(2, &[1, 2]), result(2, &[]), result(0, &[])],
            Display::All,
        );

        let totals = summary.totals();
        assert_eq!(totals.targets, 3);
        assert_eq!(totals.sent, 4);
        assert_eq!(totals.received, 2);
        assert!((totals.loss_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn totals_without_any_probe() {
        let summary = Summary::new(vec!["a".into()], vec![result(0, &[])], Display::All);
        assert_eq!(summary.totals().loss_percent, 0.0);
    }

    #[test]
    fn render_all_targets() {
        let summary = Summary::new(
            vec!["alive".into(), "dead".into(), "nowhere".into()],
            vec![result(2, &[1, 3]), result(2, &[]), unresolved()],
            Display::All,
        );

        let text = render(&summary);
        assert!(text.contains(
            "alive : 2/2 packets, 0.0% loss, min/avg/max/stddev = 1.000/2.000/3.000/1.414 ms"
        ));
        assert!(text.contains("dead : 0/2 packets, 100% loss"));
        assert!(text.contains("nowhere : unresolved"));
        assert!(text.contains("Total: 3 targets, 2/4 packets, 50.0% loss"));
    }

    #[test]
    fn render_target_never_reached() {
        let summary = Summary::new(
            vec!["10.0.0.1".into(), "10.0.0.2".into()],
            vec![result(1, &[4]), result(0, &[])],
            Display::All,
        );

        let text = render(&summary);
        assert!(text.contains("10.0.0.2 : 0/0 packets, not probed"));
        assert!(!text.contains("unresolved"));
        assert!(text.contains("Total: 2 targets, 1/1 packets, 0.0% loss"));
    }

    #[test]
    fn render_alive_only() {
        let summary = Summary::new(
            vec!["alive".into(), "dead".into()],
            vec![result(1, &[1]), result(1, &[])],
            Display::AliveOnly,
        );

        let text = render(&summary);
        assert!(text.contains("alive : 1/1 packets"));
        assert!(!text.contains("dead"));

        // Hidden targets still count
        assert!(text.contains("Total: 2 targets, 1/2 packets, 50.0% loss"));
    }

    #[test]
    fn render_filter_hides_everything() {
        let dead = Summary::new(vec!["dead".into()], vec![result(1, &[])], Display::AliveOnly);
        assert!(render(&dead).contains("No hosts responded."));

        let alive = Summary::new(vec!["alive".into()], vec![result(1, &[1])], Display::UnreachableOnly);
        assert!(render(&alive).contains("All hosts are reachable."));
    }
}
