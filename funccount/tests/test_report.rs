//! Reporting loop against a fake counter source

use std::collections::VecDeque;
use std::time::Duration;

use funccount::domain::{Location, Result};
use funccount::instrumentation::{CountSnapshot, CounterSource};
use funccount::probe::{Match, MatchTable};
use funccount::report::{InterruptToken, ReportOptions, Reporter};

/// Replays scripted snapshots; interrupts after the last one is read
struct ScriptedSource {
    script: VecDeque<Vec<(u32, u64)>>,
    current: CountSnapshot,
    resets: usize,
    token: InterruptToken,
}

impl ScriptedSource {
    fn new(script: Vec<Vec<(u32, u64)>>, token: InterruptToken) -> Self {
        let mut source =
            Self { script: script.into(), current: CountSnapshot::new(), resets: 0, token };
        source.advance();
        source
    }

    fn advance(&mut self) {
        match self.script.pop_front() {
            Some(counts) => {
                self.current =
                    counts.into_iter().map(|(location, count)| (Location(location), count)).collect();
            }
            None => {
                self.current = CountSnapshot::new();
                self.token.interrupt();
            }
        }
    }
}

impl CounterSource for ScriptedSource {
    fn snapshot(&self) -> Result<CountSnapshot> {
        Ok(self.current.clone())
    }

    fn reset(&mut self) -> Result<()> {
        self.resets += 1;
        self.advance();
        Ok(())
    }
}

fn table() -> MatchTable {
    let names = ["vfs_read", "vfs_open", "vfs_write"];
    MatchTable::new(names.iter().map(|n| Match::kernel(*n)).collect(), "^vfs_.*$").unwrap()
}

fn row(name: &str, count: u64) -> String {
    format!("{name:<36} {count:>8}")
}

#[tokio::test(start_paused = true)]
async fn test_interval_reports_in_ascending_order() {
    let token = InterruptToken::new();
    let source = ScriptedSource::new(vec![vec![(0, 5), (1, 0), (2, 2)], vec![(1, 7)]], token.clone());
    let table = table();
    let options = ReportOptions { interval: Some(Duration::from_secs(1)), timestamp: false };

    let mut out = Vec::new();
    let mut reporter = Reporter::new(&table, source, &mut out, options);
    reporter.run(&token).await.unwrap();
    // Two interval reports; the second reset runs out of script and interrupts
    assert_eq!(reporter.reports_emitted(), 3);
    let source = reporter.into_source();
    assert_eq!(source.resets, 3);

    let text = String::from_utf8(out).unwrap();
    let header = format!("{:<36} {:>8}", "FUNC", "COUNT");
    let expected = [
        String::new(),
        header.clone(),
        row("vfs_write", 2),
        row("vfs_read", 5),
        String::new(),
        header.clone(),
        row("vfs_open", 7),
        String::new(),
        header,
        "Detaching...".to_string(),
    ];
    assert_eq!(text.lines().collect::<Vec<_>>(), expected);
}

#[tokio::test(start_paused = true)]
async fn test_no_interval_reports_once() {
    let token = InterruptToken::new();
    let source = ScriptedSource::new(vec![vec![(2, 1)]], token.clone());
    let table = table();

    let mut out = Vec::new();
    let mut reporter = Reporter::new(&table, source, &mut out, ReportOptions::default());

    let interrupter = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            token.interrupt();
        })
    };
    reporter.run(&token).await.unwrap();
    interrupter.await.unwrap();

    assert_eq!(reporter.reports_emitted(), 1);
    drop(reporter);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.matches("FUNC").count(), 1);
    assert!(text.contains(&row("vfs_write", 1)));
    assert!(text.ends_with("Detaching...\n"));
}

#[tokio::test(start_paused = true)]
async fn test_timestamp_precedes_header() {
    let token = InterruptToken::new();
    let source = ScriptedSource::new(vec![], token.clone());
    let table = table();
    let options = ReportOptions { interval: None, timestamp: true };

    let mut out = Vec::new();
    let mut reporter = Reporter::new(&table, source, &mut out, options);
    reporter.run(&token).await.unwrap();
    drop(reporter);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "");
    let timestamp = lines[1];
    assert_eq!(timestamp.len(), 8);
    assert_eq!(timestamp.matches(':').count(), 2);
    assert!(lines[2].starts_with("FUNC"));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_interrupts_produce_one_final_report() {
    let token = InterruptToken::new();
    let source = ScriptedSource::new(vec![vec![(0, 3)]], token.clone());
    let table = table();

    assert!(token.interrupt());
    assert!(token.interrupt());

    let mut out = Vec::new();
    let mut reporter = Reporter::new(&table, source, &mut out, ReportOptions::default());
    reporter.run(&token).await.unwrap();

    // Further interrupts after the drain started are dropped
    assert!(!token.interrupt());
    assert_eq!(reporter.reports_emitted(), 1);
    drop(reporter);
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.matches("FUNC").count(), 1);
    assert_eq!(text.matches("Detaching...").count(), 1);
}
