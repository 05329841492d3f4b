//! Console and JSON rendering of a finished build.

use console::{StyledObject, style};
use convoy_core::TaskKind;
use convoy_runner::Task;

const INDENT: usize = 2;
const RULE: &str = "----------------------------------------------";
const NO_OUTPUT: &str = "*** no output found! ***";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Successful,
    Failed,
    Skipped,
}

impl Verdict {
    fn of(task: &Task) -> Self {
        if task.successful() {
            Verdict::Successful
        } else if task.has_run() {
            Verdict::Failed
        } else {
            Verdict::Skipped
        }
    }

    fn symbol(self) -> StyledObject<&'static str> {
        match self {
            Verdict::Successful => style("\u{2713}").green(),
            Verdict::Failed => style("\u{2717}").red(),
            Verdict::Skipped => style("\u{2933}").color256(33),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Verdict::Successful => "successful",
            Verdict::Failed => "failed",
            Verdict::Skipped => "skipped",
        }
    }
}

/// Counts of every node below the build root.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn of(build: &Task) -> Self {
        let mut tally = Tally::default();
        for task in build.walk().into_iter().skip(1) {
            match Verdict::of(task) {
                Verdict::Successful => tally.successful += 1,
                Verdict::Failed => tally.failed += 1,
                Verdict::Skipped => tally.skipped += 1,
            }
        }
        tally
    }

    /// One-line summary. Failed and skipped counts only appear once something failed.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.failed > 0 {
            parts.push((Verdict::Failed, self.failed));
            parts.push((Verdict::Skipped, self.skipped));
        }
        parts.push((Verdict::Successful, self.successful));

        parts
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(verdict, count)| format!("{} {} {}", verdict.symbol(), count, verdict.label()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Render the task tree, the tally, and the output of every failed command.
pub fn render(build: &Task) -> String {
    let mut lines = Vec::new();
    push_tree(build, 0, &mut lines);

    lines.push(String::new());
    lines.push(Tally::of(build).summary());

    for task in build.walk() {
        if task.kind() == TaskKind::Command && Verdict::of(task) == Verdict::Failed {
            lines.push(String::new());
            lines.extend(command_results(task));
        }
    }

    lines.join("\n")
}

/// Serialized report tree.
pub fn render_json(build: &Task) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&build.report())
}

fn push_tree(task: &Task, depth: usize, lines: &mut Vec<String>) {
    let label = match task.kind() {
        TaskKind::Build => format!("{} {}", task.kind(), task.name()),
        _ => task.name().to_string(),
    };
    lines.push(format!(
        "{}{} {} ({})",
        " ".repeat(depth * INDENT),
        Verdict::of(task).symbol(),
        label,
        task.runtime_str()
    ));
    for subtask in task.subtasks() {
        push_tree(subtask, depth + 1, lines);
    }
}

fn command_results(task: &Task) -> Vec<String> {
    let mut lines = vec![
        style(task.name()).red().to_string(),
        style(RULE).red().to_string(),
    ];
    if let Some(failure) = task.failure() {
        lines.push(failure.to_string());
    }
    if task.results().is_empty() {
        lines.push(NO_OUTPUT.to_string());
    } else {
        lines.extend(task.results().iter().cloned());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convoy_core::Result;
    use convoy_core::ports::{ContainerHandle, ContainerRuntime, ExecSession};
    use convoy_runner::{TaskArgs, TaskFactory, WorkerPool};
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    /// Exits with the code in its table, printing the lines next to it.
    #[derive(Default)]
    struct Scripted {
        scripts: HashMap<&'static str, (Vec<&'static str>, i64)>,
        sessions: Mutex<HashMap<String, i64>>,
    }

    impl Scripted {
        fn with(mut self, command: &'static str, output: Vec<&'static str>, code: i64) -> Self {
            self.scripts.insert(command, (output, code));
            self
        }
    }

    #[async_trait]
    impl ContainerRuntime for Scripted {
        async fn create_and_start(
            &self,
            image: &str,
            _env: &BTreeMap<String, String>,
        ) -> Result<ContainerHandle> {
            Ok(ContainerHandle {
                id: format!("{:0>64}", image.len()),
                name: format!("convoy_{}", image),
            })
        }

        async fn exec_stream(&self, _: &ContainerHandle, command: &str) -> Result<ExecSession> {
            let (output, code) = self.scripts.get(command).cloned().unwrap_or_default();
            let mut sessions = self.sessions.lock().unwrap();
            let id = format!("exec-{}", sessions.len());
            sessions.insert(id.clone(), code);
            let lines: Vec<Result<String>> = output.into_iter().map(|l| Ok(l.to_string())).collect();
            Ok(ExecSession {
                id,
                output: futures::stream::iter(lines).boxed(),
            })
        }

        async fn exec_exit_code(&self, session_id: &str) -> Result<i64> {
            Ok(self.sessions.lock().unwrap()[session_id])
        }

        async fn remove(&self, _: &ContainerHandle) -> Result<()> {
            Ok(())
        }

        async fn stop(&self, _: &ContainerHandle) -> Result<()> {
            Ok(())
        }
    }

    const PIPELINE: &str = r#"
stages:
  - name: test
    jobs:
      - name: lint
        image: alpine
        commands: make lint
      - name: unit
        image: alpine
        commands:
          - make test
          - make coverage
  - name: deploy
    jobs:
      - name: ship
        image: alpine
        commands: make deploy
"#;

    async fn run(runtime: Scripted) -> Task {
        let mut build = TaskFactory::new(Arc::new(runtime))
            .with_pool(WorkerPool::new(2))
            .from_yaml_str(PIPELINE)
            .unwrap();
        build.execute(TaskArgs::default()).await.unwrap();
        build
    }

    fn plain(text: &str) -> String {
        console::strip_ansi_codes(text).into_owned()
    }

    #[tokio::test]
    async fn test_successful_build_report() {
        let build = run(Scripted::default()).await;

        let tally = Tally::of(&build);
        assert_eq!(
            tally,
            Tally {
                successful: 9,
                failed: 0,
                skipped: 0
            }
        );
        assert_eq!(plain(&tally.summary()), "\u{2713} 9 successful");

        let report = plain(&render(&build));
        let lines: Vec<&str> = report.lines().collect();
        assert!(lines[0].starts_with(&format!("\u{2713} Build {} (", build.name())));
        assert!(lines[1].starts_with("  \u{2713} test ("));
        assert!(lines[2].starts_with("    \u{2713} lint ("));
        assert!(lines[3].starts_with("      \u{2713} make lint ("));
        assert!(!report.contains("no output found"));
    }

    #[tokio::test]
    async fn test_failed_build_report() {
        let runtime = Scripted::default()
            .with("make lint", vec![], 1)
            .with("make test", vec!["1 passed", "1 failed"], 2);
        let build = run(runtime).await;

        let tally = Tally::of(&build);
        assert_eq!(
            tally,
            Tally {
                successful: 0,
                failed: 5,
                skipped: 4
            }
        );
        assert_eq!(
            plain(&tally.summary()),
            "\u{2717} 5 failed \u{2933} 4 skipped"
        );

        let report = plain(&render(&build));
        assert!(report.contains("      \u{2933} make coverage (N/A)"));
        assert!(report.contains("  \u{2933} deploy (N/A)"));
        assert!(report.contains(&format!(
            "make lint\n{}\ncommand [make lint] returned exitcode [1]\n{}",
            RULE, NO_OUTPUT
        )));
        assert!(report.contains(&format!(
            "make test\n{}\ncommand [make test] returned exitcode [2]\n1 passed\n1 failed",
            RULE
        )));
    }

    #[test]
    fn test_summary_hides_skipped_without_failures() {
        let tally = Tally {
            successful: 3,
            failed: 0,
            skipped: 2,
        };
        assert_eq!(plain(&tally.summary()), "\u{2713} 3 successful");

        let tally = Tally {
            successful: 0,
            failed: 1,
            skipped: 0,
        };
        assert_eq!(plain(&tally.summary()), "\u{2717} 1 failed");
    }

    #[tokio::test]
    async fn test_json_report() {
        let build = run(Scripted::default().with("make deploy", vec!["shipped"], 0)).await;

        let json: serde_json::Value = serde_json::from_str(&render_json(&build).unwrap()).unwrap();
        assert_eq!(json["kind"], "build");
        assert_eq!(json["successful"], true);
        assert_eq!(json["subtasks"][1]["subtasks"][0]["subtasks"][0]["results"][0], "shipped");
    }
}
