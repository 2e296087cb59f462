use console::{style, Term};
use eyre::WrapErr;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    http,
    runner::{self, Failure, Outcome, ScenarioInfo, ScenarioReport, Summary},
    ProjectName,
};

/// Reporter trait. The trait is based on the "template method" pattern.
/// You can implement on_xxx methods to hook into the sequencer. This way is enough for most usecases.
/// If you need more control, you can override the "run" method.
#[async_trait::async_trait]
pub trait Reporter {
    async fn run(&mut self, mut rx: broadcast::Receiver<runner::Message>) -> eyre::Result<()> {
        loop {
            match rx.recv().await {
                Ok(runner::Message::Start(project_name, info)) => {
                    self.on_start(project_name, info).await?;
                }
                Ok(runner::Message::HttpLog(project_name, info, log)) => {
                    self.on_http_call(project_name, info, log).await?;
                }
                Ok(runner::Message::End(project_name, report)) => {
                    self.on_end(project_name, report).await?;
                }
                Ok(runner::Message::Finish(project_name, summary)) => {
                    self.on_finish(project_name, summary).await?;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("sequencer channel has been closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("reporter lagged behind, {n} message(s) dropped");
                    continue;
                }
            }
        }

        Ok(())
    }

    /// Called right before a scenario is dispatched. Skipped scenarios never start.
    async fn on_start(&mut self, _project: ProjectName, _info: ScenarioInfo) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when an HTTP call is made.
    async fn on_http_call(
        &mut self,
        _project: ProjectName,
        _info: ScenarioInfo,
        _log: Box<http::Log>,
    ) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a scenario reaches its outcome.
    async fn on_end(&mut self, _project: ProjectName, _report: ScenarioReport) -> eyre::Result<()> {
        Ok(())
    }

    /// Called once after the last scenario of a run.
    async fn on_finish(&mut self, _project: ProjectName, _summary: Summary) -> eyre::Result<()> {
        Ok(())
    }
}

/// Built-in reporters selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ReporterType {
    List,
    Null,
}

pub struct NullReporter;

#[async_trait::async_trait]
impl Reporter for NullReporter {}

#[allow(clippy::vec_box)]
pub struct ListReporter {
    terminal: Term,
    buffer: HashMap<(ProjectName, String), Vec<Box<http::Log>>>,
    capture_http: bool,
}

impl ListReporter {
    pub fn new(capture_http: bool) -> ListReporter {
        ListReporter {
            terminal: Term::stdout(),
            buffer: HashMap::new(),
            capture_http,
        }
    }

    fn write_log(&self, log: &http::Log) -> eyre::Result<()> {
        write(
            &self.terminal,
            format!(" => {} {} ({:.2?})", log.request.method, log.request.url, log.elapsed),
        )?;
        write(&self.terminal, "  > request:")?;
        write(&self.terminal, "    > headers:")?;
        for (key, value) in &log.request.headers {
            write(&self.terminal, format!("       > {key}: {value}"))?;
        }
        if let Some(body) = &log.request.body {
            write(&self.terminal, format!("    > body: {body}"))?;
        }
        match log.response.status {
            Some(status) => write(&self.terminal, format!("  < response {status}"))?,
            None => write(&self.terminal, "  < no response")?,
        }
        write(&self.terminal, "    < headers:")?;
        for (key, value) in &log.response.headers {
            write(&self.terminal, format!("       < {key}: {value}"))?;
        }
        write(&self.terminal, format!("    < body: {}", log.response.body))
    }
}

#[async_trait::async_trait]
impl Reporter for ListReporter {
    async fn on_start(&mut self, project_name: ProjectName, info: ScenarioInfo) -> eyre::Result<()> {
        self.buffer.insert((project_name, info.name), Vec::new());
        Ok(())
    }

    async fn on_http_call(
        &mut self,
        project_name: ProjectName,
        info: ScenarioInfo,
        log: Box<http::Log>,
    ) -> eyre::Result<()> {
        if self.capture_http {
            self.buffer
                .get_mut(&(project_name, info.name.clone()))
                .ok_or_else(|| eyre::eyre!("scenario \"{}\" not found in the buffer", info.name))?
                .push(log);
        }
        Ok(())
    }

    async fn on_end(&mut self, project_name: ProjectName, report: ScenarioReport) -> eyre::Result<()> {
        let ScenarioReport { info, outcome, .. } = report;

        // skipped scenarios have no buffer entry
        let http_logs = self
            .buffer
            .remove(&(project_name.clone(), info.name.clone()))
            .unwrap_or_default();
        for log in http_logs {
            self.write_log(&log)?;
        }

        match outcome {
            Outcome::Succeeded => {
                let status = style("✓").green();
                self.terminal
                    .write_line(&format!("{status} [{project_name}] {}", info.name))?;
            }
            Outcome::Skipped => {
                let status = style("-").dim();
                self.terminal
                    .write_line(&format!("{status} [{project_name}] {} (skipped)", info.name))?;
            }
            Outcome::Failed(Failure::Assertions(failures)) => {
                let status = style("✘").red();
                self.terminal.write_line(&format!(
                    "{status} [{project_name}] {}: {} assertion(s) failed",
                    info.name,
                    failures.len()
                ))?;
                for failure in failures {
                    self.terminal.write_line(&format!("    {failure}"))?;
                }
            }
            Outcome::Failed(e) => {
                let status = style("✘").red();
                self.terminal
                    .write_line(&format!("{status} [{project_name}] {}: {e}", info.name))?;
            }
        }

        Ok(())
    }

    async fn on_finish(&mut self, project_name: ProjectName, summary: Summary) -> eyre::Result<()> {
        let line = format!("[{project_name}] {summary}");
        let line = if summary.failed == 0 {
            style(line).green().bold()
        } else {
            style(line).red().bold()
        };
        self.terminal.write_line(&format!("{line}"))?;
        Ok(())
    }
}

fn write(term: &Term, s: impl AsRef<str>) -> eyre::Result<()> {
    let colored = style(s.as_ref()).dim();
    term.write_line(&format!("{colored}"))
        .wrap_err("failed to write character on terminal")
}
