use clap::{Arg, ArgAction, Command as ClapCommand};
use console::Term;
use itertools::Itertools;
use ordo_core::{
    http::HttpClient,
    runner::{self, Filter, ScenarioIgnoreFilter, ScenarioInfo, Sequencer},
    ProjectConfig, Scenario,
};
use std::{
    collections::{HashMap, VecDeque},
    str::FromStr,
    sync::Arc,
};
use tracing::*;

use crate::{get_ordo_config, ListReporter, NullReporter, Reporter, ReporterType};

/// Build the CLI with clap's builder pattern
fn build_cli<'a>(third_party_reporters: impl Iterator<Item = &'a String>) -> ClapCommand {
    let mut reporter_choices: VecDeque<_> = third_party_reporters.map(|s| s.to_string()).collect();
    reporter_choices.push_front(ReporterType::Null.to_string());
    reporter_choices.push_front(ReporterType::List.to_string());
    ClapCommand::new("ordo")
        .about("ordo CLI lists and runs ordered WebAPI acceptance scenarios")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .subcommand(
            ClapCommand::new("test")
                .about("Run scenarios once per project")
                .arg(Arg::new("capture-http")
                    .long("capture-http")
                    .help("Capture http debug logs")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("capture-rust")
                    .long("capture-rust")
                    .help("Capture \"tracing\" based logs, filtered by RUST_LOG. Useful when ordo fails unexpectedly and you would want to see its internal logs")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("projects")
                    .short('p')
                    .long("projects")
                    .help("Specify projects to run in comma-separated string. --projects dev --projects staging")
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("scenarios")
                    .short('s')
                    .long("scenarios")
                    .help("Specify scenarios to run in comma-separated string. A template name selects all of its rows. e.g. --scenarios create_pet,login")
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("reporters")
                    .long("reporters")
                    .help(format!("Specify the reporters to use in comma-separated string. Default is \"list\". [possible values: {}]", reporter_choices.into_iter().join(", ")))
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("color")
                    .long("color")
                    .help("Produce color output. Default is \"auto\" [env: CARGO_TERM_COLOR]")
                    .value_parser(["auto", "always", "never"]))
                .arg(Arg::new("show-sensitive")
                    .long("show-sensitive")
                    .help("Do not mask credentials and tokens in captured http logs")
                    .action(ArgAction::SetTrue))
        )
        .subcommand(
            ClapCommand::new("ls")
                .about("List scenarios in execution order")
        )
}

/// ordo CLI.
#[derive(Default)]
pub struct App {
    third_party_reporters: HashMap<String, Box<dyn Reporter + 'static + Send>>,
}

impl App {
    pub fn new() -> App {
        App {
            third_party_reporters: HashMap::new(),
        }
    }

    /// Install a third-party reporter.
    pub fn install_reporter(
        &mut self,
        name: impl Into<String>,
        reporter: impl Reporter + 'static + Send,
    ) {
        self.third_party_reporters
            .insert(name.into(), Box::new(reporter));
    }

    /// Parse command-line args and run ordo CLI sub command.
    pub async fn run(mut self, scenarios: Vec<Scenario>) -> eyre::Result<()> {
        let matches = build_cli(self.third_party_reporters.keys()).get_matches();
        color_eyre::install()?;

        let cfg = get_ordo_config();
        let term = Term::stdout();

        match matches.subcommand() {
            Some(("test", test_matches)) => {
                let capture_http = test_matches.get_flag("capture-http");
                let capture_rust = test_matches.get_flag("capture-rust");
                let show_sensitive = test_matches.get_flag("show-sensitive");
                let projects = test_matches
                    .get_many::<String>("projects")
                    .map(|vals| vals.cloned().collect::<Vec<_>>())
                    .unwrap_or_default();
                let selected = test_matches
                    .get_many::<String>("scenarios")
                    .map(|vals| vals.cloned().collect::<Vec<_>>())
                    .unwrap_or_default();
                let reporters_arg = test_matches
                    .get_many::<String>("reporters")
                    .map(|vals| vals.cloned().collect::<Vec<_>>())
                    .unwrap_or_else(|| vec![ReporterType::List.to_string()]);
                let color_command = test_matches
                    .get_one::<String>("color")
                    .and_then(|s| Color::from_str(s).ok());

                if capture_rust {
                    tracing_subscriber::fmt()
                        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                        .init();
                }
                apply_color(color_command);

                let mut reporters = std::mem::take(&mut self.third_party_reporters);
                reporters.extend([
                    (
                        ReporterType::Null.to_string(),
                        Box::new(NullReporter),
                    ),
                    (
                        ReporterType::List.to_string(),
                        Box::new(ListReporter::new(capture_http)),
                    ),
                ]
                    as [(String, Box<dyn Reporter + 'static + Send>); 2]);
                let mut installed = Vec::new();
                for reporter in reporters_arg {
                    installed.push(
                        reporters
                            .remove(&reporter)
                            .ok_or_else(|| eyre::eyre!("Unknown reporter: {reporter}"))?,
                    );
                }

                let mut failed = 0;
                for project in select_projects(&cfg.projects, &projects)? {
                    let client = HttpClient::from_project(&project).show_sensitive(show_sensitive);
                    let mut sequencer = Sequencer::new(project, Arc::new(client));
                    if capture_http {
                        sequencer.capture_http();
                    }
                    sequencer.select(selected.clone());
                    for reporter in installed.drain(..) {
                        sequencer.add_boxed_reporter(reporter);
                    }

                    // every project starts from an empty variable store
                    let report = sequencer.run(scenarios.clone()).await?;
                    failed += report.summary.failed;
                    installed = sequencer.into_reporters();
                }

                if failed > 0 {
                    eyre::bail!("{failed} scenario(s) failed");
                }
                Ok(())
            }
            Some(("ls", _)) => {
                let filter = ScenarioIgnoreFilter;
                let planned = runner::plan(scenarios)?;
                for project in &cfg.projects {
                    term.write_line(&format!("* {}", project.name))?;
                    for scenario in &planned {
                        let info = ScenarioInfo::from(scenario);
                        let mark = if filter.filter(project, &info) {
                            ""
                        } else {
                            " (ignored)"
                        };
                        term.write_line(&format!(
                            "  - [{}] {}{mark}",
                            scenario.order, scenario.name
                        ))?;
                    }
                }

                Ok(())
            }
            _ => unreachable!("Subcommand required is set to true"),
        }
    }
}

/// Projects named on the command line, or all of them when none is named.
fn select_projects(
    projects: &[Arc<ProjectConfig>],
    names: &[String],
) -> eyre::Result<Vec<Arc<ProjectConfig>>> {
    if names.is_empty() {
        return Ok(projects.to_vec());
    }
    names
        .iter()
        .map(|name| {
            projects
                .iter()
                .find(|p| &p.name == name)
                .cloned()
                .ok_or_else(|| eyre::eyre!("project \"{name}\" is not configured"))
        })
        .collect()
}

fn apply_color(color_command: Option<Color>) {
    let color_env = std::env::var("CARGO_TERM_COLOR");
    let color = match (color_command, color_env) {
        (color @ Some(Color::Always), _) => color,
        (color @ Some(Color::Never), _) => color,
        (None, Ok(color)) => Color::from_str(&color).ok(),
        _ => None,
    };
    debug!("color mode: {color:?}");
    match color {
        Some(Color::Always) => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        Some(Color::Never) => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Default, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}
