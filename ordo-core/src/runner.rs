/// ordo's scenario sequencer
use futures::FutureExt;
use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    assertion::{self, AssertionFailure},
    config::ProjectConfig,
    error::{ConfigError, Result},
    field::FieldPath,
    http::{self, HttpClient, ResponseRecord, Transport, TransportError},
    reporter::Reporter,
    request::{BuildError, Endpoint},
    scenario::{Order, Scenario, Variables},
    ProjectName,
};

#[derive(Debug, Clone)]
pub enum Message {
    Start(ProjectName, ScenarioInfo),
    HttpLog(ProjectName, ScenarioInfo, Box<http::Log>),
    End(ProjectName, ScenarioReport),
    Finish(ProjectName, Summary),
}

/// Identity of a scenario within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioInfo {
    pub order: Order,
    pub name: String,
}

impl From<&Scenario> for ScenarioInfo {
    fn from(scenario: &Scenario) -> Self {
        ScenarioInfo {
            order: scenario.order,
            name: scenario.name.clone(),
        }
    }
}

/// Life cycle of one scenario within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Dispatched,
    Succeeded,
    Failed,
    Skipped,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeeded | State::Failed | State::Skipped)
    }

    fn advance(&mut self, next: State) {
        debug_assert!(!self.is_terminal(), "{self:?} is terminal, cannot move to {next:?}");
        *self = next;
    }
}

/// Why a scenario failed. None of these abort the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Failure {
    #[error("encoding: {0}")]
    Encoding(String),
    #[error("transport: {0}")]
    Transport(TransportError),
    #[error("{} assertion(s) failed", .0.len())]
    Assertions(Vec<AssertionFailure>),
    #[error("unresolved variable(s): {}", .0.join(", "))]
    UnresolvedVariable(Vec<String>),
    #[error("extraction: {}", .0.join("; "))]
    Extraction(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded,
    Failed(Failure),
    /// Filtered out by name or by the project's `scenario_ignore`.
    Skipped,
}

impl Outcome {
    pub fn state(&self) -> State {
        match self {
            Outcome::Succeeded => State::Succeeded,
            Outcome::Failed(_) => State::Failed,
            Outcome::Skipped => State::Skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub info: ScenarioInfo,
    pub outcome: Outcome,
    /// Status of the response, when one arrived.
    pub status: Option<u16>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped in {:.2?}",
            self.succeeded, self.failed, self.skipped, self.elapsed
        )
    }
}

/// Ordered outcomes of one run, plus the variables it left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub project: ProjectName,
    pub scenarios: Vec<ScenarioReport>,
    pub variables: Variables,
    pub summary: Summary,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn failed(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.scenarios
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Failed(_)))
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.info.name == name)
    }
}

/// Scenario filter trait.
pub trait Filter {
    fn filter(&self, project: &ProjectConfig, info: &ScenarioInfo) -> bool;
}

/// Filter scenarios by name. A template name selects all of its expansions.
pub struct ScenarioNameFilter<'a> {
    names: &'a [String],
}

impl<'a> ScenarioNameFilter<'a> {
    pub fn new(names: &'a [String]) -> Self {
        ScenarioNameFilter { names }
    }
}

fn name_matches(pattern: &str, name: &str) -> bool {
    name == pattern
        || name
            .strip_prefix(pattern)
            .is_some_and(|rest| rest.starts_with("::"))
}

impl Filter for ScenarioNameFilter<'_> {
    fn filter(&self, _project: &ProjectConfig, info: &ScenarioInfo) -> bool {
        if self.names.is_empty() {
            return true;
        }
        self.names.iter().any(|n| name_matches(n, &info.name))
    }
}

/// Filter out scenarios listed in the project's `scenario_ignore`.
#[derive(Default)]
pub struct ScenarioIgnoreFilter;

impl Filter for ScenarioIgnoreFilter {
    fn filter(&self, project: &ProjectConfig, info: &ScenarioInfo) -> bool {
        project
            .scenario_ignore
            .iter()
            .all(|n| !name_matches(n, &info.name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub capture_http: bool,
    pub scenario_names: Vec<String>,
}

/// Check a plan before anything is sent. Returns the scenarios sorted by order.
///
/// Every placeholder left after expansion must be written by an extraction
/// rule of a scenario that runs strictly earlier.
pub fn plan(mut scenarios: Vec<Scenario>) -> Result<Vec<Scenario>> {
    scenarios.sort_by_key(|s| s.order);

    for pair in scenarios.windows(2) {
        if pair[0].order == pair[1].order {
            return Err(ConfigError::DuplicateOrder(
                pair[0].name.clone(),
                pair[1].name.clone(),
                pair[0].order,
            )
            .into());
        }
    }

    let mut produced: HashSet<&str> = HashSet::new();
    for scenario in &scenarios {
        let missing: Vec<String> = scenario
            .placeholder_names()
            .into_iter()
            .filter(|name| !produced.contains(name.as_str()))
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingBinding {
                scenario: scenario.name.clone(),
                names: missing,
            }
            .into());
        }
        produced.extend(scenario.extract.iter().map(|rule| rule.variable.as_str()));
    }

    Ok(scenarios)
}

pub struct Sequencer {
    project: Arc<ProjectConfig>,
    transport: Arc<dyn Transport>,
    options: Options,
    reporters: Vec<Box<dyn Reporter + 'static + Send>>,
}

impl Sequencer {
    pub fn new(project: Arc<ProjectConfig>, transport: Arc<dyn Transport>) -> Sequencer {
        Sequencer {
            project,
            transport,
            options: Options::default(),
            reporters: Vec::new(),
        }
    }

    /// Sequencer sending over an [`HttpClient`] configured by `project`.
    pub fn with_http(project: Arc<ProjectConfig>) -> Sequencer {
        let client = HttpClient::from_project(&project);
        Sequencer::new(project, Arc::new(client))
    }

    pub fn capture_http(&mut self) {
        self.options.capture_http = true;
    }

    /// Run only scenarios whose names (or template names) are listed.
    pub fn select(&mut self, names: Vec<String>) {
        self.options.scenario_names = names;
    }

    pub fn add_reporter(&mut self, reporter: impl Reporter + 'static + Send) {
        self.reporters.push(Box::new(reporter));
    }

    pub fn add_boxed_reporter(&mut self, reporter: Box<dyn Reporter + 'static + Send>) {
        self.reporters.push(reporter);
    }

    /// Hand the installed reporters over, e.g. to the next project's sequencer.
    pub fn into_reporters(self) -> Vec<Box<dyn Reporter + 'static + Send>> {
        self.reporters
    }

    /// Run `scenarios` in ascending order against the project's endpoint.
    ///
    /// Only configuration problems are errors; every scenario-level failure
    /// is recorded in the returned report and the run goes on.
    pub async fn run(&mut self, scenarios: Vec<Scenario>) -> Result<RunReport> {
        let endpoint = self.project.endpoint()?;
        let scenarios = plan(scenarios)?;
        info!(
            "running {} scenario(s) of project \"{}\" against {endpoint}",
            scenarios.len(),
            self.project.name
        );

        let (tx, _) = broadcast::channel(1000);
        let mut reporters = std::mem::take(&mut self.reporters);
        let reporter_futures = futures::future::join_all(
            reporters
                .iter_mut()
                .map(|reporter| reporter.run(tx.subscribe()).boxed()),
        );

        let this = &*self;
        let run = async move {
            let report = this.execute(&endpoint, &scenarios, &tx).await;
            publish(
                &tx,
                Message::Finish(report.project.clone(), report.summary),
            );
            // dropping the sender closes the channel so reporters can stop
            drop(tx);
            report
        };

        let (report, results) = tokio::join!(run, reporter_futures);
        for result in results {
            if let Err(e) = result {
                error!("reporter failed: {e:#}");
            }
        }
        self.reporters = reporters;

        debug!("sequencer stopped");
        Ok(report)
    }

    async fn execute(
        &self,
        endpoint: &Endpoint,
        scenarios: &[Scenario],
        tx: &broadcast::Sender<Message>,
    ) -> RunReport {
        let started = tokio::time::Instant::now();
        let project = self.project.name.clone();
        let name_filter = ScenarioNameFilter::new(&self.options.scenario_names);
        let ignore_filter = ScenarioIgnoreFilter;

        let mut variables = Variables::new();
        let mut reports = Vec::with_capacity(scenarios.len());
        let mut summary = Summary::default();

        for scenario in scenarios {
            let info = ScenarioInfo::from(scenario);
            let selected = name_filter.filter(&self.project, &info)
                && ignore_filter.filter(&self.project, &info);

            let report = if selected {
                publish(tx, Message::Start(project.clone(), info.clone()));
                self.execute_one(endpoint, scenario, &mut variables, tx)
                    .await
            } else {
                debug!("{} skipped", info.name);
                ScenarioReport {
                    info,
                    outcome: Outcome::Skipped,
                    status: None,
                    elapsed: Duration::ZERO,
                }
            };

            match &report.outcome {
                Outcome::Succeeded => summary.succeeded += 1,
                Outcome::Failed(_) => summary.failed += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
            publish(tx, Message::End(project.clone(), report.clone()));
            reports.push(report);
        }

        summary.elapsed = started.elapsed();
        RunReport {
            project,
            scenarios: reports,
            variables,
            summary,
        }
    }

    async fn execute_one(
        &self,
        endpoint: &Endpoint,
        scenario: &Scenario,
        variables: &mut Variables,
        tx: &broadcast::Sender<Message>,
    ) -> ScenarioReport {
        let info = ScenarioInfo::from(scenario);
        let started = tokio::time::Instant::now();
        let mut state = State::Pending;

        let finish = |outcome: Outcome, status: Option<u16>| {
            match &outcome {
                Outcome::Failed(failure) => debug!("{} failed: {failure}", info.name),
                _ => debug!("{} ok", info.name),
            }
            ScenarioReport {
                info: info.clone(),
                outcome,
                status,
                elapsed: started.elapsed(),
            }
        };

        let unresolved: Vec<String> = scenario
            .placeholder_names()
            .into_iter()
            .filter(|name| !variables.contains(name))
            .collect();
        if !unresolved.is_empty() {
            state.advance(State::Failed);
            return finish(Outcome::Failed(Failure::UnresolvedVariable(unresolved)), None);
        }

        let lookup = |name: &str| variables.get(name);
        let request = match scenario.request.build(endpoint, &lookup) {
            Ok(request) => request,
            Err(BuildError::MissingBinding(names)) => {
                state.advance(State::Failed);
                return finish(Outcome::Failed(Failure::UnresolvedVariable(names)), None);
            }
            Err(BuildError::Encoding(e)) => {
                state.advance(State::Failed);
                return finish(Outcome::Failed(Failure::Encoding(e)), None);
            }
        };
        let assertions: Vec<_> = scenario.assertions.iter().map(|a| a.resolve(&lookup)).collect();

        state.advance(State::Dispatched);
        let http_channel = Arc::new(Mutex::new(Some(broadcast::channel(100).0)));
        let (result, logs) = http::CHANNEL
            .scope(http_channel, async {
                let mut http_rx = http::subscribe().ok();
                let result = self.transport.send(&request).await;
                let mut logs = Vec::new();
                while let Some(Ok(log)) = http_rx.as_mut().map(|rx| rx.try_recv()) {
                    logs.push(log);
                }
                (result, logs)
            })
            .await;
        if self.options.capture_http {
            for log in logs {
                publish(
                    tx,
                    Message::HttpLog(self.project.name.clone(), info.clone(), Box::new(log)),
                );
            }
        }

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                state.advance(State::Failed);
                return finish(Outcome::Failed(Failure::Transport(e)), None);
            }
        };
        let record = ResponseRecord::from(raw);
        let status = Some(record.status);

        let matched = assertion::evaluate(&assertions, &record);
        if !matched.is_success() {
            state.advance(State::Failed);
            return finish(Outcome::Failed(Failure::Assertions(matched.failures)), status);
        }

        let extracted = match extract(scenario, &record) {
            Ok(extracted) => extracted,
            Err(problems) => {
                state.advance(State::Failed);
                return finish(Outcome::Failed(Failure::Extraction(problems)), status);
            }
        };
        for (variable, value) in extracted {
            trace!("{variable} = {value}");
            variables.insert(variable, value);
        }

        state.advance(State::Succeeded);
        finish(Outcome::Succeeded, status)
    }
}

/// Resolve every extraction rule; all of them or none.
fn extract(
    scenario: &Scenario,
    record: &ResponseRecord,
) -> std::result::Result<Vec<(String, serde_json::Value)>, Vec<String>> {
    let mut values = Vec::new();
    let mut problems = Vec::new();

    for rule in &scenario.extract {
        let path = match rule.path.parse::<FieldPath>() {
            Ok(path) => path,
            Err(e) => {
                problems.push(format!("invalid field path \"{}\": {e}", rule.path));
                continue;
            }
        };
        match record.body.as_ref().and_then(|doc| path.resolve(doc)) {
            Some(value) => values.push((rule.variable.clone(), value.into_owned())),
            None => problems.push(format!(
                "field \"{}\" for variable \"{}\" not found",
                rule.path, rule.variable
            )),
        }
    }

    if problems.is_empty() {
        Ok(values)
    } else {
        Err(problems)
    }
}

fn publish(tx: &broadcast::Sender<Message>, msg: Message) {
    // no subscriber simply means no reporter is installed
    if tx.send(msg).is_err() {
        trace!("no reporter is listening");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        assertion::{Assertion, Predicate, Violation},
        expand::{expand, ParameterSet},
        http::RawResponse,
        request::{ExecutableRequest, RequestBuilder},
        Error,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    type Handler =
        dyn Fn(&ExecutableRequest) -> std::result::Result<RawResponse, TransportError> + Send + Sync;

    /// Transport answering from a closure and remembering what was sent.
    struct MockTransport {
        handler: Box<Handler>,
        sent: Mutex<Vec<ExecutableRequest>>,
    }

    impl MockTransport {
        fn new(
            handler: impl Fn(&ExecutableRequest) -> std::result::Result<RawResponse, TransportError>
                + Send
                + Sync
                + 'static,
        ) -> Arc<MockTransport> {
            Arc::new(MockTransport {
                handler: Box::new(handler),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent_paths(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|r| format!("{} {}", r.method, r.url.path()))
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn send(
            &self,
            request: &ExecutableRequest,
        ) -> std::result::Result<RawResponse, TransportError> {
            self.sent.lock().unwrap().push(request.clone());
            (self.handler)(request)
        }
    }

    fn ok(status: u16, body: serde_json::Value) -> std::result::Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status,
            headers: Default::default(),
            body: body.to_string(),
        })
    }

    fn project(base_url: &str) -> Arc<ProjectConfig> {
        let mut project = ProjectConfig {
            name: "default".into(),
            ..Default::default()
        };
        project
            .data
            .insert("base_url".into(), toml::Value::String(base_url.into()));
        Arc::new(project)
    }

    fn create_pet() -> Scenario {
        Scenario::new(
            1,
            "create_pet",
            RequestBuilder::post("/pet").body(r#"{"id": 0, "name": "doggie"}"#),
        )
        .expect(Assertion::status(200))
        .expect(Assertion::field_eq("name", "doggie"))
        .extract("id", "petId")
    }

    fn update_pet() -> Scenario {
        Scenario::new(
            2,
            "update_pet",
            RequestBuilder::put("/pet/{petId}").body(r#"{"id": {petId}, "name": "EuroDog"}"#),
        )
        .expect(Assertion::status(200))
        .expect(Assertion::field_eq("name", "EuroDog"))
    }

    fn pet_store(create_status: u16) -> Arc<MockTransport> {
        MockTransport::new(move |req| match (req.method, req.url.path()) {
            (crate::request::Method::Post, "/v2/pet") => {
                ok(create_status, json!({"id": 9216678377732767000u64, "name": "doggie"}))
            }
            (crate::request::Method::Put, "/v2/pet/9216678377732767000") => {
                ok(200, json!({"id": 9216678377732767000u64, "name": "EuroDog"}))
            }
            _ => ok(404, json!({"code": 404})),
        })
    }

    #[tokio::test]
    async fn extracted_variable_flows_into_later_scenario() -> eyre::Result<()> {
        let transport = pet_store(200);
        let mut sequencer = Sequencer::new(project("https://petstore.test/v2"), transport.clone());

        // declared out of order on purpose
        let report = sequencer.run(vec![update_pet(), create_pet()]).await?;

        assert!(report.is_success(), "{report:#?}");
        assert_eq!(
            transport.sent_paths(),
            vec!["POST /v2/pet", "PUT /v2/pet/9216678377732767000"]
        );
        assert_eq!(
            report.variables.get("petId"),
            Some(&json!(9216678377732767000u64))
        );
        let sent = transport.sent.lock().unwrap();
        assert_eq!(
            sent[1].body.as_deref(),
            Some(br#"{"id": 9216678377732767000, "name": "EuroDog"}"#.as_slice())
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_producer_makes_consumer_unresolved() -> eyre::Result<()> {
        let transport = pet_store(500);
        let mut sequencer = Sequencer::new(project("https://petstore.test/v2"), transport.clone());

        let report = sequencer.run(vec![create_pet(), update_pet()]).await?;

        assert!(!report.is_success());
        assert_eq!(transport.sent_paths(), vec!["POST /v2/pet"]);
        assert!(matches!(
            report.scenarios[0].outcome,
            Outcome::Failed(Failure::Assertions(_))
        ));
        assert_eq!(
            report.scenarios[1].outcome,
            Outcome::Failed(Failure::UnresolvedVariable(vec!["petId".into()]))
        );
        assert!(report.variables.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn run_continues_after_failure_and_keeps_order() -> eyre::Result<()> {
        let transport = MockTransport::new(|req| match req.url.path() {
            "/v2/broken" => Err(TransportError::Timeout(Duration::from_secs(30))),
            _ => ok(200, json!({"code": 200, "message": "ok"})),
        });
        let mut sequencer = Sequencer::new(project("https://petstore.test/v2"), transport.clone());

        let scenarios = vec![
            Scenario::new(3, "third", RequestBuilder::get("/c")).expect(Assertion::status(200)),
            Scenario::new(1, "first", RequestBuilder::get("/broken")),
            Scenario::new(2, "second", RequestBuilder::get("/b"))
                .expect(Assertion::field_eq("message", "ok")),
        ];
        let report = sequencer.run(scenarios).await?;

        let names: Vec<_> = report.scenarios.iter().map(|s| s.info.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(
            report.scenarios[0].outcome,
            Outcome::Failed(Failure::Transport(TransportError::Timeout(
                Duration::from_secs(30)
            )))
        );
        assert_eq!(report.scenarios[1].outcome, Outcome::Succeeded);
        assert_eq!(report.scenarios[2].outcome, Outcome::Succeeded);
        assert_eq!(
            report.summary,
            Summary {
                elapsed: report.summary.elapsed,
                succeeded: 2,
                failed: 1,
                skipped: 0,
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn every_assertion_failure_is_reported() -> eyre::Result<()> {
        let transport = MockTransport::new(|_| ok(200, json!({"name": "doggie", "status": []})));
        let mut sequencer = Sequencer::new(project("https://petstore.test"), transport);

        let scenario = Scenario::new(1, "find", RequestBuilder::get("/pet/findByStatus"))
            .expect(Assertion::status(201))
            .expect(Assertion::field_eq("name", "rex"))
            .expect(Assertion::non_empty("status"))
            .expect(Assertion::all("status", Predicate::Equals(json!("pending"))));
        let report = sequencer.run(vec![scenario]).await?;

        let Outcome::Failed(Failure::Assertions(failures)) = &report.scenarios[0].outcome else {
            panic!("unexpected outcome: {:?}", report.scenarios[0].outcome);
        };
        let violations: Vec<_> = failures.iter().map(|f| f.violation.clone()).collect();
        assert_eq!(
            violations,
            vec![
                Violation::StatusMismatch {
                    expected: 201,
                    actual: 200
                },
                Violation::Mismatch {
                    path: "name".into(),
                    expected: json!("rex"),
                    actual: json!("doggie"),
                },
                Violation::EmptyList {
                    path: "status".into()
                },
            ]
        );
        assert_eq!(report.scenarios[0].status, Some(200));
        Ok(())
    }

    #[tokio::test]
    async fn missing_binding_aborts_before_dispatch() -> eyre::Result<()> {
        let transport = MockTransport::new(|_| ok(200, json!({})));
        let mut sequencer = Sequencer::new(project("https://petstore.test"), transport.clone());

        let result = sequencer
            .run(vec![
                Scenario::new(1, "fine", RequestBuilder::get("/ok")),
                Scenario::new(2, "delete_user", RequestBuilder::delete("/user/{username}")),
            ])
            .await;

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingBinding { ref scenario, ref names }))
                if scenario == "delete_user" && names == &vec!["username".to_string()]
        ));
        assert!(transport.sent_paths().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn consumer_ordered_before_producer_is_configuration_error() {
        let transport = MockTransport::new(|_| ok(200, json!({})));
        let mut sequencer = Sequencer::new(project("https://petstore.test"), transport);

        let mut early_update = update_pet();
        early_update.order = Order::new(0);
        let result = sequencer.run(vec![create_pet(), early_update]).await;
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingBinding { .. }))
        ));
    }

    #[tokio::test]
    async fn empty_endpoint_and_duplicate_order_are_fatal() {
        let transport = MockTransport::new(|_| ok(200, json!({})));

        let mut sequencer = Sequencer::new(project(""), transport.clone());
        assert!(matches!(
            sequencer.run(vec![create_pet()]).await,
            Err(Error::Config(ConfigError::EmptyEndpoint))
        ));

        let mut sequencer = Sequencer::new(project("https://petstore.test"), transport);
        let result = sequencer
            .run(vec![
                Scenario::new(1, "a", RequestBuilder::get("/a")),
                Scenario::new(1, "b", RequestBuilder::get("/b")),
            ])
            .await;
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::DuplicateOrder(..)))
        ));
    }

    #[tokio::test]
    async fn encoding_error_fails_only_that_scenario() -> eyre::Result<()> {
        let transport = MockTransport::new(|_| ok(200, json!({})));
        let mut sequencer = Sequencer::new(project("https://petstore.test"), transport.clone());

        let report = sequencer
            .run(vec![
                Scenario::new(1, "broken_body", RequestBuilder::post("/pet").body("{\"name\": ")),
                Scenario::new(2, "fine", RequestBuilder::get("/pet/1")),
            ])
            .await?;

        assert!(matches!(
            report.scenarios[0].outcome,
            Outcome::Failed(Failure::Encoding(_))
        ));
        assert_eq!(report.scenarios[1].outcome, Outcome::Succeeded);
        assert_eq!(transport.sent_paths(), vec!["GET /pet/1"]);
        Ok(())
    }

    #[tokio::test]
    async fn serialized_body_braces_are_data() -> eyre::Result<()> {
        let transport = MockTransport::new(|_| ok(200, json!({"name": "{rex}"})));
        let mut sequencer = Sequencer::new(project("https://petstore.test"), transport.clone());

        let scenario = Scenario::new(1, "create", RequestBuilder::post("/pet").json(&json!({"name": "{rex}"})))
            .expect(Assertion::field_eq("name", "{{rex}"));
        let report = sequencer.run(vec![scenario]).await?;

        assert_eq!(report.scenarios[0].outcome, Outcome::Succeeded);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].body.as_deref(), Some(br#"{"name":"{rex}"}"#.as_slice()));
        Ok(())
    }

    #[tokio::test]
    async fn missing_extraction_field_writes_nothing() -> eyre::Result<()> {
        let transport = MockTransport::new(|_| ok(200, json!({"name": "doggie"})));
        let mut sequencer = Sequencer::new(project("https://petstore.test"), transport);

        let scenario = Scenario::new(1, "create", RequestBuilder::post("/pet").body("{}"))
            .extract("name", "petName")
            .extract("id", "petId");
        let report = sequencer.run(vec![scenario]).await?;

        assert!(matches!(
            report.scenarios[0].outcome,
            Outcome::Failed(Failure::Extraction(ref problems)) if problems.len() == 1
        ));
        assert!(report.variables.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn filters_skip_scenarios() -> eyre::Result<()> {
        let transport = MockTransport::new(|_| ok(200, json!([{"status": "sold"}])));
        let mut project = (*project("https://petstore.test")).clone();
        project.scenario_ignore = vec!["find::sold".into()];
        let mut sequencer = Sequencer::new(Arc::new(project), transport.clone());
        sequencer.select(vec!["find".into()]);

        let template = Scenario::new(
            1,
            "find",
            RequestBuilder::get("/pet/findByStatus").query("status", "{status}"),
        )
        .expect(Assertion::all("status", Predicate::Equals(json!("{status}"))));
        let mut scenarios = expand(&template, &ParameterSet::values("status", ["pending", "sold"]))?;
        scenarios.push(Scenario::new(2, "other", RequestBuilder::get("/other")));

        let report = sequencer.run(scenarios).await?;
        let outcomes: Vec<_> = report.scenarios.iter().map(|s| s.outcome.state()).collect();
        assert_eq!(outcomes, vec![State::Failed, State::Skipped, State::Skipped]);
        assert_eq!(transport.sent_paths(), vec!["GET /pet/findByStatus"]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_expansion_is_a_no_op() -> eyre::Result<()> {
        let transport = MockTransport::new(|_| ok(200, json!({})));
        let mut sequencer = Sequencer::new(project("https://petstore.test"), transport.clone());

        let template = Scenario::new(1, "find", RequestBuilder::get("/x/{status}"));
        let scenarios = expand(&template, &ParameterSet::values("status", Vec::<String>::new()))?;
        let report = sequencer.run(scenarios).await?;

        assert!(report.is_success());
        assert!(report.scenarios.is_empty());
        assert!(transport.sent_paths().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn runs_do_not_share_variables() -> eyre::Result<()> {
        // the pet store accepts the first creation only
        let created = std::sync::atomic::AtomicBool::new(false);
        let transport = MockTransport::new(move |req| match req.url.path() {
            "/v2/pet" if !created.swap(true, std::sync::atomic::Ordering::SeqCst) => {
                ok(200, json!({"id": 7, "name": "doggie"}))
            }
            "/v2/pet" => ok(500, json!({"code": 500})),
            _ => ok(200, json!({"id": 7, "name": "EuroDog"})),
        });
        let mut sequencer = Sequencer::new(project("https://petstore.test/v2"), transport.clone());

        let first = sequencer.run(vec![create_pet(), update_pet()]).await?;
        assert!(first.is_success(), "{first:#?}");
        assert_eq!(first.variables.get("petId"), Some(&json!(7)));

        let second = sequencer.run(vec![create_pet(), update_pet()]).await?;
        assert!(second.variables.is_empty());
        assert_eq!(
            second.scenarios[1].outcome,
            Outcome::Failed(Failure::UnresolvedVariable(vec!["petId".into()]))
        );
        assert_eq!(
            transport.sent_paths(),
            vec!["POST /v2/pet", "PUT /v2/pet/7", "POST /v2/pet"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn over_real_http() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/v2/pet")
            .with_status(200)
            .with_body(r#"{"id": 42, "name": "doggie", "status": "available"}"#)
            .expect(1)
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/v2/pet/42")
            .match_body(mockito::Matcher::PartialJsonString(r#"{"id": 42}"#.into()))
            .with_status(200)
            .with_body(r#"{"id": 42, "name": "EuroDog", "status": "pending"}"#)
            .expect(1)
            .create_async()
            .await;

        let mut sequencer = Sequencer::with_http(project(&format!("{}/v2", server.url())));
        sequencer.capture_http();
        let report = sequencer.run(vec![create_pet(), update_pet()]).await?;

        create.assert_async().await;
        update.assert_async().await;
        assert!(report.is_success(), "{report:#?}");
        assert_eq!(report.variables.get("petId"), Some(&json!(42)));
        Ok(())
    }
}
