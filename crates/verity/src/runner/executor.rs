//! Scenario execution: Idle -> Running -> Completed | Aborted.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::config::RunnerConfig;
use super::outcome::{RunResult, RunnerState, StepFailure, StepOutcome, StepStatus};
use crate::action::{ActionExecutor, ActionKind};
use crate::assertion::{AssertionEngine, AssertionOutcome, Subject};
use crate::driver::{PageDriver, PageOptions, SessionDriver};
use crate::evidence::{file_stem, unique_stems, EvidenceCapture, EvidenceRecord, FAILURE_LABEL};
use crate::locator::{ElementRef, Locator, Resolution};
use crate::result::{VerityError, VerityResult};
use crate::scenario::{Scenario, Step, StepKind};
use crate::wait::Waiter;

/// Time a step may run past its own timeout before the driver is abandoned
const STEP_GRACE: Duration = Duration::from_millis(250);

/// How a step ended
#[derive(Debug)]
enum Verdict {
    Pass(Option<String>),
    Fail(StepFailure),
    Fatal(VerityError),
}

/// Mutable state of one run; turned into a [`RunResult`] exactly once
#[derive(Debug)]
struct Run {
    run_id: Uuid,
    scenario: String,
    total_steps: usize,
    state: RunnerState,
    outcomes: Vec<StepOutcome>,
    evidence: Vec<EvidenceRecord>,
    abort_reason: Option<String>,
    started_at: DateTime<Utc>,
    deadline: Option<Instant>,
    bindings: HashMap<String, Resolution>,
    capture: EvidenceCapture,
}

impl Run {
    fn new(scenario: &Scenario, run_id: Uuid, config: &RunnerConfig, evidence_stem: &str) -> Self {
        Self {
            run_id,
            scenario: scenario.name.clone(),
            total_steps: scenario.steps.len(),
            state: RunnerState::Idle,
            outcomes: Vec::with_capacity(scenario.steps.len()),
            evidence: Vec::new(),
            abort_reason: None,
            started_at: Utc::now(),
            deadline: config.run_deadline.map(|d| Instant::now() + d),
            bindings: HashMap::new(),
            capture: EvidenceCapture::new(&config.output_dir, evidence_stem),
        }
    }

    fn enter(&mut self, next: RunnerState) {
        if self.state.can_transition_to(next) {
            debug!(from = %self.state, to = %next, "state transition");
            self.state = next;
        } else {
            warn!(from = %self.state, to = %next, "ignored illegal state transition");
        }
    }

    fn abort(&mut self, reason: String) {
        error!(reason = %reason, "scenario aborted");
        self.abort_reason = Some(reason);
        self.enter(RunnerState::Aborted);
    }

    fn record(
        &mut self,
        index: usize,
        step: &Step,
        status: StepStatus,
        detail: Option<String>,
        elapsed: Duration,
    ) {
        self.outcomes.push(StepOutcome {
            index,
            name: step.label(),
            step_type: step.kind.type_name().to_string(),
            soft: step.soft,
            status,
            detail,
            duration_ms: elapsed.as_millis() as u64,
        });
    }

    fn skip_from(&mut self, scenario: &Scenario, start: usize) {
        for (index, step) in scenario.steps.iter().enumerate().skip(start) {
            self.record(index, step, StepStatus::Skipped, None, Duration::ZERO);
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn binding(&self, name: &str) -> VerityResult<&Resolution> {
        self.bindings
            .get(name)
            .ok_or_else(|| VerityError::UnknownBinding {
                name: name.to_string(),
            })
    }

    fn element(&self, name: &str, nth: usize) -> VerityResult<&ElementRef> {
        let resolution = self.binding(name)?;
        resolution.refs.get(nth).ok_or_else(|| {
            VerityError::unavailable(format!(
                "'{name}' matched {} element(s), no element at index {nth}",
                resolution.len()
            ))
        })
    }

    fn finish(mut self) -> RunResult {
        if self.state == RunnerState::Running {
            self.enter(RunnerState::Completed);
        }
        RunResult {
            scenario: self.scenario,
            run_id: self.run_id,
            state: self.state,
            total_steps: self.total_steps,
            outcomes: self.outcomes,
            evidence: self.evidence,
            abort_reason: self.abort_reason,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Executes scenarios, one browsing session per run
#[derive(Debug, Clone, Default)]
pub struct ScenarioRunner {
    config: RunnerConfig,
}

impl ScenarioRunner {
    /// Create a runner
    #[must_use]
    pub const fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Runner configuration
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `scenario` on `session`, which the runner owns and closes exactly once
    ///
    /// # Errors
    ///
    /// Only [`VerityError::InvalidScenario`]: everything that goes wrong
    /// during the run is recorded in the returned [`RunResult`].
    pub async fn run<S>(&self, scenario: &Scenario, session: S) -> VerityResult<RunResult>
    where
        S: SessionDriver,
    {
        self.run_as(scenario, session, &file_stem(&scenario.name))
            .await
    }

    /// [`Self::run`] with evidence files named after `evidence_stem`
    async fn run_as<S>(
        &self,
        scenario: &Scenario,
        mut session: S,
        evidence_stem: &str,
    ) -> VerityResult<RunResult>
    where
        S: SessionDriver,
    {
        if let Err(e) = scenario.validate() {
            if let Err(close) = session.close().await {
                warn!(error = %close, "session close failed");
            }
            return Err(e);
        }
        let run_id = Uuid::new_v4();
        let span = info_span!("scenario", name = %scenario.name, run_id = %run_id);
        Ok(self
            .execute(scenario, session, run_id, evidence_stem)
            .instrument(span)
            .await)
    }

    /// Run many scenarios, up to `jobs` at a time, each on a session from `launch`
    ///
    /// Results come back in input order. A session that fails to launch
    /// yields an Aborted result for that scenario. Repeated scenario names
    /// get distinct evidence files (`home_shot.png`, `home_2_shot.png`).
    pub async fn run_many<F, Fut, S>(
        &self,
        scenarios: &[Scenario],
        jobs: usize,
        launch: F,
    ) -> Vec<VerityResult<RunResult>>
    where
        F: Fn(&Scenario) -> Fut,
        Fut: Future<Output = VerityResult<S>>,
        S: SessionDriver,
    {
        let stems = unique_stems(scenarios.iter().map(|s| s.name.as_str()));
        stream::iter(scenarios.iter().zip(stems))
            .map(|(scenario, stem)| {
                let launch = &launch;
                async move {
                    if let Err(e) = scenario.validate() {
                        return Err(e);
                    }
                    match launch(scenario).await {
                        Ok(session) => self.run_as(scenario, session, &stem).await,
                        Err(e) => {
                            error!(scenario = %scenario.name, error = %e, "session launch failed");
                            Ok(RunResult::launch_failed(
                                &scenario.name,
                                scenario.steps.len(),
                                &e,
                            ))
                        }
                    }
                }
            })
            .buffered(jobs.max(1))
            .collect()
            .await
    }

    async fn execute<S>(
        &self,
        scenario: &Scenario,
        mut session: S,
        run_id: Uuid,
        evidence_stem: &str,
    ) -> RunResult
    where
        S: SessionDriver,
    {
        let mut run = Run::new(scenario, run_id, &self.config, evidence_stem);
        let options = PageOptions {
            viewport: scenario.viewport.unwrap_or(self.config.viewport),
            javascript_enabled: scenario.javascript,
        };
        info!(
            steps = scenario.steps.len(),
            base_url = %scenario.base_url,
            viewport = %options.viewport,
            "scenario started"
        );

        match session.new_page(&options).await {
            Ok(mut page) => {
                run.enter(RunnerState::Running);
                self.drive(scenario, &mut page, &mut run).await;
                match timeout(self.config.step_timeout, page.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "page close failed"),
                    Err(_) => warn!("page close did not finish"),
                }
            }
            Err(e) => run.abort(format!("could not open page: {e}")),
        }
        match timeout(self.config.step_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "session close failed"),
            Err(_) => warn!("session close did not finish"),
        }

        let result = run.finish();
        let counts = result.counts();
        info!(
            state = %result.state,
            passed = counts.passed,
            failed = counts.failed,
            skipped = counts.skipped,
            "scenario finished"
        );
        result
    }

    async fn drive<P>(&self, scenario: &Scenario, page: &mut P, run: &mut Run)
    where
        P: PageDriver + ?Sized,
    {
        for (index, step) in scenario.steps.iter().enumerate() {
            if run.deadline_passed() {
                self.capture_failure(page, run).await;
                run.abort(format!("run deadline passed before step {}", index + 1));
                return;
            }

            let started = Instant::now();
            debug!(step = index + 1, kind = step.kind.type_name(), label = %step.label(), "step started");
            let limit = self.step_limit(run, &step.kind);
            let verdict = match timeout(limit, self.perform(scenario, page, run, &step.kind)).await
            {
                Ok(Ok(verdict)) => verdict,
                Ok(Err(e)) if e.is_fatal() => Verdict::Fatal(e),
                Ok(Err(e)) => Verdict::Fail(StepFailure::from(&e)),
                Err(_) => {
                    warn!(step = index + 1, ms = limit.as_millis() as u64, "driver did not answer");
                    if run.deadline_passed() {
                        Verdict::Fatal(VerityError::Timeout {
                            ms: limit.as_millis() as u64,
                            waited_for: format!("step {} before the run deadline", index + 1),
                        })
                    } else {
                        Verdict::Fail(StepFailure::from(&VerityError::Timeout {
                            ms: limit.as_millis() as u64,
                            waited_for: format!("{} step to finish", step.kind.type_name()),
                        }))
                    }
                }
            };
            let elapsed = started.elapsed();

            match verdict {
                Verdict::Pass(detail) => {
                    info!(step = index + 1, label = %step.label(), ms = elapsed.as_millis() as u64, "step passed");
                    run.record(index, step, StepStatus::Passed, detail, elapsed);
                }
                Verdict::Fail(failure) if step.soft => {
                    warn!(step = index + 1, label = %step.label(), failure = %failure, "soft step failed");
                    run.record(index, step, StepStatus::Failed(failure), None, elapsed);
                }
                Verdict::Fail(failure) => {
                    error!(step = index + 1, label = %step.label(), failure = %failure, "step failed");
                    run.record(index, step, StepStatus::Failed(failure), None, elapsed);
                    self.capture_failure(page, run).await;
                    run.skip_from(scenario, index + 1);
                    return;
                }
                Verdict::Fatal(err) => {
                    run.record(
                        index,
                        step,
                        StepStatus::Failed(StepFailure::from(&err)),
                        None,
                        elapsed,
                    );
                    self.capture_failure(page, run).await;
                    run.abort(err.to_string());
                    return;
                }
            }
        }
    }

    async fn capture_failure<P>(&self, page: &P, run: &mut Run)
    where
        P: PageDriver + ?Sized,
    {
        if !self.config.capture_on_failure {
            return;
        }
        match timeout(
            self.config.step_timeout,
            run.capture.capture(page, FAILURE_LABEL, true),
        )
        .await
        {
            Ok(Some(record)) => run.evidence.push(record),
            Ok(None) => {}
            Err(_) => warn!("failure capture did not finish"),
        }
    }

    /// Hard bound on one step: its own timeout, clipped to the run deadline, plus a grace period
    fn step_limit(&self, run: &Run, kind: &StepKind) -> Duration {
        let own = match kind {
            StepKind::Navigate { timeout_ms, .. } => *timeout_ms,
            StepKind::Wait { policy, .. } => policy.timeout_ms(),
            _ => None,
        };
        self.budget(run, own) + STEP_GRACE
    }

    /// Step timeout clipped to the run deadline
    fn budget(&self, run: &Run, timeout_ms: Option<u64>) -> Duration {
        let timeout = timeout_ms.map_or(self.config.step_timeout, Duration::from_millis);
        run.deadline.map_or(timeout, |deadline| {
            timeout.min(deadline.saturating_duration_since(Instant::now()))
        })
    }

    async fn perform<P>(
        &self,
        scenario: &Scenario,
        page: &mut P,
        run: &mut Run,
        kind: &StepKind,
    ) -> VerityResult<Verdict>
    where
        P: PageDriver + ?Sized,
    {
        match kind {
            StepKind::Navigate { path, timeout_ms } => {
                let url = scenario.url(path);
                page.goto(&url, self.budget(run, *timeout_ms)).await?;
                Ok(Verdict::Pass(Some(url)))
            }
            StepKind::Wait { policy, bind } => {
                let waiter = Waiter::new(self.config.wait_options()).with_deadline(run.deadline);
                let result = waiter.wait(policy, &*page, run.run_id).await?;
                if !result.is_satisfied() {
                    return Err(VerityError::Timeout {
                        ms: result.elapsed.as_millis() as u64,
                        waited_for: result.waited_for,
                    });
                }
                let detail = format!(
                    "{} after {}ms",
                    result.waited_for,
                    result.elapsed.as_millis()
                );
                if let Some(bind) = bind {
                    run.bindings
                        .insert(bind.clone(), result.found.unwrap_or_default());
                }
                Ok(Verdict::Pass(Some(detail)))
            }
            StepKind::Locate { bind, locator } => {
                let resolution = locator.resolve(&*page, run.run_id).await?;
                let detail = describe_matches(locator, &resolution);
                debug!(bind = %bind, matches = resolution.len(), "bound");
                run.bindings.insert(bind.clone(), resolution);
                Ok(Verdict::Pass(Some(detail)))
            }
            StepKind::Act {
                action,
                target,
                nth,
            } => {
                let element = match target {
                    Some(name) => Some(run.element(name, *nth)?),
                    None => None,
                };
                let action = match action {
                    ActionKind::Navigate { url } => ActionKind::Navigate {
                        url: scenario.url(url),
                    },
                    other => other.clone(),
                };
                ActionExecutor::new(run.run_id, self.budget(run, None))
                    .perform(page, &action, element)
                    .await?;
                Ok(Verdict::Pass(None))
            }
            StepKind::Assert {
                condition,
                target,
                locator,
                nth,
            } => {
                let fresh;
                let subject = match (target, locator) {
                    (Some(name), _) => Subject::Elements {
                        refs: &run.binding(name)?.refs,
                        nth: *nth,
                    },
                    (None, Some(locator)) => {
                        fresh = locator.resolve(&*page, run.run_id).await?;
                        Subject::Elements {
                            refs: &fresh.refs,
                            nth: *nth,
                        }
                    }
                    (None, None) => Subject::Page,
                };
                match AssertionEngine::new(run.run_id)
                    .check(&*page, condition, subject)
                    .await?
                {
                    AssertionOutcome::Pass => Ok(Verdict::Pass(None)),
                    AssertionOutcome::Fail { actual, expected } => {
                        Ok(Verdict::Fail(StepFailure::assertion(actual, expected)))
                    }
                }
            }
            StepKind::Capture { label, full_page } => {
                let detail = match run.capture.capture(&*page, label, *full_page).await {
                    Some(record) => {
                        let path = record.image_path.display().to_string();
                        run.evidence.push(record);
                        path
                    }
                    None => "capture failed".to_string(),
                };
                Ok(Verdict::Pass(Some(detail)))
            }
        }
    }
}

fn describe_matches(locator: &Locator, resolution: &Resolution) -> String {
    match resolution.strategy {
        Some(index) if locator.strategies.len() > 1 => format!(
            "{} match(es) via strategy #{} ({})",
            resolution.len(),
            index + 1,
            locator
                .strategies
                .get(index)
                .map(ToString::to_string)
                .unwrap_or_default()
        ),
        _ => format!("{} match(es)", resolution.len()),
    }
}
