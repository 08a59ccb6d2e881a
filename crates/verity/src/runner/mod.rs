//! Scenario Runner
//!
//! Composes waits, actions, assertions and evidence capture into an ordered
//! run over one browsing session:
//!
//! ```text
//! Idle ──new page──► Running ──all steps / hard failure──► Completed
//!   │                   │
//!   └──launch failed────┴──session crash / navigation failure / deadline──► Aborted
//! ```
//!
//! The session is closed exactly once on entering a terminal state.

mod config;
mod executor;
mod outcome;

pub use config::{RunnerConfig, RunnerConfigBuilder, DEFAULT_OUTPUT_DIR};
pub use executor::ScenarioRunner;
pub use outcome::{RunResult, RunnerState, StepCounts, StepFailure, StepOutcome, StepStatus};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::assertion::Condition;
    use crate::driver::mock::{
        MockEffect, MockElement, MockReaction, MockRoute, MockSession, MockSite, Trigger,
    };
    use crate::driver::Viewport;
    use crate::locator::Selector;
    use crate::result::{ErrorKind, VerityError};
    use crate::scenario::{Scenario, Step};
    use crate::wait::WaitPolicy;
    use std::time::Duration;
    use tempfile::TempDir;

    const BASE: &str = "http://app.test";

    fn site() -> MockSite {
        MockSite::new()
            .with_route(
                "http://app.test/",
                MockRoute::new("Home | Glossa")
                    .element(
                        MockElement::new("menu", "button")
                            .with_label("Open main menu")
                            .max_width(768),
                    )
                    .element(MockElement::new("drawer", "nav").hidden())
                    .reaction(MockReaction::new(
                        Trigger::Click,
                        "menu",
                        vec![MockEffect::Show {
                            element: "drawer".into(),
                        }],
                    )),
            )
            .with_route(
                "http://app.test/signin",
                MockRoute::new("Sign in")
                    .element(
                        MockElement::new("password", "input")
                            .with_attr("type", "password"),
                    )
                    .element(MockElement::new("toggle", "button").with_label("Show password"))
                    .reaction(MockReaction::new(
                        Trigger::Click,
                        "toggle",
                        vec![
                            MockEffect::SetAttribute {
                                element: "password".into(),
                                name: "type".into(),
                                value: "text".into(),
                            },
                            MockEffect::SetAttribute {
                                element: "toggle".into(),
                                name: "aria-label".into(),
                                value: "Hide password".into(),
                            },
                        ],
                    )),
            )
            .with_route(
                "http://app.test/interprestudy",
                MockRoute::new("InterpreStudy")
                    .busy_for(3)
                    .element(MockElement::new("terms", "button").with_role("tab").with_text("Terms"))
                    .reaction(MockReaction::new(
                        Trigger::Click,
                        "terms",
                        vec![MockEffect::Insert {
                            element: MockElement::new("lookup", "h2")
                                .with_text("Terminology Lookup"),
                        }],
                    )),
            )
            .with_route(
                "http://app.test/busy",
                MockRoute::new("Busy")
                    .never_idle()
                    .element(MockElement::new("terms", "button").with_role("tab").with_text("Terms")),
            )
            .with_route(
                "http://app.test/fragile",
                MockRoute::new("Fragile")
                    .element(MockElement::new("boom", "button").with_text("Boom"))
                    .reaction(MockReaction::new(
                        Trigger::Click,
                        "boom",
                        vec![MockEffect::Crash {
                            message: "renderer process gone".into(),
                        }],
                    )),
            )
            .with_route(
                "http://app.test/stuck",
                MockRoute::new("Stuck")
                    .blocking_queries()
                    .element(MockElement::new("menu", "button").with_label("Open main menu")),
            )
    }

    fn runner(dir: &TempDir) -> ScenarioRunner {
        ScenarioRunner::new(
            RunnerConfig::builder()
                .output_dir(dir.path())
                .step_timeout(Duration::from_secs(2))
                .poll_interval(Duration::from_millis(5))
                .quiet_window(Duration::from_millis(20))
                .build(),
        )
    }

    fn example_a() -> Scenario {
        Scenario::builder("open-main-menu", BASE)
            .viewport(375, 667)
            .step(Step::navigate("/"))
            .step(Step::wait_for(
                "menu",
                Selector::role_named("button", "Open main menu"),
                5000,
            ))
            .step(Step::assert(Condition::Visible, "menu"))
            .build()
    }

    fn example_b() -> Scenario {
        Scenario::builder("signin-password-toggle", BASE)
            .step(Step::navigate("/signin"))
            .step(Step::locate("show", Selector::label("Show password")))
            .step(Step::click("show"))
            .step(Step::locate("hide", Selector::label("Hide password")))
            .step(Step::assert(Condition::Visible, "hide"))
            .step(Step::assert_at(
                Condition::AttributeEquals {
                    attribute: "type".into(),
                    expected: "text".into(),
                },
                Selector::css("input#password"),
            ))
            .build()
    }

    fn example_c(path: &str, lookup_timeout_ms: u64) -> Scenario {
        Scenario::builder("terms-tab", BASE)
            .step(Step::navigate(path))
            .step(Step::wait(WaitPolicy::network_idle(300)).soft())
            .step(Step::locate("terms", Selector::role_named("tab", "Terms")))
            .step(Step::click("terms"))
            .step(Step::wait_for(
                "lookup",
                Selector::text("Terminology Lookup"),
                lookup_timeout_ms,
            ))
            .build()
    }

    fn failure(outcome: &StepOutcome) -> &StepFailure {
        outcome.status.failure().expect("step should have failed")
    }

    // =========================================================================
    // Worked examples
    // =========================================================================

    mod example_tests {
        use super::*;

        #[tokio::test]
        async fn test_example_a_passes_on_mobile() {
            let dir = TempDir::new().unwrap();
            let result = runner(&dir)
                .run(&example_a(), MockSession::new(site()))
                .await
                .unwrap();
            assert_eq!(result.state, RunnerState::Completed);
            assert!(result.is_success(), "{result:#?}");
            assert_eq!(result.outcomes.len(), 3);
        }

        #[tokio::test]
        async fn test_example_a_fails_on_desktop() {
            let dir = TempDir::new().unwrap();
            let mut scenario = example_a();
            scenario.viewport = Some(Viewport::DESKTOP);
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert_eq!(result.state, RunnerState::Completed);
            assert!(!result.is_success());
            assert_eq!(failure(&result.outcomes[2]).kind, ErrorKind::AssertionFailed);
        }

        #[tokio::test]
        async fn test_example_a_times_out_when_absent() {
            let dir = TempDir::new().unwrap();
            let scenario = Scenario::builder("open-main-menu", BASE)
                .viewport(375, 667)
                .step(Step::navigate("/signin"))
                .step(Step::wait_for(
                    "menu",
                    Selector::role_named("button", "Open main menu"),
                    100,
                ))
                .step(Step::assert(Condition::Visible, "menu"))
                .build();
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert_eq!(failure(&result.outcomes[1]).kind, ErrorKind::TimedOut);
            assert_eq!(result.outcomes[2].status, StepStatus::Skipped);
            assert_eq!(result.exit_code(), 1);
            assert_eq!(result.evidence.len(), 1);
            assert!(dir.path().join("open-main-menu_failure.png").exists());
        }

        #[tokio::test]
        async fn test_example_b_all_pass() {
            let dir = TempDir::new().unwrap();
            let result = runner(&dir)
                .run(&example_b(), MockSession::new(site()))
                .await
                .unwrap();
            assert!(result.is_success(), "{result:#?}");
            assert!(result.outcomes.iter().all(StepOutcome::passed));
            assert!(result.evidence.is_empty());
        }

        #[tokio::test]
        async fn test_example_c_passes() {
            let dir = TempDir::new().unwrap();
            let result = runner(&dir)
                .run(&example_c("/interprestudy", 5000), MockSession::new(site()))
                .await
                .unwrap();
            assert!(result.outcomes.iter().all(StepOutcome::passed), "{result:#?}");
        }

        #[tokio::test]
        async fn test_example_c_proceeds_after_idle_timeout() {
            let dir = TempDir::new().unwrap();
            let result = runner(&dir)
                .run(&example_c("/busy", 200), MockSession::new(site()))
                .await
                .unwrap();
            let idle = &result.outcomes[1];
            assert!(idle.soft);
            assert_eq!(failure(idle).kind, ErrorKind::TimedOut);
            // next steps ran; the busy route has no reaction so the lookup never shows
            assert!(result.outcomes[2].passed());
            assert!(result.outcomes[3].passed());
            assert_eq!(failure(&result.outcomes[4]).kind, ErrorKind::TimedOut);
            assert_eq!(result.counts().soft_failed, 1);
        }

        #[tokio::test]
        async fn test_idempotent_outcomes() {
            let dir = TempDir::new().unwrap();
            let runner = runner(&dir);
            let first = runner
                .run(&example_b(), MockSession::new(site()))
                .await
                .unwrap();
            let second = runner
                .run(&example_b(), MockSession::new(site()))
                .await
                .unwrap();
            assert_ne!(first.run_id, second.run_id);
            assert_eq!(first.statuses(), second.statuses());
        }
    }

    // =========================================================================
    // Failure policy
    // =========================================================================

    mod policy_tests {
        use super::*;

        #[tokio::test]
        async fn test_soft_failure_continues() {
            let dir = TempDir::new().unwrap();
            let scenario = Scenario::builder("soft", BASE)
                .step(Step::navigate("/"))
                .step(Step::assert_page(Condition::TitleMatches {
                    pattern: "^Dashboard".into(),
                })
                .soft())
                .step(Step::assert_page(Condition::TitleMatches {
                    pattern: "Glossa".into(),
                }))
                .build();
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert!(result.is_success());
            assert_eq!(result.outcomes.len(), 3);
            let soft = failure(&result.outcomes[1]);
            assert_eq!(soft.actual.as_deref(), Some("\"Home | Glossa\""));
            assert!(result.evidence.is_empty());
        }

        #[tokio::test]
        async fn test_hard_failure_skips_rest() {
            let dir = TempDir::new().unwrap();
            let scenario = Scenario::builder("hard", BASE)
                .step(Step::navigate("/"))
                .step(Step::assert_at(Condition::CountAtLeast { n: 2 }, Selector::css("button")))
                .step(Step::capture("never"))
                .step(Step::navigate("/signin"))
                .build();
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert_eq!(result.state, RunnerState::Completed);
            assert_eq!(result.outcomes.len(), 4);
            assert_eq!(result.counts().skipped, 2);
            assert_eq!(result.hard_failures().count(), 1);
            assert!(!dir.path().join("hard_never.png").exists());
        }

        #[tokio::test]
        async fn test_stale_binding_after_navigation() {
            let dir = TempDir::new().unwrap();
            let scenario = Scenario::builder("stale", BASE)
                .step(Step::navigate("/signin"))
                .step(Step::locate("toggle", Selector::label("Show password")))
                .step(Step::navigate("/signin"))
                .step(Step::assert(Condition::Visible, "toggle").soft())
                .step(Step::click("toggle"))
                .build();
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert_eq!(failure(&result.outcomes[3]).kind, ErrorKind::StaleContext);
            assert_eq!(
                failure(&result.outcomes[4]).kind,
                ErrorKind::TargetUnavailable
            );
            assert_eq!(result.state, RunnerState::Completed);
        }

        #[tokio::test]
        async fn test_empty_locate_passes_then_act_fails() {
            let dir = TempDir::new().unwrap();
            let scenario = Scenario::builder("empty", BASE)
                .step(Step::navigate("/"))
                .step(Step::locate("ghost", Selector::text("No such thing")))
                .step(Step::assert(Condition::Hidden, "ghost"))
                .step(Step::click("ghost"))
                .build();
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert!(result.outcomes[1].passed());
            assert_eq!(result.outcomes[1].detail.as_deref(), Some("0 match(es)"));
            assert!(result.outcomes[2].passed());
            assert_eq!(
                failure(&result.outcomes[3]).kind,
                ErrorKind::TargetUnavailable
            );
        }

        #[tokio::test]
        async fn test_fallback_strategy_recorded() {
            let dir = TempDir::new().unwrap();
            let scenario = Scenario::builder("fallback", BASE)
                .step(Step::navigate("/signin"))
                .step(Step::locate(
                    "toggle",
                    crate::locator::Locator::new(Selector::exact_label("show password"))
                        .or(Selector::label("Show password")),
                ))
                .build();
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            let detail = result.outcomes[1].detail.clone().unwrap();
            assert!(detail.contains("strategy #2"), "{detail}");
        }

        #[tokio::test]
        async fn test_capture_step_records_evidence() {
            let dir = TempDir::new().unwrap();
            let scenario = Scenario::builder("Mobile nav", BASE)
                .viewport(375, 667)
                .step(Step::navigate("/"))
                .step(Step::locate("menu", Selector::label("Open main menu")))
                .step(Step::click("menu"))
                .step(Step::capture("menu open"))
                .build();
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert!(result.is_success());
            assert_eq!(result.evidence.len(), 1);
            assert!(dir.path().join("Mobile_nav_menu_open.png").exists());
        }

        #[tokio::test]
        async fn test_page_level_navigate_action_resolves_against_base() {
            let dir = TempDir::new().unwrap();
            let scenario = Scenario::builder("act-nav", BASE)
                .step(Step::navigate("/"))
                .step(Step::act(ActionKind::Navigate {
                    url: "/signin".into(),
                }))
                .step(Step::assert_page(Condition::TitleMatches {
                    pattern: "^Sign in$".into(),
                }))
                .build();
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert!(result.is_success(), "{result:#?}");
        }
    }

    // =========================================================================
    // Abort and teardown
    // =========================================================================

    mod abort_tests {
        use super::*;

        #[tokio::test]
        async fn test_session_crash_aborts() {
            let dir = TempDir::new().unwrap();
            let session = MockSession::new(site());
            let stats = session.stats();
            let scenario = Scenario::builder("crash", BASE)
                .step(Step::navigate("/fragile"))
                .step(Step::locate("boom", Selector::text("Boom")))
                .step(Step::click("boom").soft())
                .step(Step::capture("after"))
                .build();
            let result = runner(&dir).run(&scenario, session).await.unwrap();
            assert_eq!(result.state, RunnerState::Aborted);
            assert_eq!(result.outcomes.len(), 3);
            assert_eq!(failure(&result.outcomes[2]).kind, ErrorKind::SessionCrash);
            assert!(result
                .abort_reason
                .as_deref()
                .unwrap()
                .contains("renderer process gone"));
            assert_eq!(result.exit_code(), 1);
            assert_eq!(stats.page_closes(), 1);
            assert_eq!(stats.session_closes(), 1);
        }

        #[tokio::test]
        async fn test_navigation_failure_aborts_even_when_soft() {
            let dir = TempDir::new().unwrap();
            let scenario = Scenario::builder("nav", BASE)
                .step(Step::navigate("/"))
                .step(Step::navigate("/nowhere").soft())
                .step(Step::capture("after"))
                .build();
            let result = runner(&dir)
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert_eq!(result.state, RunnerState::Aborted);
            assert_eq!(result.outcomes.len(), 2);
            assert_eq!(failure(&result.outcomes[1]).kind, ErrorKind::Navigation);
            assert_eq!(result.evidence.len(), 1);
            assert_eq!(result.evidence[0].label, "failure");
        }

        #[tokio::test]
        async fn test_single_teardown_on_completion() {
            let dir = TempDir::new().unwrap();
            let session = MockSession::new(site());
            let stats = session.stats();
            runner(&dir).run(&example_b(), session).await.unwrap();
            assert_eq!(stats.pages_opened(), 1);
            assert_eq!(stats.page_closes(), 1);
            assert_eq!(stats.session_closes(), 1);
        }

        #[tokio::test]
        async fn test_page_open_failure_aborts() {
            let dir = TempDir::new().unwrap();
            let session = MockSession::new(site()).failing_new_page("target crashed");
            let stats = session.stats();
            let result = runner(&dir).run(&example_b(), session).await.unwrap();
            assert_eq!(result.state, RunnerState::Aborted);
            assert!(result.outcomes.is_empty());
            assert_eq!(stats.page_closes(), 0);
            assert_eq!(stats.session_closes(), 1);
        }

        #[tokio::test]
        async fn test_run_deadline_aborts() {
            let dir = TempDir::new().unwrap();
            let runner = ScenarioRunner::new(
                RunnerConfig::builder()
                    .output_dir(dir.path())
                    .run_deadline(Duration::from_millis(50))
                    .build(),
            );
            let scenario = Scenario::builder("deadline", BASE)
                .step(Step::navigate("/"))
                .step(Step::wait(WaitPolicy::fixed_delay(5_000)).soft())
                .step(Step::capture("late"))
                .build();
            let started = std::time::Instant::now();
            let result = runner
                .run(&scenario, MockSession::new(site()))
                .await
                .unwrap();
            assert!(started.elapsed() < Duration::from_secs(2));
            assert_eq!(result.state, RunnerState::Aborted);
            assert_eq!(result.outcomes.len(), 2);
            assert_eq!(failure(&result.outcomes[1]).kind, ErrorKind::TimedOut);
            assert!(result.abort_reason.unwrap().contains("deadline"));
        }

        #[tokio::test]
        async fn test_run_deadline_bounds_unanswered_driver_call() {
            let dir = TempDir::new().unwrap();
            let runner = ScenarioRunner::new(
                RunnerConfig::builder()
                    .output_dir(dir.path())
                    .step_timeout(Duration::from_secs(2))
                    .run_deadline(Duration::from_millis(200))
                    .build(),
            );
            let scenario = Scenario::builder("stuck", BASE)
                .step(Step::navigate("/stuck"))
                .step(Step::locate("menu", Selector::label("Open main menu")))
                .step(Step::capture("never"))
                .build();
            let session = MockSession::new(site());
            let stats = session.stats();

            let result = tokio::time::timeout(
                Duration::from_secs(3),
                runner.run(&scenario, session),
            )
            .await
            .expect("run should end soon after its deadline")
            .unwrap();

            assert_eq!(result.state, RunnerState::Aborted);
            assert_eq!(result.outcomes.len(), 2);
            assert_eq!(failure(&result.outcomes[1]).kind, ErrorKind::TimedOut);
            assert!(result.abort_reason.unwrap().contains("deadline"));
            assert_eq!(result.evidence.len(), 1);
            assert_eq!(stats.page_closes(), 1);
            assert_eq!(stats.session_closes(), 1);
        }

        #[tokio::test]
        async fn test_unanswered_driver_call_fails_step_without_deadline() {
            let dir = TempDir::new().unwrap();
            let runner = ScenarioRunner::new(
                RunnerConfig::builder()
                    .output_dir(dir.path())
                    .step_timeout(Duration::from_millis(100))
                    .build(),
            );
            let scenario = Scenario::builder("stuck", BASE)
                .step(Step::navigate("/stuck"))
                .step(Step::locate("menu", Selector::label("Open main menu")))
                .step(Step::click("menu"))
                .build();

            let result = tokio::time::timeout(
                Duration::from_secs(3),
                runner.run(&scenario, MockSession::new(site())),
            )
            .await
            .expect("step timeout should bound the locate")
            .unwrap();

            assert_eq!(result.state, RunnerState::Completed);
            assert_eq!(failure(&result.outcomes[1]).kind, ErrorKind::TimedOut);
            assert_eq!(result.outcomes[2].status, StepStatus::Skipped);
        }

        #[tokio::test]
        async fn test_invalid_scenario_rejected_and_session_closed() {
            let dir = TempDir::new().unwrap();
            let session = MockSession::new(site());
            let stats = session.stats();
            let scenario = Scenario::builder("bad", BASE)
                .step(Step::click("nothing-bound"))
                .build();
            let err = runner(&dir).run(&scenario, session).await.unwrap_err();
            assert!(matches!(err, VerityError::InvalidScenario { .. }));
            assert_eq!(stats.pages_opened(), 0);
            assert_eq!(stats.session_closes(), 1);
        }
    }

    // =========================================================================
    // Concurrent runs
    // =========================================================================

    mod many_tests {
        use super::*;

        #[tokio::test]
        async fn test_run_many_keeps_order_and_isolates_failures() {
            let dir = TempDir::new().unwrap();
            let mut down = example_b();
            down.name = "down".into();
            let scenarios = vec![example_a(), down, example_c("/interprestudy", 5000)];
            let results = runner(&dir)
                .run_many(&scenarios, 2, |scenario| {
                    let name = scenario.name.clone();
                    async move {
                        if name == "down" {
                            Err(VerityError::BrowserLaunch {
                                message: "chromium not found".into(),
                            })
                        } else {
                            Ok(MockSession::new(site()))
                        }
                    }
                })
                .await;
            assert_eq!(results.len(), 3);
            let results: Vec<RunResult> = results.into_iter().map(Result::unwrap).collect();
            assert_eq!(results[0].scenario, "open-main-menu");
            assert!(results[0].is_success());
            assert_eq!(results[1].state, RunnerState::Aborted);
            assert!(results[2].is_success());
        }

        #[tokio::test]
        async fn test_run_many_same_name_keeps_every_screenshot() {
            let dir = TempDir::new().unwrap();
            let home = Scenario::builder("home", BASE)
                .step(Step::navigate("/"))
                .step(Step::capture("shot"))
                .build();
            let results = runner(&dir)
                .run_many(&[home.clone(), home], 2, |_| async {
                    Ok(MockSession::new(site()))
                })
                .await;
            let results: Vec<RunResult> = results.into_iter().map(Result::unwrap).collect();
            let first = &results[0].evidence[0].image_path;
            let second = &results[1].evidence[0].image_path;
            assert_ne!(first, second);
            assert_eq!(first, &dir.path().join("home_shot.png"));
            assert_eq!(second, &dir.path().join("home_2_shot.png"));
            assert!(first.exists() && second.exists());

            let mut report = crate::report::RunReport::new();
            for run in results {
                report.push(run);
            }
            let logs = report.write_json_files(dir.path()).unwrap();
            assert_eq!(logs[1], dir.path().join("home_2.json"));
        }

        #[tokio::test]
        async fn test_run_many_rejects_invalid_without_launching() {
            let dir = TempDir::new().unwrap();
            let invalid = Scenario::builder("", BASE).step(Step::navigate("/")).build();
            let launched = std::sync::atomic::AtomicUsize::new(0);
            let results = runner(&dir)
                .run_many(&[invalid], 1, |_| {
                    launched.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    async { Ok(MockSession::new(site())) }
                })
                .await;
            assert!(results[0].is_err());
            assert_eq!(launched.load(std::sync::atomic::Ordering::SeqCst), 0);
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn step(choice: u8, soft: bool) -> Step {
            let step = match choice {
                0 => Step::navigate("/"),
                1 => Step::locate("menu", Selector::label("Open main menu")),
                2 => Step::click("menu"),
                3 => Step::assert_page(Condition::TitleMatches {
                    pattern: "Home".into(),
                }),
                4 => Step::assert_at(Condition::Visible, Selector::css("#missing")),
                5 => Step::wait(WaitPolicy::fixed_delay(1)),
                6 => Step::navigate("/nowhere"),
                _ => Step::capture("shot"),
            };
            if soft {
                step.soft()
            } else {
                step
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_outcomes_never_exceed_steps(
                picks in prop::collection::vec((0u8..8, any::<bool>()), 0..12)
            ) {
                let dir = TempDir::new().unwrap();
                let mut builder = Scenario::builder("prop", BASE)
                    .viewport(375, 667)
                    .step(Step::navigate("/"))
                    .step(Step::locate("menu", Selector::label("Open main menu")));
                for (choice, soft) in picks {
                    builder = builder.step(step(choice, soft));
                }
                let scenario = builder.build();
                let session = MockSession::new(site());
                let stats = session.stats();

                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let result = rt.block_on(runner(&dir).run(&scenario, session)).unwrap();

                prop_assert!(result.outcomes.len() <= scenario.steps.len());
                if result.state == RunnerState::Completed {
                    prop_assert_eq!(result.outcomes.len(), scenario.steps.len());
                }
                for (i, outcome) in result.outcomes.iter().enumerate() {
                    prop_assert_eq!(outcome.index, i);
                }
                prop_assert_eq!(stats.session_closes(), 1);
                prop_assert_eq!(stats.page_closes(), 1);
            }
        }
    }
}
