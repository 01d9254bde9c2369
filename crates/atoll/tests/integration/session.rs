use atoll::{
    Error, Interpreter, PERSIST_STATE_FN, Phase, Progress, RESTORE_STATE_FN, ScriptError, Session,
    SessionOptions,
};
use serde_json::json;

use super::common::{CycleSpec, SessionEngine};

fn session(cycles: impl IntoIterator<Item = CycleSpec>) -> Session<SessionEngine> {
    Session::new(Interpreter::new(SessionEngine::new(cycles)))
}

#[tokio::test]
async fn state_round_trips_across_runs() -> anyhow::Result<()> {
    let engine = SessionEngine::new([
        CycleSpec {
            expect_restored: Some(json!({})),
            persist: Some(json!({"x": 42})),
            ..CycleSpec::default()
        },
        CycleSpec {
            expect_restored: Some(json!({"x": 42})),
            persist: Some(json!({"x": 42})),
            result: Ok(json!(43)),
            ..CycleSpec::default()
        },
    ]);
    let programs = engine.programs();
    let mut session = Session::new(Interpreter::new(engine));

    let result = session.run("x = 42").await?;
    assert_eq!(result.value, json!(null));
    assert_eq!(session.state().get("x"), Some(&json!(42)));

    let result = session.run("x + 1").await?;
    assert_eq!(result.value, json!(43));

    let programs = programs.lock().expect("programs lock");
    let first = &programs[0];
    assert!(first.code.contains("__vars__[\"x\"] = x"));
    assert_eq!(first.external_functions[..2], [RESTORE_STATE_FN, PERSIST_STATE_FN]);
    let second = &programs[1];
    assert!(second.code.contains("x = __state__[\"x\"]"));
    assert!(second.code.contains("__result__ = (x + 1)"));
    Ok(())
}

#[tokio::test]
async fn cleared_state_fails_like_an_undefined_name() -> anyhow::Result<()> {
    let mut session = session([
        CycleSpec {
            persist: Some(json!({"x": 1})),
            ..CycleSpec::default()
        },
        CycleSpec {
            expect_restored: Some(json!({})),
            persist: None,
            result: Err(ScriptError::new("NameError: name 'x' is not defined")
                .with_exc_type("NameError")),
            ..CycleSpec::default()
        },
    ]);

    session.run("x = 1").await?;
    assert!(!session.state().is_empty());
    session.clear_state();
    assert!(session.state().is_empty());

    let error = session.run("x").await.unwrap_err();
    let Error::Script(script) = error else {
        panic!("expected a script error");
    };
    assert_eq!(script.exc_type.as_deref(), Some("NameError"));
    Ok(())
}

#[tokio::test]
async fn trailing_expression_is_the_observed_result() -> anyhow::Result<()> {
    let engine = SessionEngine::new([
        CycleSpec {
            persist: Some(json!({"y": 1})),
            result: Ok(json!(2)),
            ..CycleSpec::default()
        },
        CycleSpec {
            expect_restored: Some(json!({"y": 1})),
            persist: Some(json!({"y": 2})),
            result: Ok(json!(null)),
            ..CycleSpec::default()
        },
    ]);
    let programs = engine.programs();
    let mut session = Session::new(Interpreter::new(engine));

    let result = session.run("y = 1\ny + 1").await?;
    assert_eq!(result.value, json!(2));

    // A trailing assignment is a statement: the engine's own no-value
    // convention applies, and no capture machinery is emitted.
    let result = session.run("y = 1\ny = 2").await?;
    assert_eq!(result.value, json!(null));

    let programs = programs.lock().expect("programs lock");
    assert!(programs[0].code.contains("__result__ = (y + 1)"));
    assert!(!programs[1].code.contains("__result__"));
    Ok(())
}

#[tokio::test]
async fn non_representable_values_are_dropped_silently() -> anyhow::Result<()> {
    // The script defines both x and a lambda; only x survives the wire, and
    // the next cycle's restored state no longer contains the dropped name.
    let mut session = session([
        CycleSpec {
            persist: Some(json!({"x": 42})),
            ..CycleSpec::default()
        },
        CycleSpec {
            expect_restored: Some(json!({"x": 42})),
            result: Ok(json!(42)),
            ..CycleSpec::default()
        },
    ]);

    session.run("x = 42\nf = lambda: 1").await?;
    assert_eq!(session.state().len(), 1);
    assert_eq!(session.state().get("x"), Some(&json!(42)));

    let result = session.run("x").await?;
    assert_eq!(result.value, json!(42));
    Ok(())
}

#[tokio::test]
async fn machinery_temporaries_never_enter_state() -> anyhow::Result<()> {
    let mut session = session([CycleSpec {
        persist: Some(json!({"x": 1, "_tmp": 2, "__result__": 3})),
        ..CycleSpec::default()
    }]);

    session.run("x = 1").await?;
    assert_eq!(session.state().len(), 1);
    assert_eq!(session.state().get("x"), Some(&json!(1)));
    Ok(())
}

#[tokio::test]
async fn unexpected_external_call_surfaces_as_script_error() -> anyhow::Result<()> {
    let mut session = session([CycleSpec {
        external_call: Some("fetch".to_string()),
        persist: Some(json!({"x": 9})),
        ..CycleSpec::default()
    }]);

    let error = session.run("x = fetch()").await.unwrap_err();
    let Error::Script(script) = error else {
        panic!("expected a script error");
    };
    assert!(
        script.message.contains("unexpected external function call: fetch"),
        "got: {}",
        script.message
    );
    // The cycle failed, so nothing was committed.
    assert!(session.state().is_empty());
    Ok(())
}

#[tokio::test]
async fn futures_pause_is_rejected_in_single_shot_mode() -> anyhow::Result<()> {
    let mut session = session([CycleSpec {
        futures_ids: Some(vec![4, 5]),
        ..CycleSpec::default()
    }]);

    let error = session.run("await gather()").await.unwrap_err();
    let Error::Script(script) = error else {
        panic!("expected a script error");
    };
    assert!(
        script.message.contains("unexpected external function call"),
        "got: {}",
        script.message
    );
    Ok(())
}

#[tokio::test]
async fn iterative_mode_surfaces_only_caller_calls() -> anyhow::Result<()> {
    let engine = SessionEngine::new([CycleSpec {
        expect_restored: Some(json!({})),
        external_call: Some("fetch".to_string()),
        persist: Some(json!({"n": 7})),
        result: Ok(json!("done")),
        ..CycleSpec::default()
    }]);
    let mut session = Session::with_options(
        Interpreter::new(engine),
        SessionOptions {
            external_functions: vec!["fetch".to_string()],
            ..SessionOptions::default()
        },
    );

    // The restore pause is answered internally; the first thing the caller
    // sees is its own external call.
    let progress = session.start("n = fetch()\n'done'").await?;
    let Progress::Pending(call) = progress else {
        anyhow::bail!("expected the caller's external call");
    };
    assert_eq!(call.function_name, "fetch");

    // Resuming drains the persist pause internally and completes.
    let progress = session.resume(json!(7)).await?;
    let Progress::Complete(result) = progress else {
        anyhow::bail!("expected completion");
    };
    assert_eq!(result.value, json!("done"));
    assert_eq!(session.state().get("n"), Some(&json!(7)));
    Ok(())
}

#[tokio::test]
async fn session_never_disposes_the_interpreter() -> anyhow::Result<()> {
    let mut session = session([CycleSpec::default()]);
    session.run("x = 1").await?;

    let interp = session.into_inner();
    assert_eq!(interp.phase(), Phase::Idle);
    Ok(())
}
