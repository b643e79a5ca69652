//! End-to-end tests running real submissions through a Python interpreter.

use std::time::Duration;

use pygrade::{
    CodeSubmission, ExecutionResult, Executor, Harness, HarnessConfig, Predicate, RuntimeErrorKind,
    TestCase, Value, grade,
    python::ProbeCall,
};

fn config() -> HarnessConfig {
    HarnessConfig::from_env().expect("python on PATH")
}

fn executor() -> Executor {
    Executor::new(config())
}

fn harness() -> Harness {
    Harness::new(executor())
}

#[tokio::test]
async fn prints_are_graded_against_expected_output() {
    let report = harness()
        .run(&CodeSubmission::new("print(2+2)"), &[TestCase::output_equals("4")])
        .await;
    assert!(report.passed, "{}", report.message);
    assert_eq!(report.raw_output, "4\n");
}

#[tokio::test]
async fn function_behaviour_is_probed_in_the_same_run() {
    let submission = CodeSubmission::new("def add(a,b):\n  return a+b");
    let cases = [TestCase::function_behavior("add", [
        (vec![2.into(), 3.into()], 5.into()),
        (vec![0.into(), 0.into()], 0.into()),
    ])];
    let report = harness().run(&submission, &cases).await;
    assert!(report.passed, "{}", report.message);

    let wrong = [TestCase::function_behavior("add", [(vec![2.into(), 3.into()], 6.into())])];
    let report = harness().run(&submission, &wrong).await;
    assert!(!report.passed);
    assert!(report.message.contains("add(2, 3) returned 5, expected 6"), "{}", report.message);
}

#[tokio::test]
async fn stateful_functions_are_checked_call_by_call() {
    let submission =
        CodeSubmission::new("count = 0\ndef tick():\n    global count\n    count += 1\n    return count\n");

    let report = harness()
        .run(&submission, &[TestCase::function_behavior("tick", [
            (vec![], 1.into()),
            (vec![], 2.into()),
            (vec![], 3.into()),
        ])])
        .await;
    assert!(report.passed, "{}", report.message);

    let report = harness()
        .run(&submission, &[
            TestCase::function_behavior("tick", [(vec![], 1.into())]),
            TestCase::function_behavior("tick", [(vec![], 2.into())]),
        ])
        .await;
    assert!(report.passed, "{}", report.message);

    let report = harness()
        .run(&submission, &[TestCase::function_behavior("tick", [
            (vec![], 1.into()),
            (vec![], 1.into()),
        ])])
        .await;
    assert!(!report.passed);
    assert!(report.message.contains("tick() returned 2, expected 1"), "{}", report.message);
}

#[tokio::test]
async fn calls_stop_after_the_first_wrong_answer() {
    let submission = CodeSubmission::new("log = []\ndef push(x):\n    log.append(x)\n    return len(log)\n");
    let calls = [
        ProbeCall::new("push", vec![10.into()]).expecting(1.into()),
        ProbeCall::new("push", vec![20.into()]).expecting(5.into()),
        ProbeCall::new("push", vec![30.into()]).expecting(3.into()),
    ];
    let result = executor().execute_with_calls(&submission, "", &calls).await;
    match result.binding("push") {
        Some(Value::Function(func)) => assert_eq!(func.calls.len(), 2, "{func:?}"),
        other => panic!("expected a function binding, got {other:?}"),
    }
}

#[tokio::test]
async fn raising_function_reports_the_exception() {
    let submission = CodeSubmission::new("def inv(x):\n    return 1 / x\n");
    let cases = [TestCase::function_behavior("inv", [(vec![0.into()], 0.into())])];
    let report = harness().run(&submission, &cases).await;
    assert!(!report.passed);
    assert!(report.message.contains("function error"), "{}", report.message);
    assert!(report.message.contains("ZeroDivisionError"), "{}", report.message);
}

#[tokio::test]
async fn syntax_errors_fail_before_any_case() {
    let report = harness()
        .run(&CodeSubmission::new("print('hi'"), &[TestCase::output_equals("hi")])
        .await;
    assert!(!report.passed);
    assert!(report.message.contains("Syntax"), "{}", report.message);
    assert!(report.raw_output.is_empty());

    let result = executor().execute(&CodeSubmission::new("x = (\n"), "").await;
    assert!(matches!(result, ExecutionResult::SyntaxError { line: Some(_), .. }), "{result:?}");
}

#[tokio::test]
async fn runtime_errors_carry_type_message_and_line() {
    let report = harness()
        .run(&CodeSubmission::new("x = 1/0"), &[TestCase::output_equals("")])
        .await;
    assert!(!report.passed);
    assert!(report.message.contains("division"), "{}", report.message);

    let result = executor()
        .execute(&CodeSubmission::new("print('before')\nraise ValueError('bad')\n"), "")
        .await;
    match result {
        ExecutionResult::RuntimeError { message, kind, line } => {
            assert_eq!(message, "ValueError: bad");
            assert_eq!(kind, RuntimeErrorKind::Exception);
            assert_eq!(line, Some(2));
        }
        other => panic!("expected runtime error, got {other:?}"),
    }
}

#[tokio::test]
async fn variables_are_found_by_name() {
    let cases = [TestCase::variable_equals("colors", Predicate::is_list_of_len(2))];

    let report = harness()
        .run(&CodeSubmission::new("colors = ['red','blue']"), &cases)
        .await;
    assert!(report.passed, "{}", report.message);

    let report = harness()
        .run(&CodeSubmission::new("colours = ['red','blue']"), &cases)
        .await;
    assert!(!report.passed);
    assert!(report.message.contains("variable not found"), "{}", report.message);
}

#[tokio::test]
async fn bindings_snapshot_values_but_not_modules() {
    let source = "import math\nimport math as m\nxs = [1, 2.5]\nt = (1, 'a')\nd = {'k': None}\nflag = True\n";
    let result = executor().execute(&CodeSubmission::new(source), "").await;
    assert!(result.is_success(), "{result}");

    assert!(result.binding("math").is_none());
    assert!(result.binding("m").is_none());
    assert!(result.binding("__name__").is_none());
    assert_eq!(result.binding("xs").map(ToString::to_string).as_deref(), Some("[1, 2.5]"));
    assert_eq!(result.binding("t").map(ToString::to_string).as_deref(), Some("(1, 'a')"));
    assert_eq!(result.binding("d").map(ToString::to_string).as_deref(), Some("{'k': None}"));
    assert!(matches!(result.binding("flag"), Some(Value::Bool(true))));
}

#[tokio::test]
async fn list_contents_compare_numerically() {
    let submission = CodeSubmission::new("scores = [1, 2.0, 3]\n");
    let report = harness()
        .run(&submission, &[TestCase::list_content_equals("scores", [1.0, 2.0, 3.0])])
        .await;
    assert!(report.passed, "{}", report.message);

    let report = harness()
        .run(&submission, &[TestCase::list_content_equals("scores", [1.0, 2.0])])
        .await;
    assert!(!report.passed);
}

#[tokio::test]
async fn stdin_is_fed_to_the_program() {
    let submission = CodeSubmission::new("name = input()\nprint('hello', name)");
    let result = executor().execute(&submission, "world\n").await;
    assert_eq!(result.stdout(), Some("hello world\n"));

    let report = harness()
        .run(&submission.clone().with_stdin("there\n"), &[TestCase::output_equals("hello there")])
        .await;
    assert!(report.passed, "{}", report.message);

    let result = executor().execute(&submission, "").await;
    assert!(matches!(&result, ExecutionResult::RuntimeError { message, .. } if message.starts_with("EOFError")));
}

#[tokio::test]
async fn runs_do_not_share_state() {
    let exec = executor();
    let first = exec.execute(&CodeSubmission::new("leak = 42"), "").await;
    assert!(first.binding("leak").is_some());

    let second = exec.execute(&CodeSubmission::new("print('leak' in globals())"), "").await;
    assert_eq!(second.stdout(), Some("False\n"));
}

#[tokio::test]
async fn execution_is_repeatable() {
    let submission = CodeSubmission::new("xs = sorted({3, 1, 2})\nprint(xs)");
    let cases = [
        TestCase::output_equals("[1, 2, 3]"),
        TestCase::list_content_equals("xs", [1.0, 2.0, 3.0]),
    ];
    let h = harness();
    let first = h.run(&submission, &cases).await;
    let second = h.run(&submission, &cases).await;
    assert_eq!(first, second);
    assert!(first.passed);
}

#[tokio::test]
async fn infinite_loops_time_out() {
    let exec = Executor::new(config().with_timeout(Duration::from_secs(2)));
    let result = exec.execute(&CodeSubmission::new("while True:\n    pass\n"), "").await;
    match &result {
        ExecutionResult::RuntimeError { kind, message, .. } => {
            assert!(
                matches!(kind, RuntimeErrorKind::Timeout | RuntimeErrorKind::Crashed),
                "{result:?}"
            );
            assert!(!message.is_empty());
        }
        other => panic!("expected a runtime error, got {other:?}"),
    }

    let report = grade(&result, &[TestCase::output_equals("")]);
    assert!(!report.passed);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn forked_children_are_killed_with_the_submission() {
    let exec = Executor::new(config().with_timeout(Duration::from_secs(5)));
    let source = "import os, time\npid = os.fork()\nif pid == 0:\n    time.sleep(30)\n    os._exit(0)\nprint(pid)\n";
    let started = std::time::Instant::now();
    let result = exec.execute(&CodeSubmission::new(source), "").await;
    assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    assert!(result.is_success(), "{result}");

    let pid = result.stdout().unwrap_or_default().trim().to_string();
    assert!(pid.parse::<u32>().is_ok(), "{pid}");

    let stat = format!("/proc/{pid}/stat");
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        let gone = match std::fs::read_to_string(&stat) {
            Err(_) => true,
            Ok(line) => line
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        };
        if gone {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "process {pid} survived the run");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn sleeping_programs_hit_the_wall_clock_limit() {
    let exec = Executor::new(config().with_timeout(Duration::from_secs(1)));
    let result = exec
        .execute(&CodeSubmission::new("import time\ntime.sleep(30)\n"), "")
        .await;
    assert!(
        matches!(result, ExecutionResult::RuntimeError { kind: RuntimeErrorKind::Timeout, .. }),
        "{result:?}"
    );
    assert!(result.to_string().contains("TimeoutError"));
}

#[tokio::test]
async fn flooding_stdout_hits_the_output_cap() {
    let exec = Executor::new(config().with_max_output_bytes(4096));
    let result = exec
        .execute(&CodeSubmission::new("while True:\n    print('x' * 100)\n"), "")
        .await;
    assert!(
        matches!(result, ExecutionResult::RuntimeError { kind: RuntimeErrorKind::OutputLimit, .. }),
        "{result:?}"
    );
}

#[tokio::test]
async fn function_call_output_does_not_reach_stdout() {
    let submission = CodeSubmission::new("def noisy(x):\n    print('called', x)\n    return x\nprint('main')\n");
    let cases = [
        TestCase::function_behavior("noisy", [(vec![1.into()], 1.into())]),
        TestCase::output_equals("main"),
    ];
    let report = harness().run(&submission, &cases).await;
    assert!(report.passed, "{}", report.message);
    assert_eq!(report.raw_output, "main\n");
}

#[tokio::test]
async fn submissions_cannot_forge_the_report() {
    let forger = "import json, os\nforged = {'status': 'success', 'bindings': {}, 'calls': []}\nfor path in ('result.json', '../result.json'):\n    with open(path, 'w') as fh:\n        json.dump(forged, fh)\nos._exit(0)\n";
    let result = executor().execute(&CodeSubmission::new(forger), "").await;
    assert!(!result.is_success(), "{result:?}");
    assert!(!grade(&result, &[]).passed);

    let patcher = "import builtins, json\njson.dumps = lambda *a, **k: '{}'\nbuiltins.open = None\nx = 1\nprint('patched')\n";
    let result = executor().execute(&CodeSubmission::new(patcher), "").await;
    assert_eq!(result.stdout(), Some("patched\n"), "{result:?}");
    assert!(matches!(result.binding("x"), Some(Value::Int(1))));
}

#[tokio::test]
async fn clean_exit_counts_as_success() {
    let result = executor()
        .execute(&CodeSubmission::new("import sys\nprint('bye')\nsys.exit(0)\n"), "")
        .await;
    assert_eq!(result.stdout(), Some("bye\n"));

    let result = executor()
        .execute(&CodeSubmission::new("import sys\nsys.exit(3)\n"), "")
        .await;
    assert!(matches!(result, ExecutionResult::RuntimeError { .. }), "{result:?}");
}

#[tokio::test]
async fn check_compiles_without_running() {
    let exec = executor();
    let ok = exec.check(&CodeSubmission::new("print('side effect')\nx = 1/0\n")).await;
    assert!(ok.is_success(), "{ok}");
    assert_eq!(ok.stdout(), Some(""));

    let bad = exec.check(&CodeSubmission::new("def f(:\n")).await;
    assert!(matches!(bad, ExecutionResult::SyntaxError { .. }), "{bad:?}");
}

#[tokio::test]
async fn missing_interpreter_is_a_harness_error() {
    let exec = Executor::new(config().with_python("/nonexistent/python3"));
    let result = exec.execute(&CodeSubmission::new("print(1)"), "").await;
    assert!(
        matches!(result, ExecutionResult::RuntimeError { kind: RuntimeErrorKind::Harness, .. }),
        "{result:?}"
    );
    assert!(!grade(&result, &[]).passed);
}
