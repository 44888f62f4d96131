/// End-to-end tests for the grading pipeline
///
/// These run real learner-style submissions through the embedded interpreter:
/// 1. Passing and failing submissions produce one result per case, in order
/// 2. Compile and name-resolution failures are reported uniformly
/// 3. Runtime errors, rejected promises and timeouts stay local to one case
/// 4. Transform hooks (pre/post-processing) and their fallbacks
/// 5. Console output is captured per case and never leaks

mod grading_tests {
    use crate::executor::{run_test_cases, Grader, Submission};
    use crate::performance::analyze_performance;
    use serde_json::json;
    use tutor_common::catalog::fallback;
    use tutor_common::config::GraderConfig;
    use tutor_common::types::{GradeSummary, TestCase};

    const TWO_SUM: &str = r#"
function twoSum(nums, target) {
    const seen = new Map();
    for (let i = 0; i < nums.length; i++) {
        const need = target - nums[i];
        if (seen.has(need)) return [seen.get(need), i];
        seen.set(nums[i], i);
    }
    return [];
}
"#;

    const MERGE_LISTS: &str = r#"
function mergeTwoLists(list1, list2) {
    const dummy = new ListNode(0);
    let tail = dummy;
    while (list1 && list2) {
        if (list1.val <= list2.val) {
            tail.next = list1;
            list1 = list1.next;
        } else {
            tail.next = list2;
            list2 = list2.next;
        }
        tail = tail.next;
    }
    tail.next = list1 || list2;
    return dummy.next;
}
"#;

    fn case(input: serde_json::Value, expected: serde_json::Value) -> TestCase {
        TestCase::new(input, expected, "")
    }

    fn quiet() -> Grader {
        Grader::new(GraderConfig {
            trace_harness: false,
            ..GraderConfig::default()
        })
    }

    #[test]
    fn test_two_sum_passes() {
        let cases = fallback::test_cases("two-sum").unwrap();
        let results = run_test_cases(TWO_SUM, &cases, None, None);

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.passed));
        assert_eq!(results[0].actual.as_deref(), Some("[0,1]"));
        assert_eq!(results[0].input, r#"{"nums":[2,7,11,15],"target":9}"#);
        assert_eq!(results[0].description, "Basic case with solution at beginning");
        assert!(GradeSummary::from_results(&results).all_passed());
    }

    #[test]
    fn test_harness_trace_lines() {
        let cases = vec![case(json!({ "nums": [2, 7, 11, 15], "target": 9 }), json!([0, 1]))];
        let results = run_test_cases(TWO_SUM, &cases, None, None);

        assert_eq!(
            results[0].logs,
            vec![
                "--- Starting Test Case 1 ---",
                r#"Input parameters: {"nums":[2,7,11,15],"target":9}"#,
                "Calling function with parameters: nums, target = [2,7,11,15], 9",
                "Function returned: [0,1]",
            ]
        );
    }

    #[test]
    fn test_wrong_answer_fails_without_error() {
        let cases = vec![case(json!({ "nums": [3, 2, 4], "target": 6 }), json!([0, 2]))];
        let results = run_test_cases(TWO_SUM, &cases, None, None);

        assert!(!results[0].passed);
        assert_eq!(results[0].actual.as_deref(), Some("[1,2]"));
        assert_eq!(results[0].error, None);
    }

    #[test]
    fn test_throwing_case_does_not_stop_the_batch() {
        let source = "function check(x) { if (x === 1) throw new Error('bad input'); return x; }";
        let cases = vec![case(json!({ "x": 1 }), json!(1)), case(json!({ "x": 2 }), json!(2))];
        let results = quiet().run_test_cases(&Submission::new(source), &cases);

        let passed: Vec<bool> = results.iter().map(|r| r.passed).collect();
        assert_eq!(passed, vec![false, true]);
        assert_eq!(results[0].error.as_deref(), Some("bad input"));
        assert_eq!(results[0].execution_time_ms, 0);
        assert_eq!(results[0].actual, None);
    }

    #[test]
    fn test_console_output_is_isolated_per_case() {
        let source = "function echo(n) { console.log('seen', n); console.warn('careful'); return n; }";
        let cases = vec![case(json!({ "n": 1 }), json!(1)), case(json!({ "n": 2 }), json!(2))];
        let results = quiet().run_test_cases(&Submission::new(source), &cases);

        assert_eq!(results[0].logs, vec!["seen 1", "[warn] careful"]);
        assert_eq!(results[1].logs, vec!["seen 2", "[warn] careful"]);
    }

    #[test]
    fn test_logs_survive_a_throw() {
        let source = "function f() { console.log('before'); throw new Error('after'); }";
        let results = quiet().run_test_cases(&Submission::new(source), &[case(json!({}), json!(0))]);

        assert_eq!(results[0].logs, vec!["before"]);
        assert_eq!(results[0].error.as_deref(), Some("after"));
    }

    #[test]
    fn test_top_level_state_does_not_leak() {
        let source = "let calls = 0;\nfunction count() { calls++; return calls; }";
        let cases = vec![case(json!({}), json!(1)), case(json!({}), json!(1))];
        let results = quiet().run_test_cases(&Submission::new(source), &cases);

        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn test_compile_error_fails_every_case_identically() {
        let cases = vec![case(json!({ "x": 1 }), json!(1)), case(json!({ "x": 2 }), json!(2))];
        let results = run_test_cases("function broken(x) { return x +; }", &cases, None, None);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.passed && r.logs.is_empty()));
        assert!(results[0].error.is_some());
        assert_eq!(results[0].error, results[1].error);
        assert_eq!(results[1].test_case, 2);
    }

    #[test]
    fn test_missing_function_fails_every_case() {
        let cases = vec![case(json!(1), json!(1)), case(json!(2), json!(2))];
        let results = run_test_cases("return 42;", &cases, None, None);

        for result in &results {
            assert!(!result.passed);
            assert_eq!(
                result.error.as_deref(),
                Some("Could not find a function declaration in code: return 42;")
            );
        }
    }

    #[test]
    fn test_linked_list_transforms() {
        let problem = fallback::problem("merge-two-sorted-lists").unwrap();
        let cases = fallback::test_cases("merge-two-sorted-lists").unwrap();
        let results = run_test_cases(
            MERGE_LISTS,
            &cases,
            problem.pre_process_code.as_deref(),
            problem.post_process_code.as_deref(),
        );

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.passed), "{:?}", results);
        assert_eq!(results[0].actual.as_deref(), Some("[1,1,2,3,4,4]"));
        assert_eq!(results[1].actual.as_deref(), Some("[]"));
        assert!(results[0]
            .logs
            .contains(&"Applying pre-processing to parameter list1".to_string()));
        assert!(results[0]
            .logs
            .contains(&"Applying post-processing to result".to_string()));
    }

    #[test]
    fn test_throwing_pre_process_keeps_original_argument() {
        let submission = Submission::new("function size(items) { return items.length; }")
            .with_pre_process("function explode(arr) { throw new Error('pre failed'); }");
        let results = quiet().run_test_cases(&submission, &[case(json!({ "items": [1, 2] }), json!(2))]);

        assert!(results[0].passed);
        assert_eq!(results[0].logs, vec!["[error] Error in pre-processing: pre failed"]);
    }

    #[test]
    fn test_pre_process_only_touches_arrays() {
        let submission = Submission::new("function scale(items, factor) { return items.map((x) => x * factor); }")
            .with_pre_process("function double(arr) { return arr.map((x) => x * 2); }");
        let cases = vec![case(json!({ "items": [1, 2], "factor": 10 }), json!([20, 40]))];
        let results = quiet().run_test_cases(&submission, &cases);

        assert!(results[0].passed, "{:?}", results[0]);
    }

    #[test]
    fn test_throwing_post_process_keeps_raw_result() {
        let submission = Submission::new("function pair() { return [1, 2]; }")
            .with_post_process("function broken(x) { throw new Error('nope'); }");
        let results = quiet().run_test_cases(&submission, &[case(json!({}), json!([1, 2]))]);

        assert!(results[0].passed);
        assert_eq!(results[0].logs, vec!["[error] Error in post-processing: nope"]);
    }

    #[test]
    fn test_unresolvable_post_process_is_treated_as_absent() {
        let submission = Submission::new("function nothing() { return null; }").with_post_process("[1, 2, 3]");
        let results = quiet().run_test_cases(&submission, &[case(json!({}), json!([]))]);

        assert!(results[0].passed);
        assert_eq!(results[0].actual.as_deref(), Some("[]"));
        assert_eq!(results[0].logs.len(), 1);
        assert!(results[0].logs[0].starts_with("[error] Error in post-processing"));
    }

    #[test]
    fn test_null_becomes_empty_array_without_post_process() {
        let results = run_test_cases("function none() { return null; }", &[case(json!({}), json!([]))], None, None);
        assert!(results[0].passed);
        assert_eq!(results[0].actual.as_deref(), Some("[]"));
    }

    #[test]
    fn test_null_is_post_processed_when_hook_exists() {
        let submission = Submission::new("function none() { return null; }")
            .with_post_process("function identity(x) { return x; }");
        let results = quiet().run_test_cases(&submission, &[case(json!({}), json!(null))]);

        assert!(results[0].passed);
        assert_eq!(results[0].actual.as_deref(), Some("null"));
    }

    #[test]
    fn test_undefined_result_fails() {
        let results = quiet().run_test_cases(&Submission::new("function f() {}"), &[case(json!({}), json!(null))]);

        assert!(!results[0].passed);
        assert_eq!(results[0].actual, None);
        assert_eq!(results[0].error, None);
    }

    #[test]
    fn test_scalar_input_is_passed_directly() {
        let results = run_test_cases("const double = (n) => n * 2;", &[case(json!(5), json!(10))], None, None);

        assert!(results[0].passed);
        assert!(results[0]
            .logs
            .contains(&"Calling function with direct input: 5".to_string()));
    }

    #[test]
    fn test_array_input_is_one_argument_and_pre_processed() {
        let submission = Submission::new("function total(arr) { return arr.reduce((a, b) => a + b, 0); }")
            .with_pre_process("function twice(arr) { return arr.map((x) => x * 2); }");
        let results = Grader::default().run_test_cases(&submission, &[case(json!([1, 2, 3]), json!(12))]);

        assert!(results[0].passed, "{:?}", results[0]);
        assert!(results[0]
            .logs
            .contains(&"Applying pre-processing to direct input".to_string()));
    }

    #[test]
    fn test_async_function_result_is_awaited() {
        let source = "async function later(x) { await null; return x + 1; }";
        let results = quiet().run_test_cases(&Submission::new(source), &[case(json!({ "x": 1 }), json!(2))]);

        assert!(results[0].passed, "{:?}", results[0]);
        assert_eq!(results[0].actual.as_deref(), Some("2"));
    }

    #[test]
    fn test_rejected_promise_is_an_error() {
        let source = "async function later() { throw new Error('async boom'); }";
        let results = quiet().run_test_cases(&Submission::new(source), &[case(json!({}), json!(0))]);

        assert!(!results[0].passed);
        assert_eq!(results[0].error.as_deref(), Some("async boom"));
    }

    #[test]
    fn test_timeout_is_local_to_one_case() {
        let grader = Grader::new(GraderConfig {
            timeout_ms: 100,
            trace_harness: false,
            ..GraderConfig::default()
        });
        let source = "function spin(forever) { while (forever) {} return 1; }";
        let cases = vec![
            case(json!({ "forever": true }), json!(1)),
            case(json!({ "forever": false }), json!(1)),
        ];
        let results = grader.run_test_cases(&Submission::new(source), &cases);

        assert!(!results[0].passed);
        assert_eq!(results[0].error.as_deref(), Some("Execution timed out after 100ms"));
        assert!(results[0].execution_time_ms >= 90);
        assert!(results[1].passed);
    }

    #[test]
    fn test_async_timeout_is_local_to_one_case() {
        let grader = Grader::new(GraderConfig {
            timeout_ms: 200,
            trace_harness: false,
            ..GraderConfig::default()
        });
        let source = "async function spin(forever) { await null; while (forever) {} return 1; }";
        let cases = vec![
            case(json!({ "forever": true }), json!(1)),
            case(json!({ "forever": false }), json!(1)),
        ];
        let results = grader.run_test_cases(&Submission::new(source), &cases);

        assert_eq!(results.len(), 2);
        assert!(!results[0].passed);
        assert_eq!(results[0].error.as_deref(), Some("Execution timed out after 200ms"));
        assert!(results[1].passed, "{:?}", results[1]);
    }

    #[test]
    fn test_looping_microtask_times_out_its_own_case() {
        let grader = Grader::new(GraderConfig {
            timeout_ms: 200,
            trace_harness: false,
            ..GraderConfig::default()
        });
        let source = r#"
function schedule(n) {
    if (n === 1) Promise.resolve().then(() => { while (true) {} });
    return n;
}
"#;
        let cases = vec![case(json!({ "n": 1 }), json!(1)), case(json!({ "n": 2 }), json!(2))];
        let results = grader.run_test_cases(&Submission::new(source), &cases);

        assert_eq!(results[0].error.as_deref(), Some("Execution timed out after 200ms"));
        assert!(results[1].passed, "{:?}", results[1]);
    }

    #[test]
    fn test_microtask_output_belongs_to_its_case() {
        let source = "function later(n) { Promise.resolve().then(() => console.log('late', n)); return n; }";
        let cases = vec![case(json!({ "n": 1 }), json!(1)), case(json!({ "n": 2 }), json!(2))];
        let results = quiet().run_test_cases(&Submission::new(source), &cases);

        assert!(results.iter().all(|r| r.passed));
        assert_eq!(results[0].logs, vec!["late 1"]);
        assert_eq!(results[1].logs, vec!["late 2"]);
    }

    #[test]
    fn test_top_level_return_fails_instead_of_panicking() {
        let source = "function echo(x) { return x; }\nreturn [];";
        let cases = vec![case(json!(1), json!(1)), case(json!(2), json!(2))];
        let results = run_test_cases(source, &cases, None, None);

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(!result.passed);
            assert_eq!(
                result.error.as_deref(),
                Some("Could not load echo: the code returned before its declarations")
            );
        }
    }

    #[test]
    fn test_early_returning_post_process_keeps_raw_result() {
        let submission = Submission::new("function pair() { return [1, 2]; }")
            .with_post_process("function flatten(x) { return x; }\nreturn;");
        let results = quiet().run_test_cases(&submission, &[case(json!({}), json!([1, 2]))]);

        assert!(results[0].passed);
        assert_eq!(
            results[0].logs,
            vec!["[error] Error in post-processing: Could not load flatten: the code returned before its declarations"]
        );
    }

    #[test]
    fn test_empty_case_list() {
        assert!(run_test_cases(TWO_SUM, &[], None, None).is_empty());
    }

    #[test]
    fn test_oversized_source_fails_every_case() {
        let grader = Grader::new(GraderConfig {
            max_source_bytes: 16,
            ..GraderConfig::default()
        });
        let results = grader.run_test_cases(&Submission::new(TWO_SUM), &[case(json!({}), json!(0))]);

        assert_eq!(
            results[0].error.as_deref(),
            Some("Source code exceeds maximum size of 16 bytes")
        );
    }

    #[tokio::test]
    async fn test_async_grade_matches_sync() {
        let cases = fallback::test_cases("two-sum").unwrap();
        let grader = Grader::default();

        let async_results = grader.grade(Submission::new(TWO_SUM), cases.clone()).await;
        let sync_results = grader.run_test_cases(&Submission::new(TWO_SUM), &cases);

        let passed = |results: &[tutor_common::types::TestResult]| -> Vec<bool> {
            results.iter().map(|r| r.passed).collect()
        };
        assert_eq!(passed(&async_results), passed(&sync_results));
        assert_eq!(async_results[2].actual.as_deref(), Some("[0,1]"));
    }

    #[test]
    fn test_performance_of_fast_submission() {
        let cases = fallback::test_cases("two-sum").unwrap();
        let report = analyze_performance(TWO_SUM, &cases);

        assert_eq!(report.time_complexity, "O(1) or O(log n)");
        assert_eq!(report.space_complexity, "Depends on implementation");
        assert!(report.performance_tips.is_empty());
    }

    #[test]
    fn test_performance_ignores_pass_fail() {
        let report = analyze_performance("function f() { throw new Error('x'); }", &[case(json!({}), json!(0))]);
        assert_eq!(report.time_complexity, "O(1) or O(log n)");
        assert_eq!(report.total_execution_time_ms, 0);
    }
}
