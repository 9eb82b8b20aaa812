//! End-to-end scenarios driven through the session interface, asserting
//! on captured output.

use rstest::rstest;

use crate::interp::{Interpreter, QueuedInput};

/// Run a sequence of session lines and return the captured output.
fn run(lines: &[&str]) -> String {
    let mut it = Interpreter::for_tests();
    for line in lines {
        assert!(it.session_line(line), "fatal error on {line:?}");
    }
    it.take_output()
}

/// Output of the lines, with every line trimmed and blank lines dropped.
fn display(lines: &[&str]) -> Vec<String> {
    run(lines)
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Single-expression helper: the printed value as trimmed lines.
fn eval(expr: &str) -> Vec<String> {
    display(&[expr])
}

#[rstest]
#[case("2 + 3", &["5"])]
#[case("⍳5", &["1 2 3 4 5"])]
#[case("+/⍳100", &["5050"])]
#[case("2-5", &["¯3"])]
#[case("2×3 4 5", &["6 8 10"])]
#[case("10÷4", &["2.5"])]
#[case("⌈2.3", &["3"])]
#[case("⌊¯2.3", &["¯3"])]
#[case("3⌈5", &["5"])]
#[case("2*10", &["1024"])]
#[case("⍟1", &["0"])]
#[case("|¯4", &["4"])]
#[case("3|7", &["1"])]
#[case("!5", &["120"])]
#[case("2!5", &["10"])]
#[case("~0 1 0", &["1 0 1"])]
#[case("1∧1 0", &["1 0"])]
#[case("0⍱0", &["1"])]
#[case("2<3", &["1"])]
#[case("2≥3", &["0"])]
#[case("1○0", &["0"])]
#[case("×¯5 0 5", &["¯1 0 1"])]
fn scalar_functions(#[case] expr: &str, #[case] want: &[&str]) {
    assert_eq!(eval(expr), want, "{expr}");
}

#[rstest]
#[case("⍴⍳5", &["5"])]
#[case("⍴2", &[])]
#[case("⍴⍴2 2⍴4", &["2"])]
#[case("2 3⍴⍳6", &["1 2 3", "4 5 6"])]
#[case("5⍴1 2", &["1 2 1 2 1"])]
#[case(",2 2⍴⍳4", &["1 2 3 4"])]
#[case("2↑5 6 7", &["5 6"])]
#[case("¯2↑5 6 7", &["6 7"])]
#[case("5↑1 2", &["1 2 0 0 0"])]
#[case("¯4↑1 2", &["0 0 1 2"])]
#[case("1↓⍳3", &["2 3"])]
#[case("¯1↓⍳3", &["1 2"])]
#[case("5↓⍳3", &[])]
#[case("1⌽1 2 3", &["2 3 1"])]
#[case("¯1⌽1 2 3", &["3 1 2"])]
#[case("⌽⍳3", &["3 2 1"])]
#[case("1 0 1/⍳3", &["1 3"])]
#[case("2/⍳3", &["1 1 2 2 3 3"])]
#[case("1 0 1\\1 2", &["1 0 2"])]
#[case("(⍳2),⍳2", &["1 2 1 2"])]
#[case("0,⍳3", &["0 1 2 3"])]
#[case("2 5∊⍳3", &["1 0"])]
#[case("2 4 6⍳4", &["2"])]
#[case("2 4 6⍳7", &["4"])]
#[case("⍋3 1 2", &["2 3 1"])]
#[case("⍒3 1 2", &["1 3 2"])]
#[case("10 10 10⊥1 2 3", &["123"])]
#[case("2 2 2⊤5", &["1 0 1"])]
#[case("10 10 10⊥10 10 10⊤123", &["123"])]
#[case("24 60 60⊥1 1 1", &["3661"])]
fn structural_functions(#[case] expr: &str, #[case] want: &[&str]) {
    assert_eq!(eval(expr), want, "{expr}");
}

#[test]
fn rows_reverse_along_the_first_axis() {
    let out = display(&["M←3 3⍴⍳9", "⌽[1]M"]);
    assert_eq!(out, ["7 8 9", "4 5 6", "1 2 3"]);
}

#[test]
fn last_axis_reverse_of_a_matrix() {
    let out = display(&["⌽3 3⍴⍳9"]);
    assert_eq!(out, ["3 2 1", "6 5 4", "9 8 7"]);
}

#[test]
fn matrix_product() {
    let out = display(&["(3 3⍴⍳9) +.× 3 3⍴⍳9"]);
    assert_eq!(out, ["30 36 42", "66 81 96", "102 126 150"]);
}

#[test]
fn inner_product_of_vectors_is_a_scalar() {
    assert_eq!(eval("1 2 3+.×4 5 6"), ["32"]);
}

#[test]
fn general_inner_product() {
    // ∧.= is an all-equal test along the joining axis.
    assert_eq!(eval("1 2 3∧.=1 2 3"), ["1"]);
    assert_eq!(eval("1 2 3∧.=1 2 4"), ["0"]);
}

#[test]
fn outer_product() {
    let out = display(&["(⍳2)∘.×⍳3"]);
    assert_eq!(out, ["1 2 3", "2 4 6"]);
}

#[test]
fn string_indexing() {
    assert_eq!(eval("'HELLO'[2 1]"), ["EH"]);
}

#[test]
fn matrix_indexing_mixed_specifiers() {
    let out = display(&["M←3 3⍴⍳9", "M[2;]", "M[;3]", "M[1 3;2]"]);
    assert_eq!(out, ["4 5 6", "3 6 9", "2 8"]);
}

#[test]
fn indexed_assignment() {
    let out = display(&["A←⍳5 ⋄ A[3]←99 ⋄ A"]);
    assert_eq!(out, ["1 2 99 4 5"]);
}

#[test]
fn indexed_assignment_on_a_matrix() {
    let out = display(&["M←3 3⍴0", "M[2;2]←7 ⋄ M[1;]←1 2 3", "M"]);
    assert_eq!(out, ["1 2 3", "0 7 0", "0 0 0"]);
}

#[test]
fn out_of_range_index_is_reported() {
    let out = run(&["A←⍳5", "A[9]"]);
    assert!(out.contains("[EvalError] Invalid index"), "{out}");
}

#[test]
fn diamonds_run_left_to_right() {
    let out = display(&["A←1 ⋄ A←A+1 ⋄ A"]);
    assert_eq!(out, ["2"]);
}

#[test]
fn factorial_function() {
    let out = display(&[
        "∇R←FACT N ⋄ R←1 ⋄ →(N=0)/0 ⋄ R←N×FACT N-1 ∇",
        "FACT 5",
        "FACT 0",
    ]);
    assert_eq!(out, ["120", "1"]);
}

#[test]
fn dyadic_function_with_locals() {
    let out = display(&[
        "∇R←A HYPOT B;S ⋄ S←(A×A)+B×B ⋄ R←S*0.5 ∇",
        "3 HYPOT 4",
    ]);
    assert_eq!(out, ["5"]);
}

#[test]
fn niladic_function_returns_a_value() {
    let out = display(&["∇R←PI ⋄ R←3.14 ∇", "PI", "1+PI"]);
    assert_eq!(out, ["3.14", "4.14"]);
}

#[test]
fn labels_resolve_to_line_numbers() {
    let out = display(&[
        "∇R←SIGN N ⋄ →(N<0)/NEG ⋄ R←1 ⋄ →0 ⋄ NEG: R←¯1 ∇",
        "SIGN 5",
        "SIGN ¯5",
    ]);
    assert_eq!(out, ["1", "¯1"]);
}

#[test]
fn branch_falls_through_on_empty() {
    let out = display(&["∇R←F N ⋄ →(N=0)/0 ⋄ R←10 ∇", "F 1"]);
    assert_eq!(out, ["10"]);
}

#[test]
fn recursive_calls_balance_the_stack() {
    let mut it = Interpreter::for_tests();
    assert!(it.session_line("∇R←FACT N ⋄ R←1 ⋄ →(N=0)/0 ⋄ R←N×FACT N-1 ∇"));
    assert!(it.session_line("FACT 10"));
    assert_eq!(it.ws.opr_depth(), 0);
    let out = it.take_output();
    assert!(out.contains("3628800"), "{out}");
}

#[test]
fn function_without_return_value_leaves_stack_alone() {
    let mut it = Interpreter::for_tests();
    assert!(it.session_line("∇SHOW N ⋄ N ∇"));
    assert!(it.session_line("SHOW 7"));
    assert_eq!(it.ws.opr_depth(), 0);
    let lines: Vec<_> = it
        .take_output()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    assert_eq!(lines, ["7"]);
}

#[test]
fn calling_without_a_value_is_an_error() {
    let out = run(&["∇R←NOPE ⋄ 1 ∇", "2+NOPE"]);
    assert!(out.contains("[EvalError]"), "{out}");
}

#[test]
fn formatter_blanks_trailing_zeros() {
    let out = run(&["⍕1.5 2.5 3"]);
    let line = out.lines().find(|l| !l.trim().is_empty()).unwrap();
    assert_eq!(line.trim_end(), " 1.5 2.5 3");
}

#[test]
fn dyadic_format_controls_precision() {
    assert_eq!(eval("2⍕1.567"), ["1.57"]);
    assert_eq!(eval("6 2⍕1.5 2.25"), ["1.50   2.25"]);
}

#[test]
fn empty_reshape_and_its_shape() {
    let mut it = Interpreter::for_tests();
    assert!(it.session_line("0 0⍴0"));
    assert!(it.session_line("⍴0 0⍴0"));
    let output = it.take_output();
    let lines: Vec<_> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    assert_eq!(lines, ["0 0"]);
}

#[test]
fn empty_iota_has_shape_zero() {
    assert_eq!(eval("⍴⍳0"), ["0"]);
}

#[test]
fn double_reverse_and_double_transpose_are_identity() {
    assert_eq!(eval("⌽⌽1 2 3 4"), ["1 2 3 4"]);
    let out = display(&["⊖⊖3 3⍴⍳9"]);
    assert_eq!(out, ["1 2 3", "4 5 6", "7 8 9"]);
    let out = display(&["⍉⍉2 3⍴⍳6"]);
    assert_eq!(out, ["1 2 3", "4 5 6"]);
}

#[test]
fn transpose_reverses_axes() {
    let out = display(&["⍉2 3⍴⍳6"]);
    assert_eq!(out, ["1 4", "2 5", "3 6"]);
}

#[test]
fn matrix_divide_inverts() {
    // A⌹A is the identity for an invertible matrix.
    let out = display(&["A←3 3⍴2 1 0 1 3 1 0 1 2", "A⌹A"]);
    assert_eq!(out, ["1 0 0", "0 1 0", "0 0 1"]);
}

#[test]
fn matrix_inverse_times_matrix() {
    let out = display(&["A←2 2⍴4 7 2 6", "A+.×⌹A"]);
    assert_eq!(out, ["1 0", "0 1"]);
}

#[test]
fn linear_system_solution() {
    // x + y = 3, x − y = 1  =>  x = 2, y = 1.
    let out = display(&["3 1⌹2 2⍴1 1 1 ¯1"]);
    assert_eq!(out, ["2 1"]);
}

#[test]
fn singular_matrix_is_domain_error() {
    let out = run(&["⌹2 2⍴1 1 1 1"]);
    assert!(out.contains("[EvalError] Domain error"), "{out}");
}

#[test]
fn system_functions() {
    let out = display(&["⎕ident 3"]);
    assert_eq!(out, ["1 0 0", "0 1 0", "0 0 1"]);
    let out = display(&["⎕rref 2 3⍴2 0 4 0 3 9"]);
    assert_eq!(out, ["1 0 2", "0 1 3"]);
}

#[test]
fn scans() {
    assert_eq!(eval("+\\⍳4"), ["1 3 6 10"]);
    assert_eq!(eval("×\\1 2 3 4"), ["1 2 6 24"]);
    // Non-associative scans fold right-to-left per prefix.
    assert_eq!(eval("-\\1 2 3"), ["1 ¯1 2"]);
}

#[test]
fn reduce_along_first_axis() {
    assert_eq!(eval("+/[1]3 3⍴⍳9"), ["12 15 18"]);
    assert_eq!(eval("+⌿3 3⍴⍳9"), ["12 15 18"]);
}

#[test]
fn reduce_of_empty_vector_is_the_identity() {
    assert_eq!(eval("+/⍳0"), ["0"]);
    assert_eq!(eval("×/⍳0"), ["1"]);
}

#[test]
fn reduce_singleton_axis_keeps_values() {
    assert_eq!(eval("+/1⍴7"), ["7"]);
}

#[test]
fn conformability_is_enforced() {
    let out = run(&["(⍳3)+⍳4"]);
    assert!(out.contains("[EvalError] Not conformable"), "{out}");
}

#[test]
fn scalars_extend_to_any_rank() {
    let out = display(&["10+2 2⍴⍳4"]);
    assert_eq!(out, ["11 12", "13 14"]);
}

#[test]
fn divide_by_zero_is_reported() {
    let out = run(&["1÷0"]);
    assert!(out.contains("[EvalError] Divide by zero"), "{out}");
}

#[test]
fn boolean_domain_is_checked() {
    let out = run(&["2∧1"]);
    assert!(out.contains("[EvalError] Domain error"), "{out}");
}

#[test]
fn invalid_axis_is_reported() {
    let out = run(&["⌽[3]2 2⍴⍳4"]);
    assert!(out.contains("[EvalError] Invalid axis"), "{out}");
    // A fractional axis is only meaningful for catenation.
    let out = run(&["⌽[1.5]2 2⍴⍳4"]);
    assert!(out.contains("[EvalError]"), "{out}");
}

#[test]
fn grade_requires_a_vector() {
    let out = run(&["⍋2 2⍴⍳4"]);
    assert!(out.contains("[EvalError] Rank error"), "{out}");
}

#[test]
fn grade_is_stable() {
    // Equal keys keep their source order.
    assert_eq!(eval("⍋2 1 2 1"), ["2 4 1 3"]);
    assert_eq!(eval("⍒2 1 2 1"), ["1 3 2 4"]);
}

#[test]
fn laminate_makes_a_new_axis() {
    let out = display(&["1 2,[0.5]3 4"]);
    assert_eq!(out, ["1 2", "3 4"]);
}

#[test]
fn catenate_along_first_axis() {
    let out = display(&["(2 2⍴⍳4)⍪2 2⍴9"]);
    assert_eq!(out, ["1 2", "3 4", "9 9", "9 9"]);
}

#[test]
fn execute_runs_a_string() {
    assert_eq!(eval("⍎'2+3'"), ["5"]);
    assert_eq!(eval("1+⍎'2×3'"), ["7"]);
}

#[test]
fn roll_and_deal_stay_in_range() {
    assert_eq!(eval("?1"), ["1"]);
    // A full deal is a permutation.
    assert_eq!(eval("+/5?5"), ["15"]);
    let out = run(&["6?5"]);
    assert!(out.contains("[EvalError] Domain error"), "{out}");
}

#[test]
fn origin_zero_changes_indexing() {
    let out = display(&[")origin 0", "⍳3", "A←10 20 30", "A[0]"]);
    assert_eq!(out[1..], ["0 1 2".to_string(), "10".to_string()]);
}

#[test]
fn system_variables_read() {
    assert_eq!(eval("⎕ver"), ["0 5 0"]);
    assert_eq!(eval("⎕io"), ["1"]);
    assert_eq!(eval("⎕pp"), ["10"]);
    assert_eq!(eval("3↑⎕a"), ["ABC"]);
    assert_eq!(eval("⍴⎕ts"), ["7"]);
}

#[test]
fn system_variables_write() {
    let out = display(&["⎕io←0", "⍳3"]);
    assert_eq!(out[0], "0 1 2");
    let out = run(&["⎕ts←1"]);
    assert!(out.contains("Read-only system variable"), "{out}");
    let out = run(&["⎕pp←99"]);
    assert!(out.contains("[EvalError] Domain error"), "{out}");
}

#[test]
fn print_precision_limits_digits() {
    let out = display(&["⎕pp←3", "÷3"]);
    assert_eq!(out[0], "0.333");
}

#[test]
fn quad_output_prints_inline() {
    let out = display(&["A←⎕←5"]);
    assert_eq!(out, ["5"]);
}

#[test]
fn quote_quad_reads_raw_input() {
    let mut it = Interpreter::for_tests();
    it.input = Box::new(QueuedInput(vec!["HI".into()]));
    assert!(it.session_line("⍞"));
    let out = it.take_output();
    assert!(out.contains("HI"), "{out}");
}

#[test]
fn comments_are_ignored() {
    assert_eq!(eval("2+3 ⍝ the rest is noise"), ["5"]);
}

#[test]
fn unmatched_parenthesis_is_reported() {
    let out = run(&["2+3)"]);
    assert!(out.contains("[EvalError] Unmatched parentheses"), "{out}");
}

#[test]
fn bad_token_shows_the_offending_line() {
    let out = run(&["2+#"]);
    assert!(out.contains("[LexicalError] Invalid token"), "{out}");
    assert!(out.contains("2+#"), "{out}");
}

#[test]
fn undefined_names_are_reported() {
    let out = run(&["NOSUCH+1"]);
    assert!(out.contains("[EvalError] Undefined variable"), "{out}");
}

#[test]
fn long_names_and_strings_are_rejected() {
    let long_name = "A".repeat(65);
    let out = run(&[&format!("{long_name}←1")]);
    assert!(out.contains("[LexicalError] Invalid name"), "{out}");

    let long_string = format!("'{}'", "X".repeat(300));
    let out = run(&[&long_string]);
    assert!(out.contains("[LexicalError] String too long"), "{out}");
}

#[test]
fn error_recovery_keeps_the_session_alive() {
    let out = display(&["1÷0", "2+2"]);
    assert!(out.iter().any(|l| l.contains("Divide by zero")));
    assert_eq!(out.last().unwrap(), "4");
}

#[test]
fn stack_depth_returns_to_zero_after_errors() {
    let mut it = Interpreter::for_tests();
    it.session_line("1 2+⍳9");
    assert_eq!(it.ws.opr_depth(), 0);
    assert_eq!(it.ws.temp_top(), it.ws.arr_base());
}

#[test]
fn variables_list_and_erase() {
    let out = run(&["A←1", "B←⍳4", ")vars", ")erase A", ")vars"]);
    let first = out.find("   A").unwrap();
    assert!(out[first..].contains("   B"));
    // After the erase only B remains.
    let tail = &out[out.rfind("   B").unwrap()..];
    assert!(!tail.contains("   A"));
}

#[test]
fn functions_list_with_arity() {
    let out = run(&["∇R←F X ⋄ R←X ∇", "∇G ⋄ 1 ∇", ")fns"]);
    assert!(out.contains("F/1"), "{out}");
    assert!(out.contains("G/0"), "{out}");
}

#[test]
fn clear_preserves_settings_but_drops_names() {
    let out = run(&[")origin 0", "A←5", ")clear", "⎕io", "A"]);
    assert!(out.contains("Clear WS"), "{out}");
    assert!(out.contains('0'), "{out}");
    assert!(out.contains("Undefined variable"), "{out}");
}

#[test]
fn command_prefixes_resolve() {
    let out = run(&[")dig 4", ")digits"]);
    assert!(out.contains("Print precision is 4."), "{out}");
    let out = run(&[")x"]);
    assert!(out.contains("Invalid system command."), "{out}");
}

#[test]
fn heap_command_reports_free_blocks() {
    let out = run(&["A←⍳100", "B←⍳50", ")erase A", ")heap"]);
    assert!(out.contains("blocks"), "{out}");
}

#[test]
fn mem_command_prints_the_region_table() {
    let out = run(&[")mem"]);
    assert!(out.contains("Name table"), "{out}");
    assert!(out.contains("Array stack"), "{out}");
}

#[test]
fn wsid_round_trip() {
    let out = run(&[")wsid NEWWS", ")wsid", "⎕wsid"]);
    assert!(out.contains("WAS CLEAR-WS"), "{out}");
    assert!(out.contains("NEWWS"), "{out}");
}

#[test]
fn editor_builds_functions_interactively() {
    let mut it = Interpreter::for_tests();
    it.input = Box::new(QueuedInput(vec!["R←2×N".to_string(), "∇".to_string()]));
    assert!(it.session_line("∇R←TWICE N"));
    assert!(it.session_line("TWICE 21"));
    let out = it.take_output();
    assert!(out.contains("42"), "{out}");
}

#[test]
fn editor_replaces_lines() {
    let mut it = Interpreter::for_tests();
    it.input = Box::new(QueuedInput(vec!["[1]R←99".to_string(), "∇".to_string()]));
    assert!(it.session_line("∇R←V ⋄ R←1 ∇"));
    assert!(it.session_line("∇V [⎕]"));
    assert!(it.session_line("V"));
    let out = it.take_output();
    assert!(out.contains("99"), "{out}");
}

#[test]
fn text_save_and_load_round_trip() {
    let dir = std::env::temp_dir().join(format!("apl-text-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("funs.apl");
    let path_str = path.to_string_lossy().into_owned();

    let mut it = Interpreter::for_tests();
    assert!(it.session_line("∇R←DOUBLE N ⋄ R←2×N ∇"));
    assert!(it.session_line(&format!(")save DOUBLE \"{path_str}\"")));
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("∇R←DOUBLE N"), "{text}");
    assert!(text.contains("R←2×N"), "{text}");

    let mut it2 = Interpreter::for_tests();
    assert!(it2.session_line(&format!(")load \"{path_str}\"")));
    assert!(it2.session_line("DOUBLE 8"));
    let out = it2.take_output();
    assert!(out.contains("16"), "{out}");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn image_save_and_load_round_trip() {
    let dir = std::env::temp_dir().join(format!("apl-ws-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("session.aws");
    let path_str = path.to_string_lossy().into_owned();

    let mut it = Interpreter::for_tests();
    assert!(it.session_line("A←2 2⍴⍳4"));
    assert!(it.session_line("∇R←DOUBLE N ⋄ R←2×N ∇"));
    assert!(it.session_line(&format!(")save \"{path_str}\"")));
    it.take_output();

    let mut it2 = Interpreter::for_tests();
    assert!(it2.session_line(&format!(")load \"{path_str}\"")));
    assert!(it2.session_line("A[2;1]"));
    assert!(it2.session_line("DOUBLE 4"));
    let lines: Vec<String> = it2
        .take_output()
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    assert!(lines.contains(&"3".to_string()), "{lines:?}");
    assert!(lines.contains(&"8".to_string()), "{lines:?}");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn load_suppresses_result_printing() {
    let dir = std::env::temp_dir().join(format!("apl-quiet-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("quiet.apl");
    std::fs::write(&path, ")ignored\nA←5\n3.125+3.125\n\n").unwrap();

    let mut it = Interpreter::for_tests();
    assert!(it.session_line(&format!(")load \"{}\"", path.to_string_lossy())));
    let out = it.take_output();
    // The sum's value is not echoed during a load.
    assert!(!out.contains("6.25"), "{out}");
    assert!(it.session_line("A"));
    assert!(it.take_output().contains('5'));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn character_comparisons() {
    assert_eq!(eval("'ABC'='ABA'"), ["1 1 0"]);
    assert_eq!(eval("'A'≠'B'"), ["1"]);
    // Mixed character/number comparison yields zeros.
    assert_eq!(eval("'A'=65"), ["0"]);
    let out = run(&["'A'+1"]);
    assert!(out.contains("[EvalError] Domain error"), "{out}");
}

#[test]
fn character_arrays_display_in_rows() {
    let out = display(&["2 3⍴'ABCDEF'"]);
    assert_eq!(out, ["ABC", "DEF"]);
}

#[test]
fn compress_on_matrix_columns() {
    let out = display(&["1 0 1/[2]3 3⍴⍳9"]);
    assert_eq!(out, ["1 3", "4 6", "7 9"]);
}

#[test]
fn rotate_rows_independently() {
    let out = display(&["0 1 2⌽3 3⍴⍳9"]);
    assert_eq!(out, ["1 2 3", "5 6 4", "9 7 8"]);
}

#[test]
fn take_pads_matrices_with_fill() {
    let out = display(&["2 4↑2 2⍴⍳4"]);
    assert_eq!(out, ["1 2 0 0", "3 4 0 0"]);
}

#[test]
fn negative_number_literals() {
    assert_eq!(eval("¯2+5"), ["3"]);
    assert_eq!(eval("¯1.5×2"), ["¯3"]);
    assert_eq!(eval("1E2+1"), ["101"]);
    assert_eq!(eval("2.5E¯1"), ["0.25"]);
}

#[test]
fn embedded_quotes_in_strings() {
    assert_eq!(eval("'IT''S'"), ["IT'S"]);
}

#[test]
fn exponential_display_for_extremes() {
    let out = run(&["123456789012"]);
    assert!(out.contains("e+11"), "{out}");
    let out = run(&["0.0000001"]);
    assert!(out.contains("e¯07"), "{out}");
}
