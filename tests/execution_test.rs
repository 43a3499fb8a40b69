//! End-to-end tests: compile Fifth programs, run the executables and check
//! what they print.
//!
//! Only meaningful where the produced images can run natively.

#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use std::io;
use std::path::Path;
use std::ops::RangeInclusive;
use std::process::{Command, Output};
use std::thread;
use std::time::Duration;

use fifthc::{compile, CompileOptions};

/// ETXTBSY: another test thread forked while our file was still open.
const TEXT_FILE_BUSY: i32 = 26;

fn exec(path: &Path) -> Output {
    for _ in 0..50 {
        match Command::new(path).output() {
            Ok(output) => return output,
            Err(e) if e.raw_os_error() == Some(TEXT_FILE_BUSY) => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => panic!("failed to run {}: {e}", path.display()),
        }
    }
    panic!("{} stayed busy", path.display());
}

fn run_with(source: &str, options: &CompileOptions) -> (String, Option<i32>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let program = compile(source, options)
        .unwrap_or_else(|e| panic!("compile failed for {source:?}: {e}"));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog");
    program.write_to_file(&path).unwrap();

    let output = exec(&path);
    let stdout = String::from_utf8(output.stdout).unwrap();
    (stdout, output.status.code())
}

/// Run with default options and require a clean exit.
fn run(source: &str) -> String {
    let (stdout, status) = run_with(source, &CompileOptions::default());
    assert_eq!(status, Some(0), "{source:?} printed {stdout:?}");
    stdout
}

const SMALL: RangeInclusive<i64> = -4..=4;

type Binary = fn(i64, i64) -> Option<i64>;
type Unary = fn(i64) -> i64;

fn flag(condition: bool) -> i64 {
    if condition {
        -1
    } else {
        0
    }
}

/// Compile every `(snippet, expected output)` case into one program between
/// a sentinel push and its print, so each snippet must also leave the stack
/// as it found it.
fn run_cases(label: &str, cases: impl IntoIterator<Item = (String, String)>) {
    let mut source = String::from("99 ");
    let mut expected = String::new();
    for (snippet, output) in cases {
        source.push_str(&snippet);
        source.push(' ');
        expected.push_str(&output);
    }
    source.push('.');
    expected.push_str("99 ");
    assert_eq!(run(&source), expected, "{label}");
}

fn pairs() -> impl Iterator<Item = (i64, i64)> {
    SMALL.flat_map(|a| SMALL.map(move |b| (a, b)))
}

fn printed(values: &[i64]) -> String {
    values.iter().map(|v| format!("{v} ")).collect()
}

#[test]
fn test_square_prints_only_what_is_asked() {
    assert_eq!(run(": square dup * ; 7 dup . square drop"), "7 ");
}

#[test]
fn test_empty_and_silent_programs_exit_cleanly() {
    assert_eq!(run(""), "");
    assert_eq!(run("\\ nothing but a comment\n( and another )"), "");
    assert_eq!(run("1 2 3 drop drop drop"), "");
}

#[test]
fn test_binary_operators_over_small_pairs() {
    // Division truncates and the remainder takes the dividend's sign, as
    // Rust's `/` and `%` do. Zero divisors are skipped.
    let operators: &[(&str, Binary)] = &[
        ("+", |a, b| Some(a + b)),
        ("-", |a, b| Some(a - b)),
        ("*", |a, b| Some(a * b)),
        ("/", |a, b| a.checked_div(b)),
        ("mod", |a, b| a.checked_rem(b)),
        ("and", |a, b| Some(a & b)),
        ("or", |a, b| Some(a | b)),
        ("xor", |a, b| Some(a ^ b)),
        ("=", |a, b| Some(flag(a == b))),
        ("<>", |a, b| Some(flag(a != b))),
        ("<", |a, b| Some(flag(a < b))),
        (">", |a, b| Some(flag(a > b))),
        ("max", |a, b| Some(a.max(b))),
        ("min", |a, b| Some(a.min(b))),
    ];

    for (word, eval) in operators {
        let cases = pairs().filter_map(|(a, b)| {
            eval(a, b).map(|value| (format!("{a} {b} {word} ."), printed(&[value])))
        });
        run_cases(word, cases);
    }
}

#[test]
fn test_unary_operators_over_small_values() {
    let operators: &[(&str, Unary)] = &[
        ("negate", |a| -a),
        ("1+", |a| a + 1),
        ("1-", |a| a - 1),
        ("invert", |a| !a),
        ("abs", |a| a.abs()),
        ("0=", |a| flag(a == 0)),
        ("0<", |a| flag(a < 0)),
        ("0>", |a| flag(a > 0)),
    ];

    for (word, eval) in operators {
        let cases = SMALL.map(|a| (format!("{a} {word} ."), printed(&[eval(a)])));
        run_cases(word, cases);
    }
}

#[test]
fn test_shifts_over_small_values() {
    let cases = SMALL.flat_map(|a| {
        (0..=4u32).flat_map(move |n| {
            let left = (a as u64).wrapping_shl(n) as i64;
            let right = ((a as u64) >> n) as i64;
            [
                (format!("{a} {n} lshift ."), printed(&[left])),
                (format!("{a} {n} rshift ."), printed(&[right])),
            ]
        })
    });
    run_cases("shifts", cases);
}

#[test]
fn test_arithmetic_extremes() {
    assert_eq!(run("-9223372036854775808 abs ."), "-9223372036854775808 ");
    assert_eq!(run("9223372036854775807 1+ ."), "-9223372036854775808 ");
    assert_eq!(run("-9223372036854775808 9223372036854775807 max ."), "9223372036854775807 ");
}

#[test]
fn test_bitwise() {
    assert_eq!(
        run("6 3 and . 6 3 or . 6 3 xor . 0 invert . 1 4 lshift . 256 4 rshift ."),
        "2 7 5 -1 16 16 "
    );
    // rshift is logical.
    assert_eq!(run("-1 60 rshift ."), "15 ");
}

#[test]
fn test_number_printing_extremes() {
    assert_eq!(run("0 ."), "0 ");
    assert_eq!(
        run("-9223372036854775808 . 9223372036854775807 ."),
        "-9223372036854775808 9223372036854775807 "
    );
    assert_eq!(run("0x7fffffff . 4294967296 ."), "2147483647 4294967296 ");
}

#[test]
fn test_stack_shuffles_over_small_values() {
    // Outputs list the stack top first, as `.` pops it.
    let pair_cases = pairs().flat_map(|(a, b)| {
        // `?dup` copies only a non-zero top cell.
        let question_dup = if b == 0 {
            (format!("{a} {b} ?dup . ."), printed(&[b, a]))
        } else {
            (format!("{a} {b} ?dup . . ."), printed(&[b, b, a]))
        };
        [
            (format!("{a} {b} drop ."), printed(&[a])),
            (format!("{a} {b} dup . . ."), printed(&[b, b, a])),
            (format!("{a} {b} swap . ."), printed(&[a, b])),
            (format!("{a} {b} over . . ."), printed(&[a, b, a])),
            (format!("{a} {b} nip ."), printed(&[b])),
            (format!("{a} {b} tuck . . ."), printed(&[b, a, b])),
            (format!("{a} {b} 2dup . . . ."), printed(&[b, a, b, a])),
            question_dup,
        ]
    });
    run_cases("pairs", pair_cases);

    let triples = (-2..=2i64).flat_map(|a| {
        (-2..=2i64).flat_map(move |b| (-2..=2i64).map(move |c| (a, b, c)))
    });
    let triple_cases = triples.flat_map(|(a, b, c)| {
        [
            (format!("{a} {b} {c} rot . . ."), printed(&[a, c, b])),
            (format!("{a} {b} {c} -rot . . ."), printed(&[b, a, c])),
        ]
    });
    run_cases("triples", triple_cases);
}

#[test]
fn test_comparisons_yield_minus_one_or_zero() {
    assert_eq!(
        run("3 3 = . 3 4 = . 3 4 <> . 3 4 < . 4 3 < . 4 3 > . -1 1 > ."),
        "-1 0 -1 -1 0 -1 0 "
    );
    assert_eq!(run("0 0= . 5 0= . -5 0< . 5 0< ."), "-1 0 -1 0 ");
}

#[test]
fn test_conditional_regression() {
    for (n, expected) in [(5, "111 222 "), (1, "111 222 "), (0, "222 "), (-3, "222 ")] {
        let source = format!("{n} 0 > if 111 . then 222 .");
        assert_eq!(run(&source), expected, "N = {n}");
    }
}

#[test]
fn test_if_else_then() {
    assert_eq!(run("0 if 1 . else 2 . then 3 ."), "2 3 ");
    assert_eq!(run("-1 if 1 . else 2 . then 3 ."), "1 3 ");
    // Values left cached before the branch survive both arms.
    assert_eq!(run("42 1 if 7 else 8 then . ."), "7 42 ");
    assert_eq!(
        run(": sign dup 0< if drop -1 else 0= if 0 else 1 then then ; -9 sign . 0 sign . 9 sign ."),
        "-1 0 1 "
    );
}

#[test]
fn test_memory_round_trip() {
    assert_eq!(
        run("variable x 123456789012 x ! x @ . 0x1ff x c! x c@ . x @ . 5 x +! x @ ."),
        "123456789012 255 123456789247 123456789252 "
    );
    // Variables start out zeroed and are independent.
    assert_eq!(run("variable a variable b 7 a ! b @ . a @ ."), "0 7 ");
}

#[test]
fn test_output_words() {
    assert_eq!(run("72 emit 105 emit cr"), "Hi\n");
    assert_eq!(run("1 . cr 2 ."), "1 \n2 ");
}

#[test]
fn test_do_loops() {
    assert_eq!(run("5 0 do i . loop"), "0 1 2 3 4 ");
    assert_eq!(run("2 0 do 3 0 do i . loop loop"), "0 1 2 0 1 2 ");
    // The body runs at least once.
    assert_eq!(run("0 0 do 9 . loop"), "9 ");
    assert_eq!(run("0 4 0 do i + loop ."), "6 ");
}

#[test]
fn test_nested_loop_indices() {
    assert_eq!(
        run("2 0 do 3 0 do j 10 * i + . loop loop"),
        "0 1 2 10 11 12 "
    );
    assert_eq!(
        run(": grid 2 0 do 2 0 do j i - . loop loop ; grid"),
        "0 -1 1 0 "
    );
}

#[test]
fn test_plus_loop_steps_in_both_directions() {
    assert_eq!(run("10 0 do i . 2 +loop"), "0 2 4 6 8 ");
    assert_eq!(run("10 0 do i . 3 +loop"), "0 3 6 9 ");
    // Counting down stops once the index passes below the limit or lands on it.
    assert_eq!(run("0 10 do i . -3 +loop"), "10 7 4 1 ");
    assert_eq!(run("0 5 do i . -1 +loop"), "5 4 3 2 1 ");
    assert_eq!(run("0 0 do i . -1 +loop"), "0 ");
    assert_eq!(run(": evens 0 swap 0 do i + 2 +loop ; 9 evens ."), "20 ");
}

#[test]
fn test_unloop_before_exit() {
    assert_eq!(
        run(": find 10 0 do i 3 = if i unloop exit then loop -1 ; find . 1 ."),
        "3 1 "
    );
    assert_eq!(
        run(": inner 5 0 do 5 0 do i j + 6 = if j i unloop unloop exit then loop loop 0 0 ; inner . . 7 ."),
        "4 2 7 "
    );
}

#[test]
fn test_return_stack_words() {
    assert_eq!(run("1 2 >r . r> ."), "1 2 ");
    assert_eq!(run("5 >r r@ . r@ 1+ . r> ."), "5 6 5 ");
    assert_eq!(run(": under+ ( a b c -- a+c b ) swap >r + r> ; 1 2 10 under+ . ."), "2 11 ");
    // `exit` drops both the loop frame and the saved cell.
    assert_eq!(
        run(": f >r 3 0 do i 1 = if i . exit then loop r> drop ; 42 f 7 ."),
        "1 7 "
    );
}

#[test]
fn test_begin_loops() {
    assert_eq!(run("3 begin dup . 1- dup 0= until drop"), "3 2 1 ");
    assert_eq!(run("3 begin dup 0 > while dup . 1- repeat drop"), "3 2 1 ");
    assert_eq!(
        run(": count-up 0 begin dup 3 = if drop exit then dup . 1+ again ; count-up"),
        "0 1 2 "
    );
}

#[test]
fn test_recursion() {
    assert_eq!(
        run(": fact dup 1 > if dup 1- recurse * then ; 5 fact . 10 fact ."),
        "120 3628800 "
    );
    assert_eq!(
        run(": fib dup 2 < if exit then dup 1- recurse swap 2 - recurse + ; 20 fib ."),
        "6765 "
    );
}

#[test]
fn test_exit_from_inside_a_loop() {
    assert_eq!(
        run(": find 10 0 do i 3 = if i exit then loop -1 ; find . 1 ."),
        "3 1 "
    );
}

#[test]
fn test_definitions_between_main_code() {
    assert_eq!(run("1 . : two 2 ; two . : three two 1+ ; three ."), "1 2 3 ");
    assert_eq!(run("5 : noop ; ."), "5 ");
}

#[test]
fn test_redefinition_affects_later_calls_only() {
    assert_eq!(run(": v 1 ; : w v ; : v 2 ; w . v ."), "1 2 ");
}

#[test]
fn test_bye_exits_early() {
    assert_eq!(run("1 . bye 2 ."), "1 ");
}

#[test]
fn test_forward_references() {
    let options = CompileOptions::default().forward_refs(true);
    let (stdout, status) = run_with("3 later . : later 10 * ;", &options);
    assert_eq!(status, Some(0));
    assert_eq!(stdout, "30 ");

    let (stdout, _) = run_with(
        ": even? dup 0= if drop -1 exit then 1- odd? ; : odd? dup 0= if drop 0 exit then 1- even? ; 10 even? . 7 even? .",
        &options,
    );
    assert_eq!(stdout, "-1 0 ");
}

#[test]
fn test_best_effort_program_still_runs() {
    let options = CompileOptions::default().best_effort(true);
    let (stdout, status) = run_with("1 frobnicate . 2 .", &options);
    assert_eq!(status, Some(0));
    assert_eq!(stdout, "1 2 ");
}

#[test]
fn test_case_insensitive_words() {
    assert_eq!(run(": Twice DUP + ; 21 twice . 1 IF 5 . THEN"), "42 5 ");
}

#[test]
fn test_custom_layout_runs() {
    let options = CompileOptions {
        code_base: 0x80_0000,
        data_base: 0x100_0000,
        stack_size: 4096,
        ..Default::default()
    };
    let (stdout, status) = run_with("variable x 9 x ! x @ .", &options);
    assert_eq!(status, Some(0));
    assert_eq!(stdout, "9 ");
}
