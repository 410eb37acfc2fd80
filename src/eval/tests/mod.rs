use expect_test::{expect, Expect};

use super::*;
use crate::{
    error::{Error, ReductionError},
    state::{GlobalState, Transcript},
    symbol::Symbol,
    value::{ConditionKind, Value},
};

fn toplevel(limit: Option<usize>) -> (TopLevel, Transcript) {
    let (state, transcript) = GlobalState::with_transcript();
    (TopLevel::new(state, limit), transcript)
}

fn eval(src: &str) -> Outcome {
    let (mut top, _) = toplevel(None);
    top.eval_str(src).unwrap()
}

fn check(src: &str, expected: Expect) {
    expected.assert_eq(&eval(src).to_string());
}

fn uncaught_kind(outcome: Outcome) -> ConditionKind {
    match outcome {
        Outcome::Uncaught(Value::Condition(c)) => c.kind,
        other => panic!("expected an uncaught condition, got {other}"),
    }
}

#[test]
fn self_tail_loop_runs_in_constant_stack() {
    check(
        "(let loop ((i 0)) (if (= i 200000) i (loop (+ i 1))))",
        expect!["200000"],
    );
}

#[test]
#[ignore = "slow in debug builds"]
fn ten_million_iterations() {
    check(
        "(let loop ((i 0)) (if (= i 10000000) i (loop (+ i 1))))",
        expect!["10000000"],
    );
}

#[test]
fn deep_non_tail_recursion() {
    check(
        "(define (count n) (if (= n 0) 0 (+ 1 (count (- n 1)))))
         (count 100000)",
        expect!["100000"],
    );
}

#[test]
fn long_closure_chains_are_freed() {
    check(
        "(procedure?
           (let loop ((i 0) (f (lambda () 0)))
             (if (= i 200000) f (loop (+ i 1) (lambda () (f))))))",
        expect!["#t"],
    );
}

#[test]
fn deeply_nested_data() {
    check(
        "(define (nest n)
           (let loop ((i 0) (x 0)) (if (= i n) x (loop (+ i 1) (list x)))))
         (list (equal? (nest 200000) (nest 200000))
               (equal? (nest 200000) (nest 199999)))",
        expect!["(#t #f)"],
    );
}

#[test]
fn escaping_continuation() {
    check("(call/cc (lambda (k) (+ 1 (k 42))))", expect!["42"]);
    check("(+ 1 (call/cc (lambda (k) 1)))", expect!["2"]);
}

#[test]
fn continuation_replay() {
    check(
        "(let ((r '()) (saved #f))
           (set! r (cons (* 10 (call/cc (lambda (k) (set! saved k) 0))) r))
           (if (< (length r) 3) (saved (length r)) (reverse r)))",
        expect!["(0 10 20)"],
    );
}

const LOGGER: &str = "
    (define log '())
    (define (note x) (set! log (cons x log)))
";

fn check_log(src: &str, expected: Expect) {
    let (mut top, _) = toplevel(None);
    top.eval_str(LOGGER).unwrap();
    top.eval_str(src).unwrap();
    let log = top.eval_str("(reverse log)").unwrap();
    expected.assert_eq(&log.to_string());
}

#[test]
fn wind_normal_exit() {
    check_log(
        "(dynamic-wind
           (lambda () (note 'enter1))
           (lambda ()
             (dynamic-wind
               (lambda () (note 'enter2))
               (lambda () (note 'body))
               (lambda () (note 'exit2))))
           (lambda () (note 'exit1)))",
        expect!["(enter1 enter2 body exit2 exit1)"],
    );
}

#[test]
fn wind_throw_unwinds_innermost_first() {
    check_log(
        "(catch (lambda (e) (note e))
           (dynamic-wind
             (lambda () (note 'enter1))
             (lambda ()
               (dynamic-wind
                 (lambda () (note 'enter2))
                 (lambda () (throw 'boom))
                 (lambda () (note 'exit2))))
             (lambda () (note 'exit1))))",
        expect!["(enter1 enter2 exit2 exit1 boom)"],
    );
}

#[test]
fn wind_escape_runs_exit_thunk() {
    check_log(
        "(call/cc
           (lambda (out)
             (dynamic-wind
               (lambda () (note 'in))
               (lambda () (out 1) (note 'unreachable))
               (lambda () (note 'out)))))",
        expect!["(in out)"],
    );
}

#[test]
fn wind_reentry_runs_entry_thunks_outermost_first() {
    check_log(
        "(define k2 #f)
         (define n 0)
         (dynamic-wind
           (lambda () (note 'enter1))
           (lambda ()
             (dynamic-wind
               (lambda () (note 'enter2))
               (lambda () (call/cc (lambda (k) (set! k2 k))) (note 'body))
               (lambda () (note 'exit2))))
           (lambda () (note 'exit1)))
         (if (= n 0) (begin (set! n 1) (k2 0)) 'done)",
        expect!["(enter1 enter2 body exit2 exit1 enter1 enter2 body exit2 exit1)"],
    );
}

#[test]
fn double_fault_keeps_newest() {
    check(
        "(catch (lambda (e) e)
           (dynamic-wind
             (lambda () #t)
             (lambda () (throw 'first))
             (lambda () (throw 'second))))",
        expect!["second"],
    );
}

#[test]
fn catch_and_throw() {
    assert_eq!(eval("(throw 'x)"), Outcome::Uncaught(Value::sym("x")));
    check("(catch (lambda (e) (+ e 1)) (throw 5))", expect!["6"]);
    check(
        "(define hits 0)
         (catch (lambda (e) (set! hits (+ hits 1)) e) (throw 5))
         hits",
        expect!["1"],
    );
    check("(catch (lambda (e) 0) 7)", expect!["7"]);
}

#[test]
fn builtin_errors_are_catchable() {
    check(
        "(catch (lambda (e) (condition-kind e)) (car 1))",
        expect!["wrong-type"],
    );
    check(
        "(catch (lambda (e) (condition-message e)) (error \"bad thing\" 1 2))",
        expect![[r#""bad thing""#]],
    );
    check(
        "(catch (lambda (e) (condition-irritants e)) (error \"bad thing\" 1 2))",
        expect!["(1 2)"],
    );
    check(
        "(catch (lambda (e) (condition-kind e)) (1 2))",
        expect!["wrong-type"],
    );
}

#[test]
fn letrec_forward_reference_is_unbound() {
    assert_eq!(
        uncaught_kind(eval("(letrec ((a b) (b 1)) a)")),
        ConditionKind::UnboundVariable
    );
    check(
        "(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1)))))
                  (odd? (lambda (n) (if (= n 0) #f (even? (- n 1))))))
           (even? 1001))",
        expect!["#f"],
    );
}

#[test]
fn sequential_and_parallel_let() {
    check("(let* ((a 1) (b (+ a 1))) b)", expect!["2"]);
    check("(let ((a 1)) (let ((a 2) (b a)) b))", expect!["1"]);
}

#[test]
fn rest_parameters() {
    check(
        "((lambda (a b . rest) (list a b rest)) 1 2 3 4)",
        expect!["(1 2 (3 4))"],
    );
    check("((lambda args args))", expect!["()"]);
    let outcome = eval("((lambda (a b . rest) a) 1)");
    let Outcome::Uncaught(Value::Condition(c)) = outcome else {
        panic!("expected an arity condition");
    };
    assert_eq!(c.kind, ConditionKind::ArityMismatch);
    assert_eq!(c.message, "lambda: expected at least 2 arguments, got 1");
}

#[test]
fn continuations_take_one_argument() {
    assert_eq!(
        uncaught_kind(eval("(call/cc (lambda (k) (k 1 2)))")),
        ConditionKind::ArityMismatch
    );
}

#[test]
fn shift_and_reset() {
    check(
        "(+ 1 (reset (+ 10 (shift (lambda (k) (k (k 100)))))))",
        expect!["121"],
    );
    check("(+ 1 (reset (+ 10 (shift (lambda (k) 4)))))", expect!["5"]);
    check("(reset 3)", expect!["3"]);
    check(
        "(catch (lambda (e) (condition-kind e)) (shift (lambda (k) k)))",
        expect!["no-prompt"],
    );
}

#[test]
fn partial_continuation_outlives_its_reset() {
    check(
        "(define k (reset (* 2 (shift (lambda (k) k)))))
         (list (k 5) (k 21))",
        expect!["(10 42)"],
    );
}

#[test]
fn dynamic_bindings_follow_the_continuation() {
    check(
        "(dynamic-let ((x 1))
           (let ((f (lambda () (dynamic x))))
             (dynamic-let ((x 2)) (f))))",
        expect!["2"],
    );
    assert_eq!(
        uncaught_kind(eval("(dynamic nope)")),
        ConditionKind::UnboundVariable
    );
}

#[test]
fn globals_link_before_definition() {
    let (mut top, _) = toplevel(None);
    top.eval_str("(define (g) later)").unwrap();
    assert_eq!(
        uncaught_kind(top.eval_str("(g)").unwrap()),
        ConditionKind::UndefinedGlobal
    );
    top.eval_str("(define later 5)").unwrap();
    assert_eq!(top.eval_str("(g)").unwrap(), Outcome::Value(Value::int(5)));
    assert_eq!(top.lookup(&Symbol::new("later")), Some(Value::int(5)));
}

#[test]
fn host_definitions() {
    let (mut top, _) = toplevel(None);
    top.define(Symbol::new("answer"), Value::int(42));
    assert_eq!(
        top.eval_str("(+ answer 1)").unwrap(),
        Outcome::Value(Value::int(43))
    );
}

#[test]
fn derived_forms() {
    check(
        "(cond (#f 1) ((+ 1 1) => (lambda (x) (* x 10))) (else 0))",
        expect!["20"],
    );
    check("(cond (#f 1) (else 'other))", expect!["other"]);
    check("(when (< 1 2) 'yes)", expect!["yes"]);
    check("(and 1 2 3)", expect!["3"]);
    check("(or #f #f)", expect!["#f"]);
    check(
        "(let ((x 1) (ys '(2 3))) `(a ,x ,@ys b))",
        expect!["(a 1 2 3 b)"],
    );
}

#[test]
fn higher_order_builtins() {
    check(
        "(map (lambda (x y) (+ x y)) '(1 2 3) '(10 20))",
        expect!["(11 22)"],
    );
    check("(apply + 1 2 '(3 4))", expect!["10"]);
    check_log(
        "(for-each note '(a b c))",
        expect!["(a b c)"],
    );
}

#[test]
fn console_output() {
    let (mut top, transcript) = toplevel(None);
    let outcome = top
        .eval_str("(display \"hi\") (write \"hi\") (newline) (display #\\a) 'ok")
        .unwrap();
    assert_eq!(outcome, Outcome::Value(Value::sym("ok")));
    assert_eq!(transcript.contents(), "hi\"hi\"\na");
}

#[test]
fn suspend_and_post() {
    let (mut top, _) = toplevel(None);
    let tick = Symbol::new("tick");
    let outcome = top.eval_str("(+ 1 (wait-signal 'tick))").unwrap();
    assert_eq!(outcome, Outcome::Suspended(tick.clone()));
    assert_eq!(
        top.post(&tick, Value::int(41)).unwrap(),
        Outcome::Value(Value::int(42))
    );
    assert!(matches!(
        top.post(&tick, Value::int(0)),
        Err(Error::Reduction(ReductionError::NotWaiting(_)))
    ));
}

#[test]
fn post_error_throws_into_the_waiter() {
    let (mut top, _) = toplevel(None);
    let tick = Symbol::new("tick");
    top.eval_str("(catch (lambda (e) (list 'caught e)) (wait-signal 'tick))")
        .unwrap();
    assert_eq!(
        top.post_error(&tick, Value::sym("timeout")).unwrap().to_string(),
        "(caught timeout)"
    );
}

#[test]
fn iteration_limit() {
    let (mut top, _) = toplevel(Some(1000));
    assert!(matches!(
        top.eval_str("(let loop () (loop))"),
        Err(Error::Reduction(ReductionError::LimitExceeded(1000)))
    ));
    top.machine().set_limit(None);
    assert_eq!(top.eval_str("1").unwrap(), Outcome::Value(Value::int(1)));
}

#[test]
fn compile_errors_surface() {
    let (mut top, _) = toplevel(None);
    assert!(matches!(top.eval_str("(lambda)"), Err(Error::Compile(_))));
    assert!(matches!(top.eval_str("(+ 1"), Err(Error::Parser(_))));
}
