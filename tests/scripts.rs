use std::{cell::RefCell, rc::Rc};

use ember::{Ember, EmberError, Fault, FaultKind, HostArg, HostBridge, HostObject};

/// Run a script and capture its print output.
fn run(source: &str) -> Result<String, EmberError> {
	run_with(Ember::new, source)
}

fn run_with(make: impl FnOnce() -> Ember, source: &str) -> Result<String, EmberError> {
	let output = Rc::new(RefCell::new(String::new()));
	let sink = output.clone();
	let ember = make().with_print(move |text| sink.borrow_mut().push_str(text));
	ember.run("test", source)?;
	let text = output.borrow().clone();
	Ok(text)
}

fn run_ok(source: &str) -> String {
	match run(source) {
		Ok(output) => output,
		Err(e) => panic!("script failed: {e}"),
	}
}

fn run_fault(source: &str) -> Fault {
	match run(source) {
		Err(EmberError::Fault(fault)) => fault,
		Ok(output) => panic!("expected fault, got output {output:?}"),
		Err(other) => panic!("expected fault, got {other}"),
	}
}

// ---- expressions ----------------------------------------------------------

#[test]
fn arithmetic_precedence() {
	assert_eq!(run_ok("print 1 + 2 * 3;"), "7\n");
	assert_eq!(run_ok("print (1 + 2) * 3;"), "9\n");
	assert_eq!(run_ok("print 10 / 4;"), "2.5\n");
	assert_eq!(run_ok("print 7 % 3;"), "1\n");
}

#[test]
fn equality_is_a_single_sign() {
	assert_eq!(run_ok("print 1 + 2 = 3;"), "true\n");
	assert_eq!(run_ok("print 2 != 3;"), "true\n");
	assert_eq!(run_ok("print \"ab\" = \"ab\";"), "true\n");
}

#[test]
fn logical_operators_bind_last_and_never_short_circuit() {
	assert_eq!(run_ok("print 1 < 2 & 3 < 4;"), "true\n");
	let output = run_ok(
		"func side() {
			print \"side\";
			return false;
		}
		if false & side() {
			print \"never\";
		}
		print \"after\";",
	);
	assert_eq!(output, "side\nafter\n");
}

#[test]
fn negative_literal_after_operand_adds() {
	assert_eq!(run_ok("var a = 10; print a -3;"), "7\n");
}

#[test]
fn division_by_zero_faults() {
	let fault = run_fault("print 1 / 0;");
	assert!(matches!(fault.kind(), FaultKind::DivisionByZero));
}

#[test]
fn ternary_and_coalesce() {
	// The ternary fires on a single bool operand, so a comparison test
	// needs parentheses or a variable.
	assert_eq!(run_ok("var x = 5; print (x > 3) ? \"big\" : \"small\";"), "big\n");
	assert_eq!(run_ok("var big = 1 > 3; print big ? \"big\" : \"small\";"), "small\n");
	assert_eq!(run_ok("var a = null; print a ?? 9;"), "9\n");
	assert_eq!(run_ok("var b = 1; print b ?? throw new Exception(\"no\");"), "1\n");
	// `+ -` reduces before `??`.
	assert_eq!(run_ok("print null ?? 2 + 3;"), "5\n");
	let output = run_ok(
		"try {
			var r = true ? throw new Exception(\"boom\") : 1;
		} catch e {
			print e.message;
		}",
	);
	assert_eq!(output, "boom\n");
}

#[test]
fn operand_checks_join_the_binary_sweeps() {
	assert_eq!(run_ok("print 1 is number & 2 is number;"), "true\n");
	assert_eq!(run_ok("print 1 is bool | 1 is number;"), "true\n");
	assert_eq!(run_ok("var x = 1; print x is number ? \"num\" : \"other\";"), "num\n");
}

#[test]
fn type_checks() {
	assert_eq!(run_ok("print 1 is number;"), "true\n");
	assert_eq!(run_ok("print \"s\" is string;"), "true\n");
	assert_eq!(run_ok("print 2 is not bool;"), "true\n");
	assert_eq!(run_ok("class Point(x, y) { } print new Point() is Point;"), "true\n");
	assert_eq!(run_ok("var t = typeof 1; print t.name;"), "number\n");
	assert_eq!(run_ok("var t = typeof \"hey\"; print t.name;"), "string\n");
}

#[test]
fn step_operators() {
	assert_eq!(run_ok("var i = 1; print i++; print i;"), "1\n2\n");
	assert_eq!(run_ok("var i = 1; print ++i; print i;"), "2\n2\n");
	assert_eq!(run_ok("var i = 5; i--; print i;"), "4\n");
	assert_eq!(run_ok("var s = \"a\"; s += \"b\"; print s;"), "ab\n");
	assert_eq!(run_ok("var n = 3; n -= 2; print n;"), "1\n");
}

// ---- strings and arrays ---------------------------------------------------

#[test]
fn string_operations() {
	assert_eq!(run_ok("print \"ab\" + 1;"), "ab1\n");
	assert_eq!(run_ok("print 1 + \"ab\";"), "1ab\n");
	assert_eq!(run_ok("print \"ab\" + null;"), "abNULL\n");
	assert_eq!(run_ok("print \"ab\" * 3;"), "ababab\n");
	assert_eq!(run_ok("print lenof \"abc\";"), "3\n");
	assert_eq!(run_ok("var s = \"abc\"; print s[1];"), "b\n");
}

#[test]
fn string_interpolation() {
	assert_eq!(run_ok("var name = \"world\"; print $\"hello {name}!\";"), "hello world!\n");
	assert_eq!(run_ok("print $\"sum {1 + 2 * 3}\";"), "sum 7\n");
	assert_eq!(run_ok("print @\"no \\n escape\";"), "no \\n escape\n");
}

#[test]
fn string_chars_are_iterable() {
	assert_eq!(run_ok("foreach c in \"abc\" { print c; }"), "a\nb\nc\n");
}

#[test]
fn array_literals_and_indexing() {
	assert_eq!(run_ok("var a = [10, 20, 30]; print a[0] + a[2];"), "40\n");
	assert_eq!(run_ok("var a = new Array(2); a[0] = 1; a[1] = 2; print lenof a;"), "2\n");
	assert_eq!(run_ok("var a = new Array(); print lenof a;"), "0\n");
	let fault = run_fault("var a = [1]; print a[3];");
	assert!(matches!(fault.kind(), FaultKind::IndexOutOfRange { index: 3, len: 1 }));
}

#[test]
fn char_arithmetic() {
	assert_eq!(run_ok("print 'a' + 1;"), "98\n");
	assert_eq!(run_ok("print 'b' - 'a';"), "1\n");
}

// ---- declarations and scope -----------------------------------------------

#[test]
fn variables_and_shadowing() {
	assert_eq!(run_ok("var x = 1; { var x = 2; print x; } print x;"), "2\n1\n");
	assert_eq!(run_ok("x = 5; print x;"), "5\n");
	let fault = run_fault("const c = 1; c = 2;");
	assert!(matches!(fault.kind(), FaultKind::ConstReassigned(_)));
	assert_eq!(run_ok("const k; k = 7; print k;"), "7\n");
}

#[test]
fn unknown_identifier_faults() {
	let fault = run_fault("print nothing;");
	assert!(matches!(fault.kind(), FaultKind::UnknownIdentifier(_)));
}

// ---- control flow ---------------------------------------------------------

#[test]
fn if_else_chain() {
	let output = run_ok(
		"var n = 2;
		if n = 1 {
			print \"one\";
		} else if n = 2 {
			print \"two\";
		} else {
			print \"other\";
		}",
	);
	assert_eq!(output, "two\n");
}

#[test]
fn else_runs_after_a_while_that_never_ran() {
	let output = run_ok(
		"while false {
			print \"never\";
		} else {
			print \"fallback\";
		}",
	);
	assert_eq!(output, "fallback\n");
	let output = run_ok(
		"var i = 0;
		while i < 2 {
			i += 1;
		} else {
			print \"skipped\";
		}
		print i;",
	);
	assert_eq!(output, "2\n");
}

#[test]
fn else_without_conditional_faults() {
	let fault = run_fault("else { print 1; }");
	assert!(matches!(fault.kind(), FaultKind::ElseWithoutConditional));
}

#[test]
fn while_with_counter_attribute() {
	let output = run_ok(
		"var sum = 0;
		while sum < 6 : counter i {
			sum += 2;
			print i;
		}",
	);
	assert_eq!(output, "0\n1\n2\n");
}

#[test]
fn labeled_break_crosses_loops() {
	let output = run_ok(
		"while true : id outer, counter i {
			while true : id inner {
				if i > 1 {
					break outer;
				}
				break inner;
			}
			print i;
		}
		print \"done\";",
	);
	assert_eq!(output, "0\n1\ndone\n");
}

#[test]
fn for_loop_runs_step_after_continue() {
	let output = run_ok(
		"for var i = 0; i < 5; i += 1 {
			if i = 2 {
				continue;
			}
			print i;
		}",
	);
	assert_eq!(output, "0\n1\n3\n4\n");
}

#[test]
fn for_loop_with_empty_condition_breaks_out() {
	let output = run_ok(
		"for var i = 0; ; i += 1 {
			if i = 3 {
				break;
			}
		}
		print \"done\";",
	);
	assert_eq!(output, "done\n");
}

#[test]
fn foreach_with_counter() {
	assert_eq!(
		run_ok("foreach item in [10, 20, 30] : counter i { print item + i; }"),
		"10\n21\n32\n"
	);
}

#[test]
fn loop_bindings_persist_across_iterations() {
	let output = run_ok(
		"for var i = 0; i < 2; i += 1 {
			if i = 0 {
				y = 1;
			}
			print y;
		}",
	);
	assert_eq!(output, "1\n1\n");
	// Reclaimed once the loop exits.
	let fault = run_fault("for var i = 0; i < 1; i += 1 { y = 5; } print y;");
	assert!(matches!(fault.kind(), FaultKind::UnknownIdentifier(_)));
}

#[test]
fn break_outside_loop_faults() {
	let fault = run_fault("break;");
	assert!(matches!(fault.kind(), FaultKind::BreakOutsideLoop));
}

#[test]
fn inline_bodies_need_no_braces() {
	assert_eq!(run_ok("var n = 1; if n = 1 print \"hit\";"), "hit\n");
	assert_eq!(run_ok("var i = 0; while i < 3 i += 1; print i;"), "3\n");
}

// ---- functions ------------------------------------------------------------

#[test]
fn functions_and_recursion() {
	let output = run_ok(
		"func fib(n) {
			if n < 2 {
				return n;
			}
			return fib(n - 1) + fib(n - 2);
		}
		print fib(10);",
	);
	assert_eq!(output, "55\n");
}

#[test]
fn function_without_return_yields_null() {
	assert_eq!(run_ok("func noop() { } print noop();"), "NULL\n");
}

#[test]
fn notnull_parameter_rejects_null() {
	let fault = run_fault("func f(x notnull) { return x; } f(null);");
	assert!(matches!(fault.kind(), FaultKind::NullArgument(_)));
}

#[test]
fn wrong_arity_faults() {
	let fault = run_fault("func f(a, b) { return a; } f(1);");
	assert!(matches!(fault.kind(), FaultKind::WrongArgumentCount { expected: 2, got: 1, .. }));
}

#[test]
fn return_outside_function_faults() {
	let fault = run_fault("return 1;");
	assert!(matches!(fault.kind(), FaultKind::ReturnOutsideFunction));
}

#[test]
fn recursion_limit_faults() {
	let fault = run_fault("func down() { return down(); } down();");
	assert!(matches!(fault.kind(), FaultKind::RecursionLimit));
}

// ---- classes --------------------------------------------------------------

#[test]
fn constructors_overload_by_arity() {
	let output = run_ok(
		"class Point(x, y) {
			constructor() {
				x = 0;
				y = 0;
			}
			constructor(a, b) {
				x = a;
				y = b;
			}
		}
		var p = new Point(3, 4);
		print p.x + p.y;
		var q = new Point();
		print q.x;",
	);
	assert_eq!(output, "7\n0\n");
}

#[test]
fn property_defaults() {
	assert_eq!(run_ok("class Box(size = 2) { } print new Box().size;"), "2\n");
}

#[test]
fn methods_see_properties_bare() {
	let output = run_ok(
		"class Counter(total = 0) {
			func bump() {
				total += 1;
			}
			func report() {
				bump();
				return total;
			}
		}
		var c = new Counter();
		c.bump();
		print c.report();",
	);
	assert_eq!(output, "2\n");
}

#[test]
fn statics_and_static_constructor() {
	let output = run_ok(
		"class Config() {
			static limit = 10;
			static loaded;
			static constructor() {
				loaded = true;
			}
		}
		print Config.limit;
		print Config.loaded;",
	);
	assert_eq!(output, "10\ntrue\n");
}

#[test]
fn private_members_are_sealed() {
	let output = run_ok(
		"class Safe(private secret) {
			constructor(s) {
				secret = s;
			}
			func reveal() {
				return secret;
			}
		}
		print new Safe(7).reveal();",
	);
	assert_eq!(output, "7\n");
	let fault = run_fault(
		"class Safe(private secret) {
			constructor(s) {
				secret = s;
			}
		}
		print new Safe(7).secret;",
	);
	assert!(matches!(fault.kind(), FaultKind::PrivateAccess(_)));
}

#[test]
fn enums_are_const_statics() {
	let output = run_ok(
		"enum Color {
			Red,
			Green = 5,
			Blue,
		}
		print Color.Red;
		print Color.Green;
		print Color.Blue;",
	);
	assert_eq!(output, "0\n5\n1\n");
}

#[test]
fn namespaces_qualify_classes() {
	let output = run_ok(
		"namespace geo:
		class Point(x = 1) { }
		print new geo::Point().x;
		print new Point().x;",
	);
	assert_eq!(output, "1\n1\n");
}

#[test]
fn duplicate_class_faults() {
	let fault = run_fault("class A() { } class A() { }");
	assert!(matches!(fault.kind(), FaultKind::DuplicateClass(_)));
}

// ---- exceptions -----------------------------------------------------------

#[test]
fn throw_and_catch() {
	let output = run_ok(
		"try {
			throw new Exception(\"bad\");
			print \"unreached\";
		} catch e {
			print \"caught \" + e.message;
		}
		print \"after\";",
	);
	assert_eq!(output, "caught bad\nafter\n");
}

#[test]
fn uncaught_exception_is_a_fault() {
	let fault = run_fault("throw new Exception(\"bad\");");
	assert!(matches!(fault.kind(), FaultKind::UncaughtException(m) if m == "bad"));
}

#[test]
fn uncaught_exception_reports_its_throw_site() {
	let fault = run_fault("var ok = 1;\nthrow new Exception(\"boom\");");
	assert!(matches!(fault.kind(), FaultKind::UncaughtException(m) if m == "boom"));
	assert!(fault.to_string().starts_with("test 2:"), "{fault}");
}

#[test]
fn throwing_a_non_exception_faults() {
	let fault = run_fault("throw 1;");
	assert!(matches!(fault.kind(), FaultKind::ThrowRequiresException));
}

#[test]
fn when_guard_filters_exceptions() {
	let output = run_ok(
		"try {
			try {
				throw new Exception(\"b\");
			} catch e when e.message = \"a\" {
				print \"inner\";
			}
		} catch e {
			print \"outer \" + e.message;
		}",
	);
	assert_eq!(output, "outer b\n");
	let output = run_ok(
		"try {
			throw new Exception(\"a\");
		} catch e when e.message = \"a\" {
			print \"matched\";
		}",
	);
	assert_eq!(output, "matched\n");
}

#[test]
fn bare_try_swallows() {
	assert_eq!(run_ok("try { throw new Exception(\"gone\"); } print \"after\";"), "after\n");
}

#[test]
fn finally_swallows_a_propagating_exception() {
	let output = run_ok(
		"try {
			throw new Exception(\"gone\");
		} finally {
			print \"cleanup\";
		}
		print \"after\";",
	);
	assert_eq!(output, "cleanup\nafter\n");
}

#[test]
fn finally_runs_on_the_normal_path_too() {
	let output = run_ok(
		"func f() {
			try {
				return 1;
			} finally {
				print \"cleanup\";
			}
		}
		print f();",
	);
	assert_eq!(output, "cleanup\n1\n");
}

#[test]
fn section_hands_its_exception_to_the_enclosing_catch() {
	let output = run_ok(
		"try {
			section {
				throw new Exception(\"s\");
				print \"unreached\";
			}
			print \"resumed\";
		} catch e {
			print \"handled \" + e.message;
		}",
	);
	assert_eq!(output, "handled s\nresumed\n");
}

#[test]
fn section_without_a_handler_absorbs() {
	let output = run_ok(
		"section {
			throw new Exception(\"s\");
		}
		print \"after\";",
	);
	assert_eq!(output, "after\n");
}

// ---- imports and includes -------------------------------------------------

#[test]
fn imports_provide_definitions() {
	let lib = "func twice(n) { return n * 2; }
		class Pair(a, b) {
			constructor(x, y) {
				a = x;
				b = y;
			}
		}";
	let output = run_with(
		|| Ember::new().import("lib", lib),
		"var p = new Pair(twice(2), 5);
		print p.a + p.b;",
	)
	.unwrap();
	assert_eq!(output, "9\n");
}

#[test]
fn leading_includes_are_stripped() {
	let output = run_ok(
		"#include <util>
		print 1;",
	);
	assert_eq!(output, "1\n");
}

// ---- host bridge ----------------------------------------------------------

struct MathBridge;

impl HostBridge for MathBridge {
	fn resolve_type(&self, full_name: &str) -> bool { full_name == "Test.Math" }

	fn construct(&self, _type_name: &str, args: &[HostArg]) -> Result<HostArg, String> {
		match args {
			[HostArg::Num(n)] => {
				Ok(HostArg::Boxed(HostObject { type_name: "Test.Math".into(), value: Rc::new(*n) }))
			}
			_ => Err("Math wants one number".into()),
		}
	}

	fn invoke(
		&self,
		_type_name: &str,
		target: Option<&HostObject>,
		member: &str,
		args: &[HostArg],
	) -> Result<HostArg, String> {
		match (target, member, args) {
			(Some(obj), "Add", [HostArg::Num(n)]) => {
				let base = obj.value.downcast_ref::<f64>().copied().unwrap_or(0.0);
				Ok(HostArg::Num(base + n))
			}
			(None, "Square", [HostArg::Num(n)]) => Ok(HostArg::Num(n * n)),
			_ => Err(format!("unknown member {member}")),
		}
	}
}

#[test]
fn extern_classes_route_through_the_bridge() {
	let output = run_with(
		|| Ember::new().with_bridge(Rc::new(MathBridge)),
		"extern class Math = \"Test.Math\";
		var m = new Math(10);
		print m.add(5);
		print Math.square(4);",
	)
	.unwrap();
	assert_eq!(output, "15\n16\n");
}

#[test]
fn host_errors_become_catchable_exceptions() {
	let output = run_with(
		|| Ember::new().with_bridge(Rc::new(MathBridge)),
		"extern class Math = \"Test.Math\";
		try {
			Math.missing();
		} catch e {
			print e.message;
		}",
	)
	.unwrap();
	assert_eq!(output, "unknown member Missing\n");
}

#[test]
fn unresolved_extern_type_faults() {
	let fault = match run("extern class Nope = \"No.Such.Type\";") {
		Err(EmberError::Fault(fault)) => fault,
		other => panic!("expected fault, got {other:?}"),
	};
	assert!(matches!(fault.kind(), FaultKind::ExternUnresolved(_)));
}
