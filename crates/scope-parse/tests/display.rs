//! Tests for the compact rendering used by verbose runs and step traces.
//!
//! The printed form must keep the tree's grouping: parsing it again yields
//! an expression that prints the same way.

use scope_parse::parse_str;

fn show(src: &str) -> String {
    parse_str("<test>", src).expect("parse failed").to_string()
}

fn assert_stable(src: &str) {
    let once = show(src);
    let twice = show(&once);
    assert_eq!(once, twice, "rendering of {src:?} does not re-parse to itself");
}

#[test]
fn let_as_left_operand_is_parenthesized() {
    assert_eq!(show("(let x = 1 in x) + x"), "((let x = 1 in x) + x)");
}

#[test]
fn let_body_extending_over_operator() {
    assert_eq!(show("let x = 1 in x + x"), "let x = 1 in (x + x)");
}

#[test]
fn sequence_as_operand_is_parenthesized() {
    assert_eq!(show("(a = 1; a) * 2"), "((a = 1; a) * 2)");
}

#[test]
fn assignment_as_operand_is_parenthesized() {
    assert_eq!(show("(x = 3) + 1"), "((x = 3) + 1)");
}

#[test]
fn nested_sequence_keeps_its_group() {
    assert_eq!(show("(1; 2); 3"), "(1; 2); 3");
}

#[test]
fn let_before_semicolon_owns_the_rest() {
    assert_eq!(show("let x = 1 in x; x"), "let x = 1 in x; x");
    assert_eq!(show("(let x = 1 in x); 2"), "(let x = 1 in x); 2");
}

#[test]
fn renderings_re_parse() {
    for src in [
        "(let x = 1 in x) + x",
        "let p = pair(1, 2) in set_snd(p, p); fst(p)",
        "let n = 3 in while n > 0 { n = n - 1 }; n",
        "if (a = 1; a) is 1 { print(a) } else { 0 }",
        "x = y = 2",
    ] {
        assert_stable(src);
    }
}
