// Copyright (C) 2024 Ryan Daum <ryan.daum@gmail.com>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

mod common;
use common::{create_db, eval, WIZARD};

use moor_var::{v_int, v_list, v_none, v_obj, v_str, Error};

#[test]
fn test_changing_programmer_and_wizard_flags() {
    let db = create_db();

    let obj = eval(&db, WIZARD, "return create(#0);").unwrap();

    db.assert_eval(WIZARD, format!("return {{{obj}.programmer, {obj}.wizard}};"), v_list(vec![v_int(0), v_int(0)]));

    db.assert_eval(WIZARD, format!("{obj}.programmer = 1; {obj}.wizard = 1;"), v_none());
    db.assert_eval(WIZARD, format!("return {{{obj}.programmer, {obj}.wizard}};"), v_list(vec![v_int(1), v_int(1)]));

    db.assert_eval(WIZARD, format!("{obj}.programmer = 0; {obj}.wizard = 0;"), v_none());
    db.assert_eval(WIZARD, format!("return {{{obj}.programmer, {obj}.wizard}};"), v_list(vec![v_int(0), v_int(0)]));
}

#[test]
fn test_property_inheritance_and_clear() {
    let db = create_db();

    let parent = eval(&db, WIZARD, "return create(#0);").unwrap();
    let child = eval(&db, WIZARD, &format!("return create({parent});")).unwrap();

    db.assert_eval(
        WIZARD,
        format!("add_property({parent}, \"greeting\", \"hello\", {{{WIZARD}, \"rc\"}}); return 0;"),
        v_int(0),
    );

    // The child inherits the parent's value until it's overridden locally.
    db.assert_eval(WIZARD, format!("return {child}.greeting;"), v_str("hello"));

    db.assert_eval(WIZARD, format!("{child}.greeting = \"hi\"; return 0;"), v_int(0));
    db.assert_eval(WIZARD, format!("return {child}.greeting;"), v_str("hi"));
    db.assert_eval(WIZARD, format!("return {parent}.greeting;"), v_str("hello"));

    db.assert_eval(WIZARD, format!("clear_property({child}, \"greeting\"); return 0;"), v_int(0));
    db.assert_eval(WIZARD, format!("return {child}.greeting;"), v_str("hello"));
}

#[test]
fn test_verb_definition_and_dispatch() {
    let db = create_db();

    let obj = eval(&db, WIZARD, "return create(#0);").unwrap();

    db.assert_eval(
        WIZARD,
        format!("add_verb({obj}, {{{WIZARD}, \"rxd\", \"double\"}}, {{\"this\", \"none\", \"this\"}}); return 0;"),
        v_int(0),
    );
    db.assert_eval(
        WIZARD,
        format!("set_verb_code({obj}, \"double\", {{\"return args[1] * 2;\"}}); return 0;"),
        v_int(0),
    );

    db.assert_eval(WIZARD, format!("return {obj}:double(21);"), v_int(42));
}

#[test]
fn test_try_except_catches_builtin_error() {
    let db = create_db();

    db.assert_eval(
        WIZARD,
        "try return 1 / 0; except e (E_DIV) return \"caught\"; endtry",
        v_str("caught"),
    );
}

#[test]
fn test_for_loop_accumulates_over_a_list() {
    let db = create_db();

    db.assert_eval(
        WIZARD,
        "total = 0; for x in ({1, 2, 3, 4}) total = total + x; endfor return total;",
        v_int(10),
    );
}

#[test]
fn test_list_and_string_builtins() {
    let db = create_db();

    db.assert_eval(WIZARD, "return length(\"hello\");", v_int(5));
    db.assert_eval(WIZARD, "return listappend({1, 2}, 3);", v_list(vec![v_int(1), v_int(2), v_int(3)]));
    db.assert_eval(WIZARD, "return index(\"hello world\", \"world\");", v_int(7));
}

#[test]
fn test_create_sets_owner_and_parent() {
    let db = create_db();

    let obj = eval(&db, WIZARD, "return create(#0);").unwrap();
    db.assert_eval(WIZARD, format!("return owner({obj});"), v_obj(WIZARD));
    db.assert_eval(WIZARD, format!("return parent({obj});"), v_obj(WIZARD));
}

#[test]
fn test_division_by_zero_raises_e_div() {
    let db = create_db();
    db.assert_raises(WIZARD, "return 1 / 0;", Error::E_DIV);
}
