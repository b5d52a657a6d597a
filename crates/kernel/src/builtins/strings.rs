// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! `length substr index rindex strcmp strsub match rmatch substitute explode implode tolower
//! toupper crypt string_hash binary_hash value_hash encode_base64 decode_base64 encode_binary
//! decode_binary random_bytes` (spec.md §4.7 "Strings").

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::RegexBuilder;
use sha2::Digest;

use moor_var::{v_int, v_list, v_str, v_string, Error, Var, Variant};

use crate::builtins::types::to_literal;

use super::{arg, want_int, want_str, BuiltinContext, BuiltinFn, BuiltinOutcome};

pub fn register(fns: &mut HashMap<&'static str, BuiltinFn>) {
    fns.insert("length", length);
    fns.insert("substr", substr);
    fns.insert("index", index);
    fns.insert("rindex", rindex);
    fns.insert("strcmp", strcmp);
    fns.insert("strsub", strsub);
    fns.insert("match", match_);
    fns.insert("rmatch", rmatch);
    fns.insert("substitute", substitute);
    fns.insert("explode", explode);
    fns.insert("implode", implode);
    fns.insert("tolower", tolower);
    fns.insert("toupper", toupper);
    fns.insert("crypt", crypt);
    fns.insert("string_hash", string_hash);
    fns.insert("binary_hash", binary_hash);
    fns.insert("value_hash", value_hash);
    fns.insert("encode_base64", encode_base64);
    fns.insert("decode_base64", decode_base64);
    fns.insert("encode_binary", encode_binary);
    fns.insert("decode_binary", decode_binary);
    fns.insert("random_bytes", random_bytes);
}

fn length(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(v) = arg(&args, 0) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    match v.variant() {
        Variant::Str(s) => v_int(s.as_str().chars().count() as i64).into(),
        Variant::List(l) => v_int(l.len() as i64).into(),
        Variant::Map(m) => v_int(m.len() as i64).into(),
        _ => BuiltinOutcome::Raise(Error::E_TYPE),
    }
}

/// 1-based, inclusive on both ends, same convention as the `[...]` range operator (spec.md §4.3
/// "String and list indexing is 1-based").
fn substr(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(s) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let (Ok(start), Ok(len)) = (want_int(&args, 1), want_int(&args, 2)) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let chars: Vec<char> = s.chars().collect();
    let n = chars.len() as i64;
    let lo = start.max(1);
    let hi = (start + len - 1).min(n);
    if lo > hi {
        return v_str("").into();
    }
    v_str(&chars[(lo - 1) as usize..hi as usize].iter().collect::<String>()).into()
}

fn str_index(subject: &str, what: &str, case_matters: bool, from_end: bool) -> i64 {
    if what.is_empty() {
        return if from_end { subject.chars().count() as i64 + 1 } else { 1 };
    }
    let (hay, needle) = if case_matters {
        (subject.to_string(), what.to_string())
    } else {
        (subject.to_lowercase(), what.to_lowercase())
    };
    let found = if from_end { hay.rfind(&needle) } else { hay.find(&needle) };
    match found {
        Some(byte_pos) => hay[..byte_pos].chars().count() as i64 + 1,
        None => 0,
    }
}

fn case_matters_arg(args: &[Var], i: usize) -> Result<bool, Error> {
    match arg(args, i) {
        None => Ok(false),
        Some(v) => v.as_int().map(|n| n != 0).ok_or(Error::E_TYPE),
    }
}

fn index(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let (Ok(subject), Ok(what)) = (want_str(&args, 0), want_str(&args, 1)) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    match case_matters_arg(&args, 2) {
        Ok(cm) => v_int(str_index(subject, what, cm, false)).into(),
        Err(e) => BuiltinOutcome::Raise(e),
    }
}

fn rindex(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let (Ok(subject), Ok(what)) = (want_str(&args, 0), want_str(&args, 1)) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    match case_matters_arg(&args, 2) {
        Ok(cm) => v_int(str_index(subject, what, cm, true)).into(),
        Err(e) => BuiltinOutcome::Raise(e),
    }
}

fn strcmp(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let (Ok(a), Ok(b)) = (want_str(&args, 0), want_str(&args, 1)) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    v_int(a.cmp(b) as i64).into()
}

/// `strsub(subject, what, with [, case-matters])`: every non-overlapping occurrence of `what`
/// replaced by `with`, left to right.
fn strsub(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let (Ok(subject), Ok(what), Ok(with)) = (want_str(&args, 0), want_str(&args, 1), want_str(&args, 2)) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    if what.is_empty() {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let case_matters = match case_matters_arg(&args, 3) {
        Ok(cm) => cm,
        Err(e) => return BuiltinOutcome::Raise(e),
    };
    let out = if case_matters {
        subject.replace(what, with)
    } else {
        replace_case_insensitive(subject, what, with)
    };
    v_string(out).into()
}

fn replace_case_insensitive(subject: &str, what: &str, with: &str) -> String {
    let lower_subject = subject.to_lowercase();
    let lower_what = what.to_lowercase();
    let mut out = String::new();
    let mut rest = subject;
    let mut rest_lower = lower_subject.as_str();
    while let Some(pos) = rest_lower.find(&lower_what) {
        out.push_str(&rest[..pos]);
        out.push_str(with);
        rest = &rest[pos + what.len()..];
        rest_lower = &rest_lower[pos + what.len()..];
    }
    out.push_str(rest);
    out
}

/// Builds the 4-element match result `{start, end, {repl-1..9 starts/ends}, subject}` (ToastStunt
/// `match`/`rmatch`), or `{}` when the pattern doesn't match.
fn do_match(subject: &str, pattern: &str, case_matters: bool, from_end: bool) -> BuiltinOutcome {
    let re = match RegexBuilder::new(pattern).case_insensitive(!case_matters).build() {
        Ok(re) => re,
        Err(_) => return BuiltinOutcome::Raise(Error::E_INVARG),
    };
    let found = if from_end { re.captures_iter(subject).last() } else { re.captures_iter(subject).next() };
    let Some(caps) = found else { return v_list(vec![]).into() };
    let whole = caps.get(0).expect("capture group 0 always present");
    let mut groups = Vec::with_capacity(9);
    for i in 1..=9 {
        match caps.get(i) {
            Some(m) => groups.push(v_list(vec![v_int(m.start() as i64 + 1), v_int(m.end() as i64)])),
            None => groups.push(v_list(vec![v_int(0), v_int(-1)])),
        }
    }
    v_list(vec![
        v_int(whole.start() as i64 + 1),
        v_int(whole.end() as i64),
        v_list(groups),
        v_str(subject),
    ])
    .into()
}

fn match_(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let (Ok(subject), Ok(pattern)) = (want_str(&args, 0), want_str(&args, 1)) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    match case_matters_arg(&args, 2) {
        Ok(cm) => do_match(subject, pattern, cm, false),
        Err(e) => BuiltinOutcome::Raise(e),
    }
}

fn rmatch(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let (Ok(subject), Ok(pattern)) = (want_str(&args, 0), want_str(&args, 1)) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    match case_matters_arg(&args, 2) {
        Ok(cm) => do_match(subject, pattern, cm, true),
        Err(e) => BuiltinOutcome::Raise(e),
    }
}

/// `substitute(template, match-result)`: `%1`..`%9` replaced by the corresponding capture,
/// `%0`/`%%` the whole match / a literal `%`.
fn substitute(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(template) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let Some(result) = arg(&args, 1).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    if result.len() != 4 {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let (Some(whole_start), Some(whole_end), Some(groups), Some(subject)) =
        (result[0].as_int(), result[1].as_int(), result[2].as_list(), result[3].as_str())
    else {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    };
    let chars: Vec<char> = subject.chars().collect();
    let slice = |from: i64, to: i64| -> String {
        if from < 1 || to < from || to as usize > chars.len() {
            return String::new();
        }
        chars[(from - 1) as usize..to as usize].iter().collect()
    };
    let mut out = String::new();
    let mut it = template.chars().peekable();
    while let Some(c) = it.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match it.next() {
            Some('%') => out.push('%'),
            Some('0') => out.push_str(&slice(whole_start, whole_end)),
            Some(d) if d.is_ascii_digit() => {
                let idx = d.to_digit(10).unwrap() as usize;
                if idx == 0 || idx > groups.len() {
                    return BuiltinOutcome::Raise(Error::E_RANGE);
                }
                let Some(pair) = groups[idx - 1].as_list() else {
                    return BuiltinOutcome::Raise(Error::E_INVARG);
                };
                if let (Some(s), Some(e)) = (pair.first().and_then(Var::as_int), pair.get(1).and_then(Var::as_int)) {
                    out.push_str(&slice(s, e));
                }
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    v_string(out).into()
}

fn explode(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(subject) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let sep = match arg(&args, 1) {
        Some(v) => match v.as_str() {
            Some(s) => s.to_string(),
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        },
        None => " ".to_string(),
    };
    let parts: Vec<Var> = if sep.is_empty() {
        subject.split_whitespace().map(v_str).collect()
    } else {
        subject.split(sep.as_str()).map(v_str).collect()
    };
    v_list(parts).into()
}

fn implode(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(list) = arg(&args, 0).and_then(Var::as_list) else {
        return BuiltinOutcome::Raise(Error::E_TYPE);
    };
    let sep = match arg(&args, 1) {
        Some(v) => match v.as_str() {
            Some(s) => s.to_string(),
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        },
        None => " ".to_string(),
    };
    let mut parts = Vec::with_capacity(list.len());
    for v in list {
        match v.as_str() {
            Some(s) => parts.push(s.to_string()),
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        }
    }
    v_string(parts.join(&sep)).into()
}

fn tolower(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(s) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    v_string(s.to_lowercase()).into()
}

fn toupper(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(s) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    v_string(s.to_uppercase()).into()
}

/// Unix `crypt(3)`-compatible DES hash, same algorithm and 2-char salt convention as the
/// reference server (spec.md §4.7 "platform-independent DES-compatible implementation").
fn crypt(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    if args.is_empty() || args.len() > 2 {
        return BuiltinOutcome::Raise(Error::E_ARGS);
    }
    let Ok(text) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let salt = match arg(&args, 1) {
        Some(v) => match v.as_str() {
            Some(s) if s.len() >= 2 => s[..2].to_string(),
            Some(_) => return BuiltinOutcome::Raise(Error::E_INVARG),
            None => return BuiltinOutcome::Raise(Error::E_TYPE),
        },
        None => {
            let mut rng = rand::thread_rng();
            let mut s = String::with_capacity(2);
            s.push(char::from(rng.sample(Alphanumeric)));
            s.push(char::from(rng.sample(Alphanumeric)));
            s
        }
    };
    match pwhash::unix::crypt(text, &salt) {
        Ok(crypted) => v_string(crypted).into(),
        Err(_) => BuiltinOutcome::Raise(Error::E_INVARG),
    }
}

fn string_hash(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(s) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let digest = sha2::Sha256::digest(s.as_bytes());
    v_str(&hex(&digest)).into()
}

fn binary_hash(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(bytes) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let digest = sha2::Sha256::digest(bytes.as_bytes());
    v_str(&hex(&digest)).into()
}

/// `value_hash(v)`: the hash of `v`'s `toliteral()` round-trip form, so two values that print
/// identically hash identically (spec.md §8 invariant 6).
fn value_hash(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Some(v) = arg(&args, 0) else { return BuiltinOutcome::Raise(Error::E_ARGS) };
    let digest = sha2::Sha256::digest(to_literal(v).as_bytes());
    v_str(&hex(&digest)).into()
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn encode_base64(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(s) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    v_string(BASE64.encode(s.as_bytes())).into()
}

fn decode_base64(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(s) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    match BASE64.decode(s) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(s) => v_string(s).into(),
            Err(_) => BuiltinOutcome::Raise(Error::E_INVARG),
        },
        Err(_) => BuiltinOutcome::Raise(Error::E_INVARG),
    }
}

/// `encode_binary(str)`: the reference server's `~XX`-escaped binary-string notation for any byte
/// outside printable ASCII, so non-UTF8 payloads survive a textdump round-trip.
fn encode_binary(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(s) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b == b'~' || !(0x20..0x7f).contains(&b) {
            out.push_str(&format!("~{b:02x}"));
        } else {
            out.push(b as char);
        }
    }
    v_string(out).into()
}

fn decode_binary(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(s) = want_str(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'~' && i + 2 < bytes.len() {
            let Ok(hex_str) = std::str::from_utf8(&bytes[i + 1..i + 3]) else {
                return BuiltinOutcome::Raise(Error::E_INVARG);
            };
            match u8::from_str_radix(hex_str, 16) {
                Ok(b) => {
                    out.push(b);
                    i += 3;
                    continue;
                }
                Err(_) => return BuiltinOutcome::Raise(Error::E_INVARG),
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    match String::from_utf8(out) {
        Ok(s) => v_string(s).into(),
        Err(_) => BuiltinOutcome::Raise(Error::E_INVARG),
    }
}

fn random_bytes(_ctx: &mut BuiltinContext, args: Vec<Var>) -> BuiltinOutcome {
    let Ok(n) = want_int(&args, 0) else { return BuiltinOutcome::Raise(Error::E_TYPE) };
    if n < 0 {
        return BuiltinOutcome::Raise(Error::E_INVARG);
    }
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..n).map(|_| rng.gen()).collect();
    let mut out = String::with_capacity(bytes.len());
    for b in bytes {
        if b == b'~' || !(0x20..0x7f).contains(&b) {
            out.push_str(&format!("~{b:02x}"));
        } else {
            out.push(b as char);
        }
    }
    v_string(out).into()
}
