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

//! Command parsing and verb dispatch (spec.md §4.6 "Command parsing"). Turns a raw line of
//! player input into a resolved, compiled `Activation`, the same way a `$do_command`-less
//! reference server would: tokenize, split on the first preposition, match `dobj`/`iobj` against
//! the player's immediate surroundings, then walk `{player, location, dobj, iobj}` looking for a
//! verb whose argspec accepts what was typed.

use moor_common::matching::parse_command_line;
use moor_var::{v_str, Objid, Var};

use moor_db::WorldState;

use crate::vm::program_cache::ProgramCache;
use crate::vm::Activation;

/// Resolves `line` against `player`'s surroundings and returns a pushable frame, or a
/// user-facing message ("I don't understand that.", permission errors) on failure.
pub fn dispatch(world: &WorldState, player: Objid, line: &str, cache: &mut ProgramCache) -> Result<Activation, String> {
    let parsed = parse_command_line(line);
    if parsed.verb.is_empty() {
        return Err("I don't understand that.".to_string());
    }

    let location = world.location_of(player).unwrap_or(Objid::NOTHING);
    let mut candidates = vec![player, location];
    if world.valid(location) {
        candidates.extend(world.contents_of(location).unwrap_or_default());
    }
    if world.valid(player) {
        candidates.extend(world.contents_of(player).unwrap_or_default());
    }

    let dobj = match_object(world, player, location, &candidates, &parsed.dobjstr);
    let iobj = match_object(world, player, location, &candidates, &parsed.iobjstr);

    if dobj == Objid::AMBIGUOUS_MATCH || iobj == Objid::AMBIGUOUS_MATCH {
        return Err("I don't know which one you mean.".to_string());
    }

    let mut tried = Vec::new();
    for receiver in [player, location, dobj, iobj] {
        if !world.valid(receiver) || tried.contains(&receiver) {
            continue;
        }
        tried.push(receiver);
        let Ok((defining, vd)) = world.resolve_verb(receiver, &parsed.verb) else {
            continue;
        };
        let spec_ok = vd.args.dobj.matches(dobj, receiver)
            && vd.args.prep.matches(match parsed.prep {
                moor_common::matching::PrepSpec::Specific(p) => Some(p),
                _ => None,
            })
            && vd.args.iobj.matches(iobj, receiver);
        if !spec_ok {
            continue;
        }
        return Ok(build_frame(player, receiver, defining, &vd, &parsed, dobj, iobj, cache));
    }

    Err("I don't understand that.".to_string())
}

/// Resolves `"me"`/`"here"`/an exact or prefix name match against `candidates`, per spec.md §4.6
/// step 4. Empty `text` (no dobj/iobj typed) resolves to `NOTHING`, distinct from a typed-but-
/// unmatched string (`FAILED_MATCH`).
fn match_object(world: &WorldState, player: Objid, location: Objid, candidates: &[Objid], text: &str) -> Objid {
    if text.is_empty() {
        return Objid::NOTHING;
    }
    let lower = text.to_lowercase();
    if lower == "me" {
        return player;
    }
    if lower == "here" {
        return location;
    }

    let mut exact = Vec::new();
    let mut prefix = Vec::new();
    for &cand in candidates {
        if !world.valid(cand) {
            continue;
        }
        let Ok(name) = world.name_of(cand) else { continue };
        let name_lower = name.to_lowercase();
        if name_lower == lower {
            exact.push(cand);
        } else if name_lower.starts_with(&lower) {
            prefix.push(cand);
        }
    }

    match exact.len() {
        1 => exact[0],
        0 => match prefix.len() {
            1 => prefix[0],
            0 => Objid::FAILED_MATCH,
            _ => Objid::AMBIGUOUS_MATCH,
        },
        _ => Objid::AMBIGUOUS_MATCH,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_frame(
    player: Objid,
    receiver: Objid,
    defining: Objid,
    vd: &moor_db::object::VerbDef,
    parsed: &moor_common::matching::ParsedCommand,
    dobj: Objid,
    iobj: Objid,
    cache: &mut ProgramCache,
) -> Activation {
    let program = cache
        .get_or_compile(vd.uuid, &vd.source)
        .unwrap_or_else(|_| std::sync::Arc::new(moor_compiler::Program {
            main_vector: vec![moor_compiler::Op::ReturnNone],
            literals: vec![],
            var_names: moor_compiler::Names::default(),
            line_number_spans: vec![],
            fork_vectors: vec![],
        }));

    let mut frame = Activation::new(
        moor_var::v_obj(receiver),
        player,
        vd.owner,
        player,
        parsed.verb.clone(),
        defining,
        vec![],
        false,
        program,
    );

    bind(&mut frame, "player", moor_var::v_obj(player));
    bind(&mut frame, "this", moor_var::v_obj(receiver));
    bind(&mut frame, "caller", moor_var::v_obj(player));
    bind(&mut frame, "verb", v_str(&parsed.verb));
    bind(&mut frame, "argstr", v_str(&parsed.argstr));
    bind(&mut frame, "args", moor_var::v_list(parsed.args.iter().map(|s| v_str(s)).collect()));
    bind(&mut frame, "dobj", moor_var::v_obj(dobj));
    bind(&mut frame, "dobjstr", v_str(&parsed.dobjstr));
    bind(&mut frame, "prepstr", v_str(&parsed.prepstr));
    bind(&mut frame, "iobj", moor_var::v_obj(iobj));
    bind(&mut frame, "iobjstr", v_str(&parsed.iobjstr));

    frame
}

fn bind(frame: &mut Activation, name: &str, value: Var) {
    if let Some(n) = frame.program.var_names.find(name) {
        frame.locals[n.0 as usize] = value;
    }
}
