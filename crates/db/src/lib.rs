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

//! The object store: one `WorldState`, owned by whoever holds it, with no internal transactions
//! or MVCC (spec.md §5 -- the scheduler thread is the only writer, so there is nothing to
//! isolate a transaction *from*).

pub mod dump;
pub mod object;
pub mod worldstate;

pub use dump::{load, save, DumpError};
pub use object::{Object, PropDef, PropValueSlot, VerbDef};
pub use worldstate::WorldState;

#[cfg(test)]
mod tests {
    use moor_common::flags::{BitEnum, ObjFlag};
    use moor_common::matching::VerbArgsSpec;
    use moor_common::model::{ObjAttrs, Perms, WorldStateError};
    use moor_var::{v_int, Objid};

    use super::*;

    fn wizard() -> Perms {
        Perms::new(Objid(0), true, true)
    }

    #[test]
    fn create_object_assigns_sequential_ids() {
        let mut db = WorldState::new();
        let a = db.create_object(Objid(0), ObjAttrs::new(), false).unwrap();
        let b = db.create_object(Objid(0), ObjAttrs::new(), false).unwrap();
        assert_eq!(a, Objid(0));
        assert_eq!(b, Objid(1));
        assert!(db.valid(a));
        assert!(db.valid(b));
    }

    #[test]
    fn recycle_frees_the_number_for_reuse() {
        let mut db = WorldState::new();
        let a = db.create_object(Objid(0), ObjAttrs::new(), false).unwrap();
        db.recycle(&wizard(), a).unwrap();
        assert!(!db.valid(a));
        let b = db.create_object(Objid(0), ObjAttrs::new(), false).unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn chparents_rejects_cycles() {
        let mut db = WorldState::new();
        let a = db.create_object(Objid(0), ObjAttrs::new(), false).unwrap();
        let b = db
            .create_object(Objid(0), ObjAttrs::new().parents(vec![a]), false)
            .unwrap();
        let err = db.chparents(&wizard(), a, vec![b]).unwrap_err();
        assert!(matches!(err, WorldStateError::ChparentRecursiveCycle(..)));
    }

    #[test]
    fn move_rejects_cycles() {
        let mut db = WorldState::new();
        let a = db.create_object(Objid(0), ObjAttrs::new(), false).unwrap();
        let b = db.create_object(Objid(0), ObjAttrs::new(), false).unwrap();
        db.set_location(b, a).unwrap();
        let err = db.set_location(a, b).unwrap_err();
        assert!(matches!(err, WorldStateError::RecursiveMove(..)));
    }

    #[test]
    fn property_inheritance_and_clear() {
        let mut db = WorldState::new();
        let parent = db.create_object(Objid(0), ObjAttrs::new(), false).unwrap();
        let child = db
            .create_object(Objid(0), ObjAttrs::new().parents(vec![parent]), false)
            .unwrap();
        db.add_property(
            &wizard(),
            parent,
            "foo",
            Objid(0),
            BitEnum::new(),
            v_int(42),
        )
        .unwrap();

        let (_, v) = db.resolve_property(child, "foo").unwrap();
        assert_eq!(v, v_int(42));
        assert!(db.is_clear_property(child, "foo").unwrap());

        db.set_property(&wizard(), child, "foo", v_int(7)).unwrap();
        assert!(!db.is_clear_property(child, "foo").unwrap());
        let (_, v) = db.resolve_property(child, "foo").unwrap();
        assert_eq!(v, v_int(7));

        db.clear_property(&wizard(), child, "foo").unwrap();
        assert!(db.is_clear_property(child, "foo").unwrap());
        let (_, v) = db.resolve_property(child, "foo").unwrap();
        assert_eq!(v, v_int(42));
    }

    #[test]
    fn verb_wildcard_resolution_is_inherited() {
        let mut db = WorldState::new();
        let parent = db.create_object(Objid(0), ObjAttrs::new(), false).unwrap();
        let child = db
            .create_object(Objid(0), ObjAttrs::new().parents(vec![parent]), false)
            .unwrap();
        db.add_verb(
            &wizard(),
            parent,
            vec!["l*ook".to_string()],
            Objid(0),
            BitEnum::new(),
            VerbArgsSpec::this_none_this(),
        )
        .unwrap();

        let (definer, verb) = db.resolve_verb(child, "look").unwrap();
        assert_eq!(definer, parent);
        assert!(verb.matches_name("l"));
        assert!(verb.matches_name("loo"));
        assert!(!verb.matches_name("bark"));
    }

    #[test]
    fn dump_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.db");

        let mut db = WorldState::new();
        let a = db.create_object(Objid(0), ObjAttrs::new().name("root"), false).unwrap();
        db.set_flags(&wizard(), a, BitEnum::new_with(&[ObjFlag::Wizard])).unwrap();
        dump::save(&db, &path).unwrap();

        let loaded = dump::load(&path).unwrap();
        assert!(loaded.valid(a));
        assert_eq!(loaded.name_of(a).unwrap(), "root");
        assert!(loaded.flags_of(a).unwrap().contains(ObjFlag::Wizard));
    }
}
