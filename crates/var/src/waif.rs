use crate::objid::Objid;
use crate::symbol::Symbol;
use crate::var::Var;

/// A lightweight object-like value (spec.md §3 "WAIF"). A waif has a class object and an owner,
/// fixed at creation, and a local property map of its own — but it is never `valid()`, can never
/// be a parent or child of anything, and carries none of the player/wizard/programmer flags real
/// objects do. Waifs are cheap, copy-on-write-ish values, not store-resident objects.
#[derive(Debug, Clone, PartialEq)]
pub struct Waif {
    pub class: Objid,
    pub owner: Objid,
    props: Vec<(Symbol, Var)>,
}

impl Waif {
    #[must_use]
    pub fn new(class: Objid, owner: Objid) -> Self {
        Waif {
            class,
            owner,
            props: vec![],
        }
    }

    #[must_use]
    pub fn get(&self, name: Symbol) -> Option<&Var> {
        self.props.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn set(&mut self, name: Symbol, value: Var) {
        if let Some(slot) = self.props.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.props.push((name, value));
        }
    }
}
