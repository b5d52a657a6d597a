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

//! Runtime configuration cache for `#0.server_options` (spec.md §6 "Server options").
//! `load_server_options()` (in `builtins::system`) rebinds these fields from the property value;
//! everywhere else in the kernel reads the cached `ServerOptions` rather than re-resolving the
//! property on every tick.

use moor_var::{Var, Variant};

pub const DEFAULT_MAX_STACK_DEPTH: usize = 50;
pub const DEFAULT_FG_TICKS: u64 = 30_000;
pub const DEFAULT_BG_TICKS: u64 = 30_000;
pub const DEFAULT_FG_SECONDS: u64 = 5;
pub const DEFAULT_BG_SECONDS: u64 = 30;
pub const DEFAULT_MAX_STRING_CONCAT: usize = 1 << 20;
pub const DEFAULT_MAX_LIST_VALUE_BYTES: usize = 1 << 24;
pub const DEFAULT_MAX_MAP_VALUE_BYTES: usize = 1 << 24;

/// The server-wide resource limits and defaults (spec.md §6 "Recognized keys"). Cloned into each
/// new `Task` at creation time so a later `load_server_options()` call doesn't retroactively
/// change the budget of a task already running.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerOptions {
    pub max_stack_depth: usize,
    pub fg_ticks: u64,
    pub bg_ticks: u64,
    pub fg_seconds: u64,
    pub bg_seconds: u64,
    pub max_string_concat: usize,
    pub max_list_value_bytes: usize,
    pub max_map_value_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            fg_ticks: DEFAULT_FG_TICKS,
            bg_ticks: DEFAULT_BG_TICKS,
            fg_seconds: DEFAULT_FG_SECONDS,
            bg_seconds: DEFAULT_BG_SECONDS,
            max_string_concat: DEFAULT_MAX_STRING_CONCAT,
            max_list_value_bytes: DEFAULT_MAX_LIST_VALUE_BYTES,
            max_map_value_bytes: DEFAULT_MAX_MAP_VALUE_BYTES,
        }
    }
}

impl ServerOptions {
    /// Rebinds whichever of the recognized keys are present in `map` (a MOO MAP value), leaving
    /// everything else at its prior value. Unrecognized keys are ignored rather than rejected --
    /// spec.md calls the key list "non-exhaustive".
    pub fn load_from_map(&mut self, map: &[(Var, Var)]) {
        for (k, v) in map {
            let Some(key) = k.as_str() else { continue };
            let as_usize = |v: &Var| v.as_int().map(|i| i.max(0) as usize);
            let as_u64 = |v: &Var| v.as_int().map(|i| i.max(0) as u64);
            match key {
                "max_string_concat" => {
                    if let Some(n) = as_usize(v) {
                        self.max_string_concat = n;
                    }
                }
                "max_list_value_bytes" => {
                    if let Some(n) = as_usize(v) {
                        self.max_list_value_bytes = n;
                    }
                }
                "max_map_value_bytes" => {
                    if let Some(n) = as_usize(v) {
                        self.max_map_value_bytes = n;
                    }
                }
                "default_tick_limit" => {
                    if let Some(n) = as_u64(v) {
                        self.fg_ticks = n;
                    }
                }
                "default_seconds_limit" => {
                    if let Some(n) = as_u64(v) {
                        self.fg_seconds = n;
                    }
                }
                "bg_ticks" => {
                    if let Some(n) = as_u64(v) {
                        self.bg_ticks = n;
                    }
                }
                "bg_seconds" => {
                    if let Some(n) = as_u64(v) {
                        self.bg_seconds = n;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Rough estimate of a `Var`'s in-memory footprint, used to enforce `max_list_value_bytes`/
/// `max_map_value_bytes`/`max_string_concat` (spec.md §8 invariant 7, §4.7 "size-limit checks").
/// Not exact -- just proportional enough that quota limits bite at a sane order of magnitude.
#[must_use]
pub fn approx_value_bytes(v: &Var) -> usize {
    match v.variant() {
        Variant::Int(_) | Variant::Float(_) | Variant::Obj(_) | Variant::Err(_) | Variant::Bool(_) => 16,
        Variant::Str(s) => 24 + s.len(),
        Variant::List(items) => 24 + items.iter().map(approx_value_bytes).sum::<usize>(),
        Variant::Map(pairs) => {
            24 + pairs
                .iter()
                .map(|(k, val)| approx_value_bytes(k) + approx_value_bytes(val))
                .sum::<usize>()
        }
        Variant::Waif(_) => 64,
    }
}
