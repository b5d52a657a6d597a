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

//! Process-wide instruction counters, surfaced for `--trace`/diagnostic logging. Not part of any
//! MOO-visible behavior.

use std::sync::atomic::{AtomicU64, Ordering};

static OPS_EXECUTED: AtomicU64 = AtomicU64::new(0);
static TASKS_RUN: AtomicU64 = AtomicU64::new(0);

pub fn record_op() {
    OPS_EXECUTED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_task_run() {
    TASKS_RUN.fetch_add(1, Ordering::Relaxed);
}

#[must_use]
pub fn ops_executed() -> u64 {
    OPS_EXECUTED.load(Ordering::Relaxed)
}

#[must_use]
pub fn tasks_run() -> u64 {
    TASKS_RUN.load(Ordering::Relaxed)
}
