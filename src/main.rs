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

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::{eyre, Context};
use tracing::info;

use moor_common::flags::{BitEnum, ObjFlag};
use moor_common::model::{ObjAttrs, Perms};
use moor_db::WorldState;
use moor_kernel::tasks::scheduler_client;
use moor_kernel::tasks::task::{Task, TaskKind};
use moor_kernel::vm::exec::eval_frame;
use moor_kernel::vm::TaskOutcome;
use moor_kernel::Scheduler;
use moor_var::Objid;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Parser, Debug)]
#[command(name = "moor", about = "A LambdaMOO/ToastStunt-compatible virtual-world server.")]
struct Args {
    /// Path to the object store. Created fresh (with a self-owned #0) if it doesn't exist yet.
    #[arg(long, value_name = "PATH", default_value = "Test.db")]
    db: PathBuf,

    /// TCP port to listen on.
    #[arg(long, default_value_t = 7777)]
    port: u16,

    /// Enable debug-level tracing output.
    #[arg(long)]
    trace: bool,

    /// Restrict tracing to a comma-separated list of targets (only meaningful with --trace).
    #[arg(long, value_name = "TARGETS")]
    trace_filter: Option<String>,

    /// Print the source of OBJ:VERB and exit.
    #[arg(long, value_name = "OBJ:VERB")]
    verb_code: Option<String>,

    /// List every verb defined directly on OBJ and exit.
    #[arg(long, value_name = "OBJ")]
    list_verbs: Option<String>,

    /// Print name/owner/flags/parents/children/location/contents for OBJ and exit.
    #[arg(long, value_name = "OBJ")]
    obj_info: Option<String>,

    /// Compile and run an expression as the wizard and print its result.
    #[arg(long, value_name = "EXPR")]
    eval: Option<String>,

    /// Dump OBJ's full record (verbs, properties, local values) in debug form and exit.
    #[arg(long, value_name = "OBJ")]
    dump_obj_raw: Option<String>,

    /// Resolve OBJ:VERB through the inheritance chain and print which ancestor defines it.
    #[arg(long, value_name = "OBJ:VERB")]
    verb_lookup: Option<String>,

    /// Print OBJ's ancestor chain, root first.
    #[arg(long, value_name = "OBJ")]
    ancestry: Option<String>,
}

fn parse_objref(s: &str) -> eyre::Result<Objid> {
    let digits = s.strip_prefix('#').unwrap_or(s);
    digits.parse::<i64>().map(Objid).map_err(|_| eyre!("not an object reference: {s}"))
}

fn parse_verbref(s: &str) -> eyre::Result<(Objid, String)> {
    let (obj, verb) = s.split_once(':').ok_or_else(|| eyre!("expected OBJ:VERB, got {s}"))?;
    Ok((parse_objref(obj)?, verb.to_string()))
}

/// Loads the store at `path`, or bootstraps a fresh one with a self-owned, wizard `#0` if no
/// file exists there yet -- `WorldState::new()` itself starts out with no objects at all.
fn load_or_bootstrap(path: &Path) -> eyre::Result<WorldState> {
    if path.exists() {
        return moor_db::load(path).with_context(|| format!("loading {}", path.display()));
    }
    let mut world = WorldState::new();
    let attrs = ObjAttrs::new().name("System Object");
    let sys = world.create_object(Objid::SYSTEM_OBJECT, attrs, false)?;
    let perms = Perms::new(sys, true, true);
    world.set_flags(&perms, sys, BitEnum::new_with(&[ObjFlag::Wizard, ObjFlag::Programmer]))?;
    info!(obj = %sys, "bootstrapped fresh database");
    Ok(world)
}

/// Runs whichever single inspection flag was passed, against a `WorldState` loaded once and
/// never persisted back -- these are read-only (or, for `--eval`, transient) queries, not
/// server operation (spec.md §6 "Inspection flags ... mutually exclusive with serving").
fn run_inspection(args: &Args, world: &mut WorldState) -> eyre::Result<()> {
    if let Some(spec) = &args.verb_code {
        let (obj, verb) = parse_verbref(spec)?;
        let vd = world.find_verb_by_name(obj, &verb)?;
        for line in &vd.source {
            println!("{line}");
        }
        return Ok(());
    }

    if let Some(spec) = &args.list_verbs {
        let obj = parse_objref(spec)?;
        for vd in world.verbs(obj)? {
            println!("{} [{}]", vd.names.join(" "), vd.uuid);
        }
        return Ok(());
    }

    if let Some(spec) = &args.obj_info {
        let obj = parse_objref(spec)?;
        println!("name:     {}", world.name_of(obj)?);
        println!("owner:    {}", world.owner_of(obj)?);
        println!("flags:    {:?}", world.flags_of(obj)?);
        println!("parents:  {:?}", world.parents_of(obj)?);
        println!("children: {:?}", world.children_of(obj)?);
        println!("location: {}", world.location_of(obj)?);
        println!("contents: {:?}", world.contents_of(obj)?);
        return Ok(());
    }

    if let Some(source) = &args.eval {
        let perms = Perms::new(Objid::SYSTEM_OBJECT, true, true);
        let mut scheduler = Scheduler::new(std::mem::replace(world, WorldState::new()));
        let tid = scheduler.new_task_id();
        let mut task = Task::new(tid, perms.who, TaskKind::Eval, &scheduler.options, false);
        let outcome = match eval_frame(perms, source, &mut scheduler.cache) {
            Ok(frame) => {
                task.frames.push(frame);
                scheduler.run_task_to_completion(task)
            }
            Err(exc) => TaskOutcome::Error(exc),
        };
        match outcome {
            TaskOutcome::Complete(v) => println!("=> {v:?}"),
            TaskOutcome::Error(exc) => println!("!! {} ({})", exc.error.message(), exc.msg),
            TaskOutcome::Killed | TaskOutcome::Suspended(_) => {
                println!("!! task did not run to completion (suspended or killed)");
            }
        }
        return Ok(());
    }

    if let Some(spec) = &args.dump_obj_raw {
        let obj = parse_objref(spec)?;
        println!("{:#?}", world.properties(obj)?);
        println!("{:#?}", world.verbs(obj)?);
        return Ok(());
    }

    if let Some(spec) = &args.verb_lookup {
        let (obj, verb) = parse_verbref(spec)?;
        let (defining, vd) = world.resolve_verb(obj, &verb)?;
        println!("{verb} resolves on {defining} ({})", vd.names.join(" "));
        return Ok(());
    }

    if let Some(spec) = &args.ancestry {
        let obj = parse_objref(spec)?;
        let mut chain = world.ancestors(obj);
        chain.reverse();
        for a in chain {
            println!("{a} {}", world.name_of(a).unwrap_or_default());
        }
        return Ok(());
    }

    Ok(())
}

fn inspection_requested(args: &Args) -> bool {
    args.verb_code.is_some()
        || args.list_verbs.is_some()
        || args.obj_info.is_some()
        || args.eval.is_some()
        || args.dump_obj_raw.is_some()
        || args.verb_lookup.is_some()
        || args.ancestry.is_some()
}

fn inspection_count(args: &Args) -> usize {
    [
        args.verb_code.is_some(),
        args.list_verbs.is_some(),
        args.obj_info.is_some(),
        args.eval.is_some(),
        args.dump_obj_raw.is_some(),
        args.verb_lookup.is_some(),
        args.ancestry.is_some(),
    ]
    .into_iter()
    .filter(|&b| b)
    .count()
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let level = if args.trace { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::fmt().compact().with_target(false).with_max_level(level);
    match &args.trace_filter {
        Some(filter) if args.trace => {
            let targets: tracing_subscriber::filter::Targets = filter.parse()?;
            tracing::subscriber::set_global_default(subscriber.finish().with(targets))?;
        }
        _ => {
            tracing::subscriber::set_global_default(subscriber.finish())?;
        }
    }

    if inspection_count(&args) > 1 {
        return Err(eyre!("only one inspection flag may be given at a time"));
    }

    let mut world = load_or_bootstrap(&args.db)?;

    if inspection_requested(&args) {
        return run_inspection(&args, &mut world);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let (client, handle) = scheduler_client::spawn(world);
    info!(%addr, db = %args.db.display(), "moor starting");

    let shutdown_client = client.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, shutting down");
            shutdown_client.request_shutdown("server interrupted".to_string());
        }
    });

    let serve_result = moor_net::serve(addr, client.clone()).await;
    signal_task.abort();

    client.shutdown();
    let world = handle.join().map_err(|_| eyre!("scheduler thread panicked"))?;
    moor_db::save(&world, &args.db).with_context(|| format!("saving {}", args.db.display()))?;
    info!("checkpoint written, exiting");

    serve_result
}
